//! ssogate Core Library
//!
//! Configuration and the shared error taxonomy for the ssogate directory
//! login service.

pub mod config;
pub mod error;

pub use config::SsoConfig;
pub use error::{Error, ErrorCategory, Result};

/// ssogate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Well-known port for plain LDAP
pub const LDAP_PORT: u16 = 389;

/// Well-known port for LDAP over TLS
pub const LDAPS_PORT: u16 = 636;

/// Session key under which the HTTP layer records the authenticated user
pub const LOGGED_IN_USER_KEY: &str = "LoggedInUserID";
