//! LDAP authentication module
//!
//! Verifies end-user passwords against an LDAP directory:
//! - endpoint normalization (`ldap://` / `ldaps://`, default ports)
//! - one owned connection per authentication attempt
//! - service bind, user search, user bind, service re-bind
//! - RFC 4515 filter escaping of the username

mod authenticator;
mod client;
mod endpoint;
mod filter;
mod session;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use authenticator::LdapAuthenticator;
pub use client::Ldap3Connector;
pub use endpoint::{normalize_url, Endpoint, Scheme};
pub use filter::{build_user_filter, escape_filter_value};
pub use session::DirectorySession;
pub use transport::{
    BindOutcome, ConnectOptions, Connection, Connector, DerefAliases, SearchRequest, SearchScope,
};
