//! Directory transport abstraction
//!
//! The authentication protocol only needs three wire operations: simple bind,
//! search and unbind. [`Connector`] opens a [`Connection`] to a normalized
//! endpoint; the production implementation is [`super::Ldap3Connector`].

use async_trait::async_trait;
use ssogate_core::Result;
use std::time::Duration;

use super::endpoint::Endpoint;

/// Transport options fixed by configuration
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Validate the server certificate chain on LDAPS
    pub verify_server_certificate: bool,
    /// Deadline for connecting and for each operation
    pub timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            verify_server_certificate: true,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    Never,
    Searching,
    Finding,
    Always,
}

/// Search issued against the directory
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub deref: DerefAliases,
    pub filter: String,
    pub attributes: Vec<String>,
}

/// Result of a simple bind that reached the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Accepted,
    /// Non-zero LDAP result code (49 = invalidCredentials)
    Rejected { code: u32, message: String },
}

impl BindOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BindOutcome::Accepted)
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>>;
}

/// One live directory connection.
///
/// Dropping a connection must release the underlying transport.
#[async_trait]
pub trait Connection: Send {
    /// Transport failures are errors; a refused bind is `Ok(Rejected)`
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindOutcome>;

    /// DNs of the matching entries
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<String>>;

    async fn unbind(&mut self) -> Result<()>;
}
