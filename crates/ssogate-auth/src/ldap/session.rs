//! Directory session
//!
//! Owns at most one directory connection. `open` establishes it, `close`
//! releases it; both are driven by [`super::LdapAuthenticator`], which closes
//! the session on every exit path.

use ssogate_core::config::LdapConfig;
use ssogate_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::endpoint::Endpoint;
use super::transport::{BindOutcome, ConnectOptions, Connection, Connector, SearchRequest};

pub struct DirectorySession {
    config: Arc<LdapConfig>,
    connector: Arc<dyn Connector>,
    conn: Option<Box<dyn Connection>>,
}

impl DirectorySession {
    pub fn new(config: Arc<LdapConfig>, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            conn: None,
        }
    }

    /// Normalize the configured URL and connect.
    ///
    /// Returns the endpoint actually used. Opening an already open session
    /// is an error; the existing connection is kept.
    pub async fn open(&mut self) -> Result<Endpoint> {
        if self.conn.is_some() {
            return Err(Error::Directory("directory session is already open".into()));
        }

        let endpoint = Endpoint::parse(&self.config.url)?;

        // Accepted risk on trusted networks; kept visible in the logs
        if endpoint.is_tls() && !self.config.verify_server_certificate {
            warn!(
                endpoint = %endpoint,
                "Connecting with LDAPS certificate verification disabled"
            );
        }

        let options = ConnectOptions {
            verify_server_certificate: self.config.verify_server_certificate,
            timeout: Duration::from_secs(self.config.timeout_seconds),
        };

        debug!(endpoint = %endpoint, "Opening directory session");
        let conn = self.connector.connect(&endpoint, &options).await?;
        self.conn = Some(conn);

        Ok(endpoint)
    }

    /// Release the connection if there is one. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.unbind().await {
                debug!(error = %e, "Unbind failed while closing directory session");
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub async fn bind(&mut self, dn: &str, password: &str) -> Result<BindOutcome> {
        self.connection()?.simple_bind(dn, password).await
    }

    pub async fn search(&mut self, request: &SearchRequest) -> Result<Vec<String>> {
        self.connection()?.search(request).await
    }

    fn connection(&mut self) -> Result<&mut (dyn Connection + 'static)> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| Error::Directory("directory session is not open".into()))
    }
}
