//! LDAP password verification
//!
//! Handshake, all on one connection:
//! 1. bind as the read-only service account
//! 2. search for the user's entry (escaped filter, subtree, `dn` only)
//! 3. require exactly one entry
//! 4. bind as that entry with the supplied password
//! 5. re-bind as the service account
//!
//! Unknown, ambiguous and wrong-password cases all surface as
//! [`Error::InvalidCredentials`]; the specific reason only goes to the
//! `ssogate::audit` log target.

use ssogate_core::config::LdapConfig;
use ssogate_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::client::Ldap3Connector;
use super::filter::build_user_filter;
use super::session::DirectorySession;
use super::transport::{BindOutcome, Connector, DerefAliases, SearchRequest, SearchScope};

const AUDIT_TARGET: &str = "ssogate::audit";

/// Authenticates users against the configured directory.
///
/// Cheap to share; every call opens and closes its own connection.
pub struct LdapAuthenticator {
    config: Arc<LdapConfig>,
    connector: Arc<dyn Connector>,
}

impl LdapAuthenticator {
    pub fn new(config: LdapConfig) -> Self {
        Self::with_connector(config, Arc::new(Ldap3Connector))
    }

    pub fn with_connector(config: LdapConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Verify `password` for `username`; returns `username` unchanged on success
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let mut session = DirectorySession::new(self.config.clone(), self.connector.clone());

        let outcome = self.handshake(&mut session, username, password).await;
        session.close().await;

        match &outcome {
            Ok(_) => info!("User authenticated"),
            Err(Error::InvalidCredentials) => debug!("User rejected"),
            Err(e) => warn!(error = %e, "Directory authentication failed"),
        }

        outcome
    }

    /// Search request for the entry of `username`
    pub fn user_search_request(&self, username: &str) -> SearchRequest {
        SearchRequest {
            base_dn: self.config.base_dn.clone(),
            scope: SearchScope::Subtree,
            deref: DerefAliases::Never,
            filter: build_user_filter(&self.config.filter, username),
            attributes: vec!["dn".to_string()],
        }
    }

    async fn handshake(
        &self,
        session: &mut DirectorySession,
        username: &str,
        password: &str,
    ) -> Result<String> {
        session.open().await?;

        self.bind_service_account(session).await?;

        let request = self.user_search_request(username);
        debug!(filter = %request.filter, "Searching for user");
        let entries = session.search(&request).await?;

        let user_dn = match entries.as_slice() {
            [dn] => dn.clone(),
            [] => return Err(reject(username, "no matching entry")),
            _ => {
                warn!(
                    target: AUDIT_TARGET,
                    username = %username,
                    matches = entries.len(),
                    "Login filter matched several entries"
                );
                return Err(reject(username, "entry is not unique"));
            }
        };

        // A simple bind with an empty password is an anonymous bind
        if password.is_empty() {
            return Err(reject(username, "empty password"));
        }

        match session.bind(&user_dn, password).await? {
            BindOutcome::Accepted => {}
            BindOutcome::Rejected { code, .. } => {
                debug!(target: AUDIT_TARGET, user_dn = %user_dn, rc = code, "User bind rejected");
                return Err(reject(username, "password rejected"));
            }
        }

        self.bind_service_account(session).await?;

        Ok(username.to_string())
    }

    async fn bind_service_account(&self, session: &mut DirectorySession) -> Result<()> {
        match session
            .bind(&self.config.search_dn, &self.config.search_password)
            .await?
        {
            BindOutcome::Accepted => Ok(()),
            BindOutcome::Rejected { code, message } => Err(Error::ServiceBind(format!(
                "{} rejected with code {}: {}",
                self.config.search_dn, code, message
            ))),
        }
    }
}

fn reject(username: &str, reason: &'static str) -> Error {
    warn!(
        target: AUDIT_TARGET,
        username = %username,
        reason,
        "Authentication rejected"
    );
    Error::InvalidCredentials
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::memory::MemoryDirectory;
    use ssogate_core::ErrorCategory;

    const SERVICE_DN: &str = "cn=reader,dc=example,dc=com";
    const SERVICE_PASSWORD: &str = "reader-secret";
    const ALICE_DN: &str = "uid=alice,ou=people,dc=example,dc=com";

    fn config() -> LdapConfig {
        LdapConfig {
            url: "ldap.example.com".to_string(),
            search_dn: SERVICE_DN.to_string(),
            search_password: SERVICE_PASSWORD.to_string(),
            base_dn: "dc=example,dc=com".to_string(),
            filter: "(uid=%s)".to_string(),
            ..Default::default()
        }
    }

    fn directory() -> MemoryDirectory {
        let directory = MemoryDirectory::new(SERVICE_DN, SERVICE_PASSWORD);
        directory
            .add_entry(ALICE_DN, "uid", "alice", "wonderland")
            .add_entry("uid=bob,ou=people,dc=example,dc=com", "uid", "bob", "builder");
        directory
    }

    fn authenticator(directory: &MemoryDirectory) -> LdapAuthenticator {
        LdapAuthenticator::with_connector(config(), Arc::new(directory.clone()))
    }

    #[tokio::test]
    async fn test_successful_authentication() {
        let directory = directory();
        let auth = authenticator(&directory);

        let user = auth.authenticate("alice", "wonderland").await.unwrap();

        // The supplied name comes back, not the DN
        assert_eq!(user, "alice");
        assert_eq!(
            directory.binds(),
            vec![SERVICE_DN, ALICE_DN, SERVICE_DN],
            "service bind, user bind, service re-bind"
        );
        assert_eq!(directory.connected_endpoints(), vec!["ldap://ldap.example.com:389"]);
        assert_eq!(directory.open_connections(), 0);
        assert_eq!(directory.unbinds(), 1);
    }

    #[tokio::test]
    async fn test_search_request_shape() {
        let directory = directory();
        let auth = authenticator(&directory);

        auth.authenticate("alice", "wonderland").await.unwrap();

        let searches = directory.searches();
        assert_eq!(searches.len(), 1);
        let search = &searches[0];
        assert_eq!(search.base_dn, "dc=example,dc=com");
        assert_eq!(search.scope, SearchScope::Subtree);
        assert_eq!(search.deref, DerefAliases::Never);
        assert_eq!(search.filter, "(uid=alice)");
        assert_eq!(search.attributes, vec!["dn"]);
    }

    #[tokio::test]
    async fn test_wrong_password_matches_unknown_user() {
        let directory = directory();
        let auth = authenticator(&directory);

        let wrong_password = auth.authenticate("alice", "queen").await.unwrap_err();
        let unknown_user = auth.authenticate("mallory", "whatever").await.unwrap_err();

        assert!(matches!(wrong_password, Error::InvalidCredentials));
        assert!(matches!(unknown_user, Error::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert_eq!(wrong_password.category(), ErrorCategory::Authentication);
        assert_eq!(directory.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_user_is_rejected() {
        let directory = directory();
        directory.add_entry("uid=alice,ou=contractors,dc=example,dc=com", "uid", "alice", "other");
        let auth = authenticator(&directory);

        let err = auth.authenticate("alice", "wonderland").await.unwrap_err();

        assert!(matches!(err, Error::InvalidCredentials));
        // No user bind was attempted
        assert_eq!(directory.binds(), vec![SERVICE_DN]);
        assert_eq!(directory.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_filter_injection_matches_nothing() {
        let directory = directory();
        let auth = authenticator(&directory);

        let err = auth.authenticate("*", "wonderland").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        let err = auth.authenticate("*)(uid=*", "wonderland").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        let filters: Vec<String> = directory.searches().into_iter().map(|s| s.filter).collect();
        assert_eq!(filters, vec![r"(uid=\2a)", r"(uid=\2a\29\28uid=\2a)"]);
    }

    #[tokio::test]
    async fn test_username_with_metacharacters_matches_literally() {
        let directory = directory();
        directory.add_entry(
            "uid=o(dd)*,ou=people,dc=example,dc=com",
            "uid",
            "o(dd)*",
            "secret",
        );
        let auth = authenticator(&directory);

        assert_eq!(auth.authenticate("o(dd)*", "secret").await.unwrap(), "o(dd)*");
    }

    #[tokio::test]
    async fn test_empty_password_is_rejected() {
        let directory = directory();
        let auth = authenticator(&directory);

        let err = auth.authenticate("alice", "").await.unwrap_err();

        assert!(matches!(err, Error::InvalidCredentials));
        assert_eq!(directory.binds(), vec![SERVICE_DN]);
    }

    #[tokio::test]
    async fn test_service_bind_failure_is_not_user_failure() {
        let directory = directory();
        let mut config = config();
        config.search_password = "stale".to_string();
        let auth = LdapAuthenticator::with_connector(config, Arc::new(directory.clone()));

        let err = auth.authenticate("alice", "wonderland").await.unwrap_err();

        assert!(matches!(err, Error::ServiceBind(_)));
        assert_eq!(err.category(), ErrorCategory::Connectivity);
        assert!(directory.searches().is_empty());
        assert_eq!(directory.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_surfaced() {
        let directory = directory();
        directory.fail_connections("connection refused");
        let auth = authenticator(&directory);

        let err = auth.authenticate("alice", "wonderland").await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn test_bad_url_is_configuration_error() {
        let directory = directory();
        let mut config = config();
        config.url = "https://ldap.example.com".to_string();
        let auth = LdapAuthenticator::with_connector(config, Arc::new(directory.clone()));

        let err = auth.authenticate("alice", "wonderland").await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(directory.connected_endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_ldaps_port_inferred() {
        let directory = directory();
        let mut config = config();
        config.url = "ldap://dc1.example.com:636".to_string();
        let auth = LdapAuthenticator::with_connector(config, Arc::new(directory.clone()));

        auth.authenticate("bob", "builder").await.unwrap();
        assert_eq!(
            directory.connected_endpoints(),
            vec!["ldaps://dc1.example.com:636"]
        );
    }

    #[tokio::test]
    async fn test_connection_released_on_every_path() {
        let directory = directory();
        let auth = authenticator(&directory);

        let _ = auth.authenticate("alice", "wonderland").await;
        let _ = auth.authenticate("alice", "nope").await;
        let _ = auth.authenticate("nobody", "nope").await;
        let _ = auth.authenticate("alice", "").await;

        assert_eq!(directory.connected_endpoints().len(), 4);
        assert_eq!(directory.open_connections(), 0);
        assert_eq!(directory.unbinds(), 4);
    }

    #[tokio::test]
    async fn test_search_failure_is_connectivity_error() {
        let directory = directory();
        directory.fail_searches("server busy");
        let auth = authenticator(&directory);

        let err = auth.authenticate("alice", "wonderland").await.unwrap_err();

        assert!(matches!(err, Error::Directory(_)));
        assert_eq!(err.category(), ErrorCategory::Connectivity);
        // No user bind was attempted
        assert_eq!(directory.binds(), vec![SERVICE_DN]);
        assert_eq!(directory.open_connections(), 0);
        assert_eq!(directory.unbinds(), 1);
    }

    #[tokio::test]
    async fn test_user_bind_transport_failure_is_not_user_failure() {
        let directory = directory();
        directory.fail_binds_after(1, "connection reset");
        let auth = authenticator(&directory);

        let err = auth.authenticate("alice", "wonderland").await.unwrap_err();

        assert!(matches!(err, Error::Connection(ref msg) if msg.contains("reset")));
        assert_eq!(err.category(), ErrorCategory::Connectivity);
        assert_eq!(directory.binds(), vec![SERVICE_DN, ALICE_DN]);
        assert_eq!(directory.open_connections(), 0);
        assert_eq!(directory.unbinds(), 1);
    }

    #[tokio::test]
    async fn test_service_rebind_rejection_after_user_bind() {
        let directory = directory();
        directory.reject_binds_after(2);
        let auth = authenticator(&directory);

        let err = auth.authenticate("alice", "wonderland").await.unwrap_err();

        // The password was accepted; the failure belongs to the service account
        assert!(matches!(err, Error::ServiceBind(_)));
        assert_eq!(err.category(), ErrorCategory::Connectivity);
        assert_eq!(directory.binds(), vec![SERVICE_DN, ALICE_DN, SERVICE_DN]);
        assert_eq!(directory.open_connections(), 0);
        assert_eq!(directory.unbinds(), 1);
    }
}
