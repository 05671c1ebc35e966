//! Configuration for ssogate

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Placeholder the user filter template substitutes the escaped username into
pub const FILTER_PLACEHOLDER: &str = "%s";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SsoConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ldap: LdapConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SsoConfig {
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> crate::Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `SSOGATE_*` environment variables on top of the current values
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("SSOGATE_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Ok(port) = std::env::var("SSOGATE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(url) = std::env::var("SSOGATE_LDAP_URL") {
            self.ldap.url = url;
        }
        if let Ok(dn) = std::env::var("SSOGATE_LDAP_SEARCH_DN") {
            self.ldap.search_dn = dn;
        }
        if let Ok(password) = std::env::var("SSOGATE_LDAP_SEARCH_PASSWORD") {
            self.ldap.search_password = password;
        }
        if let Ok(base) = std::env::var("SSOGATE_LDAP_BASE_DN") {
            self.ldap.base_dn = base;
        }
        if let Ok(filter) = std::env::var("SSOGATE_LDAP_FILTER") {
            self.ldap.filter = filter;
        }
        if let Ok(verify) = std::env::var("SSOGATE_LDAP_VERIFY_SERVER_CERTIFICATE") {
            self.ldap.verify_server_certificate = verify != "false";
        }

        if let Ok(key) = std::env::var("SSOGATE_SESSION_SECRET_KEY") {
            self.session.secret_key = key;
        }
        if let Ok(name) = std::env::var("SSOGATE_SESSION_NAME") {
            self.session.name = name;
        }
        if let Ok(max_age) = std::env::var("SSOGATE_SESSION_MAX_AGE") {
            if let Ok(secs) = max_age.parse() {
                self.session.max_age = secs;
            }
        }

        if let Ok(level) = std::env::var("SSOGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SSOGATE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.ldap.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9096,
        }
    }
}

/// LDAP directory configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Directory endpoint; scheme and port are optional
    /// Example: "ldap.example.com", "ldap.example.com:636" or "ldaps://dc1"
    #[serde(default)]
    pub url: String,

    /// Read-only service account used for searching
    /// Example: "cn=reader,dc=example,dc=com"
    #[serde(default)]
    pub search_dn: String,

    #[serde(default)]
    pub search_password: String,

    /// Search root for user lookups
    #[serde(default)]
    pub base_dn: String,

    /// User filter template; `%s` is replaced by the escaped username
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Validate the server certificate on LDAPS connections.
    /// Only disable on a trusted private network.
    #[serde(default = "default_true")]
    pub verify_server_certificate: bool,

    /// Deadline for connecting and for each directory operation
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_filter() -> String {
    "(uid=%s)".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    10
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            search_dn: String::new(),
            search_password: String::new(),
            base_dn: String::new(),
            filter: default_filter(),
            verify_server_certificate: true,
            timeout_seconds: default_timeout(),
        }
    }
}

// Keeps the service account password out of logs
impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("url", &self.url)
            .field("search_dn", &self.search_dn)
            .field("search_password", &"<redacted>")
            .field("base_dn", &self.base_dn)
            .field("filter", &self.filter)
            .field("verify_server_certificate", &self.verify_server_certificate)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl LdapConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.url.trim().is_empty() {
            return Err(crate::Error::Config("ldap.url is required".into()));
        }

        if self.base_dn.is_empty() {
            return Err(crate::Error::Config("ldap.base_dn is required".into()));
        }

        if self.filter.matches(FILTER_PLACEHOLDER).count() != 1 {
            return Err(crate::Error::Config(format!(
                "ldap.filter must contain exactly one {} placeholder",
                FILTER_PLACEHOLDER
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(crate::Error::Config(
                "ldap.timeout_seconds must be greater than zero".into(),
            ));
        }

        if !self.verify_server_certificate {
            warn!("LDAPS certificate verification is disabled; use only on a trusted network");
        }

        Ok(())
    }
}

/// Cookie session configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Secret the cookie encryption key is derived from
    #[serde(default)]
    pub secret_key: String,

    /// Cookie name
    #[serde(default = "default_session_name")]
    pub name: String,

    /// Session lifetime in seconds
    #[serde(default = "default_max_age")]
    pub max_age: u64,

    /// Cookie path scope
    #[serde(default = "default_path")]
    pub path: String,

    /// Add the `Secure` attribute (HTTPS only)
    #[serde(default)]
    pub secure: bool,
}

fn default_session_name() -> String {
    "ssogate_session".to_string()
}

fn default_max_age() -> u64 {
    1800
}

fn default_path() -> String {
    "/".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            name: default_session_name(),
            max_age: default_max_age(),
            path: default_path(),
            secure: false,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret_key", &"<redacted>")
            .field("name", &self.name)
            .field("max_age", &self.max_age)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .finish()
    }
}

impl SessionConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.secret_key.is_empty() {
            return Err(crate::Error::Config("session.secret_key is required".into()));
        }

        if self.secret_key.len() < 32 {
            warn!("session.secret_key is shorter than 32 bytes");
        }

        if self.name.is_empty()
            || !self
                .name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
        {
            return Err(crate::Error::Config(format!(
                "session.name is not a valid cookie name: {:?}",
                self.name
            )));
        }

        if self.max_age == 0 {
            return Err(crate::Error::Config(
                "session.max_age must be greater than zero".into(),
            ));
        }

        if i64::try_from(self.max_age).is_err() {
            return Err(crate::Error::Config(format!(
                "session.max_age is out of range: {}",
                self.max_age
            )));
        }

        if !self.path.starts_with('/') {
            return Err(crate::Error::Config("session.path must start with '/'".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
