//! Directory endpoint normalization
//!
//! Operators write the directory location loosely: `dc1`, `dc1:636`,
//! `ldaps://dc1` and `ldap://[::1]:389` are all accepted. Parsing yields a
//! canonical `scheme://host:port`:
//! - a missing scheme defaults to `ldap`
//! - port 636 always selects `ldaps`, even under an explicit `ldap://`
//! - a missing port is filled in from the scheme (389 / 636)

use ssogate_core::{Error, Result, LDAPS_PORT, LDAP_PORT};
use std::fmt;

const SCHEME_SEPARATOR: &str = "://";

/// Transport used to reach the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain TCP
    Ldap,
    /// TLS from the first byte
    Ldaps,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ldap => "ldap",
            Scheme::Ldaps => "ldaps",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Ldap => LDAP_PORT,
            Scheme::Ldaps => LDAPS_PORT,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ldap" => Some(Scheme::Ldap),
            "ldaps" => Some(Scheme::Ldaps),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized directory endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    /// Host name or IP literal, without IPv6 brackets
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidDirectoryUrl("empty URL".into()));
        }

        // Generic URL syntax first; bare host[:port] is checked as ldap://
        let candidate = if raw.contains(SCHEME_SEPARATOR) {
            raw.to_string()
        } else {
            format!("ldap{}{}", SCHEME_SEPARATOR, raw)
        };
        url::Url::parse(&candidate)
            .map_err(|e| Error::InvalidDirectoryUrl(format!("{}: {}", raw, e)))?;

        let (mut scheme, host_port) = match raw.split_once(SCHEME_SEPARATOR) {
            Some((name, rest)) => {
                let scheme =
                    Scheme::from_name(name).ok_or_else(|| Error::UnknownScheme(name.to_string()))?;
                (scheme, rest)
            }
            None => (Scheme::Ldap, raw),
        };

        let (host, port) = split_host_port(host_port)?;

        let port = match port {
            Some(port) => {
                if port == LDAPS_PORT {
                    scheme = Scheme::Ldaps;
                }
                port
            }
            None => scheme.default_port(),
        };

        Ok(Self { scheme, host, port })
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn host_port(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Ldaps
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SCHEME_SEPARATOR, self.host_port())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Canonical `scheme://host:port` form of a loosely written directory URL
pub fn normalize_url(raw: &str) -> Result<String> {
    Endpoint::parse(raw).map(|endpoint| endpoint.to_string())
}

fn split_host_port(host_port: &str) -> Result<(String, Option<u16>)> {
    let invalid = |reason: &str| Error::InvalidHostPort(format!("{}: {}", host_port, reason));

    if host_port.is_empty() {
        return Err(invalid("missing host"));
    }
    if host_port.contains(['/', '?', '#']) {
        return Err(invalid("unexpected path, query or fragment"));
    }
    if host_port.contains('@') {
        return Err(invalid("credentials are not allowed in the URL"));
    }

    if let Some(rest) = host_port.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing ']' in address"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = match after {
            "" => None,
            _ => {
                let port = after
                    .strip_prefix(':')
                    .ok_or_else(|| invalid("unexpected characters after address"))?;
                Some(parse_port(port).ok_or_else(|| invalid("invalid port"))?)
            }
        };
        return Ok((host.to_string(), port));
    }

    match host_port.split_once(':') {
        None => Ok((host_port.to_string(), None)),
        Some((_, port)) if port.contains(':') => Err(invalid("too many colons in address")),
        Some(("", _)) => Err(invalid("missing host")),
        Some((host, port)) => {
            let port = parse_port(port).ok_or_else(|| invalid("invalid port"))?;
            Ok((host.to_string(), Some(port)))
        }
    }
}

fn parse_port(port: &str) -> Option<u16> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse().ok()
}
