//! In-memory directory for tests
//!
//! Understands single equality filters such as `(uid=alice)` (including
//! RFC 4515 `\xx` escapes) and presence filters such as `(uid=*)`. Every
//! connect, bind, search and unbind is recorded so tests can assert on the
//! exact sequence of directory operations.

use async_trait::async_trait;
use parking_lot::Mutex;
use ssogate_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

use super::endpoint::Endpoint;
use super::transport::{BindOutcome, ConnectOptions, Connection, Connector, SearchRequest};

/// LDAP result code for invalidCredentials
const INVALID_CREDENTIALS: u32 = 49;

#[derive(Debug, Clone)]
struct MemoryEntry {
    dn: String,
    attributes: HashMap<String, String>,
    password: String,
}

#[derive(Debug, Default)]
struct State {
    service_dn: String,
    service_password: String,
    entries: Vec<MemoryEntry>,
    connect_error: Option<String>,
    search_error: Option<String>,
    bind_error_after: Option<(usize, String)>,
    reject_binds_after: Option<usize>,
    connected: Vec<String>,
    open_connections: usize,
    binds: Vec<String>,
    searches: Vec<SearchRequest>,
    unbinds: usize,
    bound_dn: Option<String>,
}

/// Shared handle; clones observe the same directory
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    pub fn new(service_dn: &str, service_password: &str) -> Self {
        let state = State {
            service_dn: service_dn.to_string(),
            service_password: service_password.to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Add an entry carrying one searchable attribute
    pub fn add_entry(&self, dn: &str, attribute: &str, value: &str, password: &str) -> &Self {
        let mut attributes = HashMap::new();
        attributes.insert(attribute.to_string(), value.to_string());
        self.state.lock().entries.push(MemoryEntry {
            dn: dn.to_string(),
            attributes,
            password: password.to_string(),
        });
        self
    }

    /// Make every subsequent connect fail with `message`
    pub fn fail_connections(&self, message: &str) {
        self.state.lock().connect_error = Some(message.to_string());
    }

    /// Make every subsequent search fail with `message`
    pub fn fail_searches(&self, message: &str) {
        self.state.lock().search_error = Some(message.to_string());
    }

    /// Let the first `n` binds through; later ones fail at the transport
    pub fn fail_binds_after(&self, n: usize, message: &str) {
        self.state.lock().bind_error_after = Some((n, message.to_string()));
    }

    /// Let the first `n` binds through; later ones are rejected with code 49
    pub fn reject_binds_after(&self, n: usize) {
        self.state.lock().reject_binds_after = Some(n);
    }

    /// Canonical URLs of all connections made so far
    pub fn connected_endpoints(&self) -> Vec<String> {
        self.state.lock().connected.clone()
    }

    /// Connections currently alive (not yet dropped)
    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections
    }

    /// DNs of all bind attempts, in order
    pub fn binds(&self) -> Vec<String> {
        self.state.lock().binds.clone()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.state.lock().searches.clone()
    }

    pub fn unbinds(&self) -> usize {
        self.state.lock().unbinds
    }

    /// DN of the most recent accepted bind
    pub fn bound_dn(&self) -> Option<String> {
        self.state.lock().bound_dn.clone()
    }
}

#[async_trait]
impl Connector for MemoryDirectory {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        _options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        if let Some(message) = &state.connect_error {
            return Err(Error::Connection(format!("{}: {}", endpoint, message)));
        }

        state.connected.push(endpoint.to_string());
        state.open_connections += 1;

        Ok(Box::new(MemoryConnection {
            state: self.state.clone(),
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindOutcome> {
        let mut state = self.state.lock();
        let attempt = state.binds.len();
        state.binds.push(dn.to_string());

        let bind_error = state
            .bind_error_after
            .as_ref()
            .filter(|(n, _)| attempt >= *n)
            .map(|(_, message)| format!("bind as {} failed: {}", dn, message));
        if let Some(message) = bind_error {
            state.bound_dn = None;
            return Err(Error::Connection(message));
        }

        let forced_reject = state.reject_binds_after.is_some_and(|n| attempt >= n);

        // An empty password is an unauthenticated bind, which servers accept
        let accepted = !forced_reject
            && (password.is_empty()
                || (dn == state.service_dn && password == state.service_password)
                || state
                    .entries
                    .iter()
                    .any(|entry| entry.dn == dn && entry.password == password));

        if accepted {
            state.bound_dn = Some(dn.to_string());
            Ok(BindOutcome::Accepted)
        } else {
            state.bound_dn = None;
            Ok(BindOutcome::Rejected {
                code: INVALID_CREDENTIALS,
                message: "Invalid credentials".to_string(),
            })
        }
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.searches.push(request.clone());

        if let Some(message) = &state.search_error {
            return Err(Error::Directory(format!("search failed: {}", message)));
        }

        let (attribute, value) = parse_equality_filter(&request.filter)?;
        let base = request.base_dn.to_ascii_lowercase();

        Ok(state
            .entries
            .iter()
            .filter(|entry| entry.dn.to_ascii_lowercase().ends_with(&base))
            .filter(|entry| match (&value, entry.attributes.get(&attribute)) {
                (None, Some(_)) => true,
                (Some(expected), Some(actual)) => expected == actual,
                (_, None) => false,
            })
            .map(|entry| entry.dn.clone())
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.unbinds += 1;
        state.bound_dn = None;
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.open_connections = state.open_connections.saturating_sub(1);
    }
}

/// `(attr=value)` into the attribute and the unescaped value; `None` for `*`
fn parse_equality_filter(filter: &str) -> Result<(String, Option<String>)> {
    let unsupported = || Error::Directory(format!("unsupported filter: {}", filter));

    let inner = filter
        .strip_prefix('(')
        .and_then(|f| f.strip_suffix(')'))
        .ok_or_else(unsupported)?;
    if inner.contains(['(', ')']) {
        return Err(unsupported());
    }

    let (attribute, value) = inner.split_once('=').ok_or_else(unsupported)?;
    if value == "*" {
        return Ok((attribute.to_string(), None));
    }
    if value.contains('*') {
        return Err(unsupported());
    }

    Ok((attribute.to_string(), Some(unescape(value).ok_or_else(unsupported)?)))
}

fn unescape(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = value.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
