//! Session store
//!
//! A session is a [`SessionRecord`] sealed into one cookie. The record carries
//! its issue time so `max_age` is enforced on the server, not only by the
//! browser. Every write re-issues the cookie with a fresh timestamp.

use chrono::Utc;
use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ssogate_core::config::SessionConfig;
use ssogate_core::{Error, Result};
use ssogate_crypto::SealingKey;
use std::collections::BTreeMap;
use tracing::debug;

use crate::cookie::{find_cookie, CookieOptions};

/// Browsers reject larger cookies
pub const MAX_COOKIE_SIZE: usize = 4096;

/// Tolerated clock difference for records issued "in the future"
const CLOCK_SKEW_SECS: i64 = 60;

/// Decoded cookie contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Issue time, Unix seconds
    pub iat: i64,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self {
            iat: Utc::now().timestamp(),
            values: BTreeMap::new(),
        }
    }
}

/// Reads and writes keyed values in the session cookie.
///
/// Built once at startup and shared by the request handlers.
pub struct SessionStore {
    key: SealingKey,
    cookie: CookieOptions,
    max_age: i64,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let key = SealingKey::from_secret(config.secret_key.as_bytes())
            .map_err(|e| Error::Config(format!("session.secret_key: {}", e)))?;
        let max_age = i64::try_from(config.max_age).map_err(|_| {
            Error::Config(format!("session.max_age is out of range: {}", config.max_age))
        })?;

        Ok(Self {
            key,
            max_age,
            cookie: CookieOptions {
                name: config.name.clone(),
                path: config.path.clone(),
                max_age: config.max_age,
                secure: config.secure,
            },
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }

    /// Value stored under `key`; `None` when there is no session or no such key
    pub fn get(&self, request: &HeaderMap, key: &str) -> Result<Option<Value>> {
        Ok(self
            .load(request)?
            .and_then(|mut record| record.values.remove(key)))
    }

    pub fn get_as<T: DeserializeOwned>(&self, request: &HeaderMap, key: &str) -> Result<Option<T>> {
        self.get(request, key)?
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| Error::SessionDecode(format!("value of {}: {}", key, e)))
            })
            .transpose()
    }

    /// Store `value` under `key` and append the updated cookie to `response`.
    ///
    /// An unreadable request cookie is a `SessionDecode` error and nothing is
    /// written; callers that want to start over pass an empty request.
    pub fn set<V: Serialize + ?Sized>(
        &self,
        request: &HeaderMap,
        response: &mut HeaderMap,
        key: &str,
        value: &V,
    ) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::SessionEncode(format!("value of {}: {}", key, e)))?;

        let mut record = self.load(request)?.unwrap_or_else(SessionRecord::new);
        record.values.insert(key.to_string(), value);
        self.save(record, response)
    }

    /// Remove `key`; an absent key or absent session is not an error.
    ///
    /// Removing the last key expires the cookie. An unreadable request cookie
    /// is a `SessionDecode` error.
    pub fn delete(&self, request: &HeaderMap, response: &mut HeaderMap, key: &str) -> Result<()> {
        let Some(mut record) = self.load(request)? else {
            return Ok(());
        };

        if record.values.remove(key).is_none() {
            debug!(key, "Session key already absent");
        }
        if record.values.is_empty() {
            return self.clear(response);
        }
        self.save(record, response)
    }

    /// Expire the cookie, dropping every key at once
    pub fn clear(&self, response: &mut HeaderMap) -> Result<()> {
        append_set_cookie(response, &self.cookie.expired_cookie())
    }

    /// Decode the session cookie from request headers
    pub fn load(&self, request: &HeaderMap) -> Result<Option<SessionRecord>> {
        find_cookie(request, &self.cookie.name)
            .map(|value| self.decode(value))
            .transpose()
    }

    /// Seal `record` into a cookie value
    pub fn encode(&self, record: &SessionRecord) -> Result<String> {
        let json = serde_json::to_vec(record)
            .map_err(|e| Error::SessionEncode(e.to_string()))?;

        let encoded = self
            .key
            .seal_to_string(&json, self.cookie.name.as_bytes())
            .map_err(|e| Error::SessionEncode(e.to_string()))?;

        if encoded.len() > MAX_COOKIE_SIZE {
            return Err(Error::SessionEncode(format!(
                "sealed session is {} bytes, limit is {}",
                encoded.len(),
                MAX_COOKIE_SIZE
            )));
        }

        Ok(encoded)
    }

    /// Open a cookie value and check its age
    pub fn decode(&self, value: &str) -> Result<SessionRecord> {
        let json = self
            .key
            .open_str(value, self.cookie.name.as_bytes())
            .map_err(|e| Error::SessionDecode(e.to_string()))?;

        let record: SessionRecord =
            serde_json::from_slice(&json).map_err(|e| Error::SessionDecode(e.to_string()))?;

        let age = Utc::now().timestamp().saturating_sub(record.iat);
        if age > self.max_age {
            return Err(Error::SessionDecode("session expired".into()));
        }
        if age < -CLOCK_SKEW_SECS {
            return Err(Error::SessionDecode("session issued in the future".into()));
        }

        Ok(record)
    }

    fn save(&self, mut record: SessionRecord, response: &mut HeaderMap) -> Result<()> {
        record.iat = Utc::now().timestamp();
        let encoded = self.encode(&record)?;
        append_set_cookie(response, &self.cookie.set_cookie(&encoded))
    }
}

fn append_set_cookie(response: &mut HeaderMap, cookie: &str) -> Result<()> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| Error::SessionEncode(format!("invalid Set-Cookie header: {}", e)))?;
    response.append(SET_COOKIE, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::COOKIE;
    use ssogate_core::LOGGED_IN_USER_KEY;

    fn config() -> SessionConfig {
        SessionConfig {
            secret_key: "0123456789abcdef0123456789abcdef".to_string(),
            name: "sso".to_string(),
            max_age: 600,
            ..Default::default()
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(&config()).unwrap()
    }

    /// Turn the last `Set-Cookie` of a response into a request `Cookie` header
    fn echo_cookie(response: &HeaderMap) -> HeaderMap {
        let set_cookie = response
            .get_all(SET_COOKIE)
            .iter()
            .last()
            .expect("response sets a cookie")
            .to_str()
            .unwrap();
        let pair = set_cookie.split(';').next().unwrap();

        let mut request = HeaderMap::new();
        request.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        request
    }

    fn cookie_request(name: &str, value: &str) -> HeaderMap {
        let mut request = HeaderMap::new();
        request.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{}={}", name, value)).unwrap(),
        );
        request
    }

    #[test]
    fn test_set_then_get() {
        let store = store();
        let mut response = HeaderMap::new();

        store
            .set(&HeaderMap::new(), &mut response, LOGGED_IN_USER_KEY, "alice")
            .unwrap();

        let request = echo_cookie(&response);
        assert_eq!(
            store.get(&request, LOGGED_IN_USER_KEY).unwrap(),
            Some(Value::String("alice".to_string()))
        );
        assert_eq!(
            store.get_as::<String>(&request, LOGGED_IN_USER_KEY).unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(store.get(&request, "other").unwrap(), None);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let store = store();
        let mut response = HeaderMap::new();
        store.set(&HeaderMap::new(), &mut response, "k", &1).unwrap();

        let header = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(header.starts_with("sso="));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Max-Age=600"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(!header.contains("Secure"));
    }

    #[test]
    fn test_values_accumulate() {
        let store = store();

        let mut first = HeaderMap::new();
        store.set(&HeaderMap::new(), &mut first, "a", &1).unwrap();

        let mut second = HeaderMap::new();
        store.set(&echo_cookie(&first), &mut second, "b", &vec!["x", "y"]).unwrap();

        let request = echo_cookie(&second);
        assert_eq!(store.get_as::<i32>(&request, "a").unwrap(), Some(1));
        assert_eq!(
            store.get_as::<Vec<String>>(&request, "b").unwrap(),
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn test_delete_then_get() {
        let store = store();

        let mut first = HeaderMap::new();
        store
            .set(&HeaderMap::new(), &mut first, LOGGED_IN_USER_KEY, "alice")
            .unwrap();
        store.set(&echo_cookie(&first), &mut first, "theme", "dark").unwrap();

        let mut second = HeaderMap::new();
        store
            .delete(&echo_cookie(&first), &mut second, LOGGED_IN_USER_KEY)
            .unwrap();

        let request = echo_cookie(&second);
        assert_eq!(store.get(&request, LOGGED_IN_USER_KEY).unwrap(), None);
        assert!(store.get(&request, "theme").unwrap().is_some());

        // Deleting again is fine
        let mut third = HeaderMap::new();
        store.delete(&request, &mut third, LOGGED_IN_USER_KEY).unwrap();
    }

    #[test]
    fn test_delete_last_key_expires_cookie() {
        let store = store();

        let mut first = HeaderMap::new();
        store
            .set(&HeaderMap::new(), &mut first, LOGGED_IN_USER_KEY, "alice")
            .unwrap();

        let mut second = HeaderMap::new();
        store
            .delete(&echo_cookie(&first), &mut second, LOGGED_IN_USER_KEY)
            .unwrap();

        let header = second.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(header.contains("Max-Age=0"));
        assert_eq!(store.load(&echo_cookie(&second)).unwrap(), None);
    }

    #[test]
    fn test_no_cookie() {
        let store = store();
        assert_eq!(store.get(&HeaderMap::new(), LOGGED_IN_USER_KEY).unwrap(), None);

        let mut response = HeaderMap::new();
        store.delete(&HeaderMap::new(), &mut response, LOGGED_IN_USER_KEY).unwrap();
        assert!(response.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_tampered_cookie() {
        let store = store();
        let mut response = HeaderMap::new();
        store
            .set(&HeaderMap::new(), &mut response, LOGGED_IN_USER_KEY, "alice")
            .unwrap();

        let request = echo_cookie(&response);
        let value = find_cookie(&request, "sso").unwrap();
        let mut bytes = value.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let err = store
            .get(&cookie_request("sso", &tampered), LOGGED_IN_USER_KEY)
            .unwrap_err();
        assert!(matches!(err, Error::SessionDecode(_)));

        let err = store
            .get(&cookie_request("sso", "not-a-session"), LOGGED_IN_USER_KEY)
            .unwrap_err();
        assert!(matches!(err, Error::SessionDecode(_)));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let store = store();
        let mut response = HeaderMap::new();
        store
            .set(&HeaderMap::new(), &mut response, LOGGED_IN_USER_KEY, "alice")
            .unwrap();

        let mut other_config = config();
        other_config.secret_key = "another secret entirely".to_string();
        let other = SessionStore::new(&other_config).unwrap();

        let err = other
            .get(&echo_cookie(&response), LOGGED_IN_USER_KEY)
            .unwrap_err();
        assert!(matches!(err, Error::SessionDecode(_)));
    }

    #[test]
    fn test_cookie_bound_to_name() {
        let store = store();
        let sealed = store.encode(&SessionRecord::new()).unwrap();

        let mut renamed = config();
        renamed.name = "other".to_string();
        let other = SessionStore::new(&renamed).unwrap();

        assert!(other.decode(&sealed).is_err());
        assert!(store.decode(&sealed).is_ok());
    }

    #[test]
    fn test_expired_cookie() {
        let store = store();
        let mut record = SessionRecord::new();
        record.iat -= 601;
        record
            .values
            .insert(LOGGED_IN_USER_KEY.to_string(), Value::from("alice"));

        let sealed = store.encode(&record).unwrap();
        let err = store
            .get(&cookie_request("sso", &sealed), LOGGED_IN_USER_KEY)
            .unwrap_err();
        assert!(matches!(err, Error::SessionDecode(ref msg) if msg.contains("expired")));
    }

    #[test]
    fn test_future_cookie() {
        let store = store();
        let mut record = SessionRecord::new();
        record.iat += 3600;

        let sealed = store.encode(&record).unwrap();
        assert!(store.decode(&sealed).is_err());
    }

    #[test]
    fn test_unreadable_cookie_is_reported_on_write() {
        let store = store();
        let request = cookie_request("sso", "forged-garbage");
        let mut response = HeaderMap::new();

        let err = store
            .set(&request, &mut response, LOGGED_IN_USER_KEY, "alice")
            .unwrap_err();
        assert!(matches!(err, Error::SessionDecode(_)));

        let err = store
            .delete(&request, &mut response, LOGGED_IN_USER_KEY)
            .unwrap_err();
        assert!(matches!(err, Error::SessionDecode(_)));

        // Nothing is written on failure
        assert!(response.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_expired_cookie_is_reported_on_write() {
        let store = store();
        let mut record = SessionRecord::new();
        record.iat -= 601;
        let sealed = store.encode(&record).unwrap();

        let mut response = HeaderMap::new();
        let err = store
            .set(&cookie_request("sso", &sealed), &mut response, "k", &1)
            .unwrap_err();
        assert!(matches!(err, Error::SessionDecode(ref msg) if msg.contains("expired")));
    }

    #[test]
    fn test_long_max_age() {
        let mut config = config();
        config.max_age = i64::MAX as u64;
        let store = SessionStore::new(&config).unwrap();

        let sealed = store.encode(&SessionRecord::new()).unwrap();
        assert!(store.decode(&sealed).is_ok());
    }

    #[test]
    fn test_out_of_range_max_age_rejected() {
        let mut config = config();
        config.max_age = u64::MAX;
        assert!(matches!(SessionStore::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_oversized_session() {
        let store = store();
        let mut response = HeaderMap::new();
        let huge = "x".repeat(MAX_COOKIE_SIZE);

        let err = store
            .set(&HeaderMap::new(), &mut response, "blob", &huge)
            .unwrap_err();
        assert!(matches!(err, Error::SessionEncode(_)));
        assert!(response.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_clear_expires_cookie() {
        let store = store();
        let mut response = HeaderMap::new();
        store.clear(&mut response).unwrap();

        let header = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(header.starts_with("sso=;"));
        assert!(header.contains("Max-Age=0"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut config = config();
        config.secret_key.clear();
        assert!(matches!(SessionStore::new(&config), Err(Error::Config(_))));
    }
}
