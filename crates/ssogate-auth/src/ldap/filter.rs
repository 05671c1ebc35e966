//! Search filter construction

use ssogate_core::config::FILTER_PLACEHOLDER;
use std::borrow::Cow;
use std::fmt::Write;

/// Escape an assertion value for use inside an LDAP search filter (RFC 4515).
///
/// `ldap3::ldap_escape` covers `*`, `(`, `)`, `\` and NUL; remaining control
/// characters are hex-escaped on top, so user input can only ever be matched
/// literally.
pub fn escape_filter_value(value: &str) -> Cow<'_, str> {
    let escaped = ldap3::ldap_escape(value);
    if !escaped.chars().any(char::is_control) {
        return escaped;
    }

    let mut out = String::with_capacity(escaped.len() + 8);
    for ch in escaped.chars() {
        if ch.is_control() {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).as_bytes() {
                let _ = write!(&mut out, "\\{:02x}", byte);
            }
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

/// Substitute the escaped username into the configured filter template
pub fn build_user_filter(template: &str, username: &str) -> String {
    template.replacen(FILTER_PLACEHOLDER, &escape_filter_value(username), 1)
}
