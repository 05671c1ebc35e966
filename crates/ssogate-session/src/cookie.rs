//! Cookie header helpers

use http::header::COOKIE;
use http::HeaderMap;

/// Attributes applied to every `Set-Cookie` the store emits
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub name: String,
    pub path: String,
    pub max_age: u64,
    pub secure: bool,
}

impl CookieOptions {
    /// `Set-Cookie` value storing `value`
    pub fn set_cookie(&self, value: &str) -> String {
        self.format(value, self.max_age)
    }

    /// `Set-Cookie` value that makes the browser drop the cookie
    pub fn expired_cookie(&self) -> String {
        self.format("", 0)
    }

    fn format(&self, value: &str, max_age: u64) -> String {
        let secure_flag = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; Path={}; Max-Age={}; HttpOnly{}; SameSite=Lax",
            self.name, value, self.path, max_age, secure_flag
        )
    }
}

/// Value of the first cookie called `name` across all `Cookie` headers
pub fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then_some(value.trim().trim_matches('"'))
        })
        .filter(|value| !value.is_empty())
}
