//! Outbound session identifier as handed to the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A newly issued identifier and the attributes the transport must attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,

    /// Session identifier.
    pub value: String,

    /// Moment the identifier stops being usable.
    pub expires_at: DateTime<Utc>,

    /// Always "/" (every path).
    pub path: String,

    /// Hidden from client-side scripts.
    pub http_only: bool,
}

impl SessionCookie {
    pub fn new(name: &str, value: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            expires_at,
            path: "/".to_string(),
            http_only: true,
        }
    }

    /// Build the `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut cookie = format!("{}={}", self.name, self.value);

        cookie.push_str(&format!("; Path={}", self.path));
        cookie.push_str(&format!(
            "; Expires={}",
            self.expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
        ));

        if self.http_only {
            cookie.push_str("; HttpOnly");
        }

        cookie
    }
}

/// Parse the session ID named `name` from a `Cookie` request header.
///
/// An empty value counts as absent.
pub fn parse_session_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
