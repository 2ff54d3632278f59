//! `sid` cookie parsing and `Set-Cookie` rendering.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

pub const SESSION_COOKIE_NAME: &str = "sid";

/// Attributes shared by every session cookie the gateway emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub max_age_seconds: i64,
    pub secure: bool,
}

impl CookiePolicy {
    /// `secure` is only honored in production; a secure-only cookie on a plain
    /// HTTP deployment would never be sent back and log every user out.
    #[must_use]
    pub fn new(max_age_seconds: i64, production: bool, secure_requested: bool) -> Self {
        Self {
            max_age_seconds,
            secure: production && secure_requested,
        }
    }

    /// `Set-Cookie` value carrying a signed session id.
    ///
    /// # Errors
    /// Returns an error if the value contains bytes not allowed in a header.
    pub fn session_cookie(&self, signed_value: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={signed_value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.max_age_seconds
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// `Set-Cookie` value that makes the browser drop the session cookie.
    ///
    /// # Errors
    /// Returns an error if the header value cannot be built.
    pub fn clear_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

/// Raw `sid` value from the request `Cookie` headers, if any.
#[must_use]
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == SESSION_COOKIE_NAME).then(|| val.trim().trim_matches('"').to_string())
        })
        .find(|val| !val.is_empty())
}
