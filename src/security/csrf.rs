//! Double-submit CSRF protection.
//!
//! A random token is handed out as a script-readable cookie on first contact.
//! State-changing requests must echo it back in a header or form field; the
//! echoed value is compared to the cookie in constant time.

use axum::http::{HeaderMap, Method};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::CsrfConfig;

pub const CSRF_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CsrfError {
    #[error("csrf token missing")]
    Missing,
    #[error("csrf token mismatch")]
    Mismatch,
}

/// Generate a fresh base64url token from 32 random bytes.
pub fn generate_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Clone)]
pub struct CsrfGuard {
    cookie_name: String,
    header_name: String,
    form_field: String,
    max_age: Duration,
    secure: bool,
}

impl CsrfGuard {
    pub fn from_config(config: &CsrfConfig, secure: bool) -> Self {
        Self {
            cookie_name: config.cookie_name.clone(),
            header_name: config.header_name.to_lowercase(),
            form_field: config.form_field.clone(),
            max_age: Duration::from_secs(config.cookie_max_age_hours.saturating_mul(3600)),
            secure,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// POST, PUT, PATCH and DELETE must carry the token.
    pub fn requires_check(method: &Method) -> bool {
        matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
    }

    /// The token echoed in the header, if any.
    pub fn echoed_header<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(self.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    /// The token echoed in a url-encoded form body, if any.
    pub fn echoed_form_field(&self, body: &[u8]) -> Option<String> {
        url::form_urlencoded::parse(body)
            .find(|(key, _)| key == self.form_field.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|v| !v.is_empty())
    }

    pub fn verify(&self, cookie: Option<&str>, echoed: Option<&str>) -> Result<(), CsrfError> {
        let cookie = cookie.filter(|c| !c.is_empty()).ok_or(CsrfError::Missing)?;
        let echoed = echoed.ok_or(CsrfError::Missing)?;

        if cookie.as_bytes().ct_eq(echoed.as_bytes()).into() {
            Ok(())
        } else {
            Err(CsrfError::Mismatch)
        }
    }

    /// `Set-Cookie` value issuing `token`. Not HttpOnly: page scripts embed it.
    pub fn set_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Lax",
            self.cookie_name,
            token,
            self.max_age.as_secs()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}
