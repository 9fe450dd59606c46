//! Cookie header parsing and session cookie construction.

use axum::http::{header, HeaderMap};
use std::time::Duration;

/// Value of the first cookie called `name` across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

/// HttpOnly session cookie living as long as the token.
pub fn session_cookie(name: &str, token: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{name}={token}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(name: &str, secure: bool) -> String {
    session_cookie(name, "", Duration::ZERO, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_value_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; csrf_token=abc"));
        headers.append(header::COOKIE, HeaderValue::from_static("stinky_token=jwt.value.sig"));

        assert_eq!(cookie_value(&headers, "csrf_token"), Some("abc"));
        assert_eq!(cookie_value(&headers, "stinky_token"), Some("jwt.value.sig"));
        assert_eq!(cookie_value(&headers, "token"), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("stinky_token", "t", Duration::from_secs(8 * 3600), true);
        assert_eq!(
            cookie,
            "stinky_token=t; Path=/; Max-Age=28800; HttpOnly; SameSite=Lax; Secure"
        );
        assert!(clear_cookie("stinky_token", false).contains("Max-Age=0"));
    }
}
