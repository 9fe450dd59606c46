//! Host header normalization and subdomain extraction.
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Only single-label subdomains map to tenants; `a.b.example.org` does not
//! - Bracketed IPv6 literals keep their brackets, only the port is dropped

/// Lowercase a host header value and strip a trailing `:port`.
pub fn normalize_host(raw: &str) -> String {
    let host = raw.trim().to_lowercase();

    if host.starts_with('[') {
        // [v6]:port → [v6]
        return match host.find(']') {
            Some(end) => host[..=end].to_string(),
            None => host,
        };
    }

    match host.rsplit_once(':') {
        // A single colon followed by digits is a port. More colons means a
        // bare IPv6 literal, which is left untouched.
        Some((name, port))
            if !name.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name.to_string()
        }
        _ => host,
    }
}

/// Extract the tenant subdomain from a normalized host.
///
/// The host must end with `"." + base_domain` and the remaining prefix must
/// be a single non-empty label.
pub fn extract_subdomain<'a>(host: &'a str, base_domain: &str) -> Option<&'a str> {
    if base_domain.is_empty() {
        return None;
    }
    let prefix = host.strip_suffix(base_domain)?.strip_suffix('.')?;
    if prefix.is_empty() || prefix.contains('.') {
        return None;
    }
    Some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Camp.Example.org"), "camp.example.org");
        assert_eq!(normalize_host("camp.example.org:8080"), "camp.example.org");
        assert_eq!(normalize_host("[::1]:443"), "[::1]");
        assert_eq!(normalize_host("::1"), "::1");
        assert_eq!(normalize_host("camp.example.org:"), "camp.example.org:");
    }

    #[test]
    fn test_extract_subdomain() {
        assert_eq!(extract_subdomain("camp.example.org", "example.org"), Some("camp"));
        assert_eq!(extract_subdomain("a.b.example.org", "example.org"), None);
        assert_eq!(extract_subdomain("example.org", "example.org"), None);
        assert_eq!(extract_subdomain("campexample.org", "example.org"), None);
        assert_eq!(extract_subdomain(".example.org", "example.org"), None);
        assert_eq!(extract_subdomain("camp.other.org", "example.org"), None);
    }
}
