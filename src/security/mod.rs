//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved tenant + client address:
//!     → ip_filter.rs (global blocklist, tenant allowlist)
//!     → rate_limit.rs (per-client buckets on sensitive paths)
//!     → csrf.rs (double-submit check on state-changing methods)
//!     → Pass to session authentication
//! ```
//!
//! # Design Decisions
//! - Fail closed: unparsable allowlists and missing tokens reject
//! - Token comparison is constant-time
//! - Rate buckets are process-local and swept when idle

pub mod csrf;
pub mod ip_filter;
pub mod rate_limit;

pub use csrf::{CsrfError, CsrfGuard};
pub use ip_filter::IpFilter;
pub use rate_limit::{RateDecision, RateLimitRegistry, RateLimiter};

/// Segment-aware prefix match: `/auth/login` covers `/auth/login` and
/// `/auth/login/...` but not `/auth/loginx`. A prefix ending in `/` covers
/// everything below it.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}
