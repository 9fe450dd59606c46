//! Configuration schema definitions.
//!
//! Every section has defaults so a minimal file only needs the base domain
//! and the session secret (or `CAMP_SESSION_SECRET`).

use serde::{Deserialize, Serialize};

use crate::tenancy::{Membership, Tenant, UserId};

/// Root configuration for the gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Host → tenant resolution.
    pub tenancy: TenancyConfig,

    /// Session token issuance and validation.
    pub session: SessionConfig,

    pub csrf: CsrfConfig,

    /// Rate limiting for sensitive paths.
    pub rate_limit: RateLimitConfig,

    pub ip_filter: IpFilterConfig,

    /// Route classification.
    pub routes: RoutesConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Records loaded into the in-memory directory at startup.
    pub seed: SeedConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenancyConfig {
    /// Platform domain tenants live under (e.g. "example.org" for
    /// "camp.example.org").
    pub base_domain: String,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            base_domain: "localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC signing secret. `CAMP_SESSION_SECRET` takes precedence.
    pub secret: Option<String>,

    /// Session lifetime in hours. 0 means the default of 8.
    pub expiry_hours: u64,

    pub cookie_name: String,

    /// Mark cookies `Secure` (serve over TLS only).
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            expiry_hours: 8,
            cookie_name: "stinky_token".to_string(),
            secure_cookies: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub cookie_name: String,
    pub header_name: String,
    pub form_field: String,
    pub cookie_max_age_hours: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "csrf_token".to_string(),
            header_name: "X-CSRF-Token".to_string(),
            form_field: "csrf_token".to_string(),
            cookie_max_age_hours: 8,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// One limiter per rule; the longest matching prefix applies.
    pub rules: Vec<RateLimitRule>,

    /// How often idle buckets are swept.
    pub sweep_interval_secs: u64,

    /// Buckets not refilled for this long are dropped by the sweep.
    pub idle_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: vec![RateLimitRule {
                name: "login".to_string(),
                path_prefix: "/auth/login".to_string(),
                capacity: 5,
                interval_secs: 60,
            }],
            sweep_interval_secs: 300,
            idle_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitRule {
    /// Rule identifier for logging/metrics.
    pub name: String,

    pub path_prefix: String,

    /// Requests allowed per window.
    pub capacity: u32,

    /// Window length in seconds; also the `Retry-After` value.
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IpFilterConfig {
    /// CIDRs rejected on every route, tenant-scoped or not. Hot-reloadable.
    pub global_blocklist: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Path prefixes that skip session and access checks.
    pub public_paths: Vec<String>,

    /// Header naming an explicit tenant override.
    pub override_header: String,

    /// Query parameter naming an explicit tenant override.
    pub override_query: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            public_paths: vec!["/auth/login".to_string()],
            override_header: "X-Site-Id".to_string(),
            override_query: "site_id".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SeedConfig {
    pub tenants: Vec<Tenant>,
    pub users: Vec<SeedUser>,
    pub memberships: Vec<Membership>,
}

/// A user record as written in the config file. `password_hash` is a bcrypt
/// hash; it is read here but never written back out.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedUser {
    pub id: UserId,
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    #[serde(default)]
    pub is_global_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config: GateConfig = toml::from_str(
            r#"
            [tenancy]
            base_domain = "example.org"

            [session]
            secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.tenancy.base_domain, "example.org");
        assert_eq!(config.session.cookie_name, "stinky_token");
        assert_eq!(config.session.expiry_hours, 8);
        assert_eq!(config.csrf.header_name, "X-CSRF-Token");
        assert_eq!(config.rate_limit.rules.len(), 1);
        assert_eq!(config.rate_limit.sweep_interval_secs, 300);
    }

    #[test]
    fn test_seed_section() {
        let config: GateConfig = toml::from_str(
            r#"
            [[seed.tenants]]
            id = 5
            subdomain = "camp"
            owner_user_id = 1
            allowed_ips = ["10.0.0.0/24"]

            [[seed.users]]
            id = 1
            email = "owner@example.org"
            password_hash = "$2b$04$abc"

            [[seed.memberships]]
            tenant_id = 5
            user_id = 2
            role = "editor"
            "#,
        )
        .unwrap();

        assert_eq!(config.seed.tenants[0].allowed_ips, vec!["10.0.0.0/24"]);
        assert_eq!(config.seed.users[0].password_hash, "$2b$04$abc");
        assert_eq!(config.seed.memberships.len(), 1);
    }
}
