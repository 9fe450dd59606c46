//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, addresses parse)
//! - Check CIDR lists and seed references before they reach the hot path
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderName;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GateConfig;
use crate::security::ip_filter::parse_cidrs;

/// Upper bound for session and CSRF cookie lifetimes.
pub const MAX_LIFETIME_HOURS: u64 = 24 * 365;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let domain = &config.tenancy.base_domain;
    if domain.is_empty() || domain.contains(['/', ':', ' ']) {
        errors.push(ValidationError::new(
            "tenancy.base_domain",
            format!("'{domain}' is not a domain name"),
        ));
    }

    if config.session.cookie_name.is_empty() {
        errors.push(ValidationError::new("session.cookie_name", "must not be empty"));
    }
    if config.csrf.cookie_name.is_empty() {
        errors.push(ValidationError::new("csrf.cookie_name", "must not be empty"));
    }
    if config.csrf.form_field.is_empty() {
        errors.push(ValidationError::new("csrf.form_field", "must not be empty"));
    }
    check_header_name(&mut errors, "csrf.header_name", &config.csrf.header_name);
    check_lifetime(&mut errors, "session.expiry_hours", config.session.expiry_hours);
    check_lifetime(&mut errors, "csrf.cookie_max_age_hours", config.csrf.cookie_max_age_hours);
    check_header_name(&mut errors, "routes.override_header", &config.routes.override_header);

    validate_rate_limits(config, &mut errors);

    if let Err(e) = parse_cidrs(&config.ip_filter.global_blocklist) {
        errors.push(ValidationError::new("ip_filter.global_blocklist", e.to_string()));
    }

    for (i, path) in config.routes.public_paths.iter().enumerate() {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("routes.public_paths[{i}]"),
                "must start with '/'",
            ));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    let obs = &config.observability;
    if !matches!(obs.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("'{}' is not one of pretty, json", obs.log_format),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    validate_seed(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_header_name(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if HeaderName::try_from(value).is_err() {
        errors.push(ValidationError::new(field, format!("'{value}' is not a valid header name")));
    }
}

fn validate_rate_limits(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    let mut names = HashSet::new();
    for (i, rule) in config.rate_limit.rules.iter().enumerate() {
        let field = format!("rate_limit.rules[{i}]");
        if !names.insert(rule.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate rule name '{}'", rule.name),
            ));
        }
        if !rule.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(&field, "path_prefix must start with '/'"));
        }
        if rule.capacity == 0 {
            errors.push(ValidationError::new(&field, "capacity must be greater than 0"));
        }
        if rule.interval_secs == 0 {
            errors.push(ValidationError::new(&field, "interval_secs must be greater than 0"));
        }
    }

    if config.rate_limit.enabled && config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than 0",
        ));
    }
}

fn validate_seed(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    let seed = &config.seed;
    let user_ids: HashSet<_> = seed.users.iter().map(|u| u.id).collect();
    let tenant_ids: HashSet<_> = seed.tenants.iter().map(|t| t.id).collect();

    for tenant in &seed.tenants {
        let field = format!("seed.tenants[{}]", tenant.id);
        if tenant.subdomain.is_empty() {
            errors.push(ValidationError::new(&field, "subdomain must not be empty"));
        }
        if !user_ids.contains(&tenant.owner_user_id) {
            errors.push(ValidationError::new(
                &field,
                format!("owner {} is not a seeded user", tenant.owner_user_id),
            ));
        }
        if let Err(e) = parse_cidrs(&tenant.allowed_ips) {
            errors.push(ValidationError::new(&field, format!("allowed_ips: {e}")));
        }
    }

    for m in &seed.memberships {
        if !tenant_ids.contains(&m.tenant_id) || !user_ids.contains(&m.user_id) {
            errors.push(ValidationError::new(
                "seed.memberships",
                format!("membership ({}, {}) references an unknown record", m.tenant_id, m.user_id),
            ));
        }
    }
}

fn check_lifetime(errors: &mut Vec<ValidationError>, field: &str, hours: u64) {
    if hours > MAX_LIFETIME_HOURS {
        errors.push(ValidationError::new(
            field,
            format!("{hours} exceeds the maximum of {MAX_LIFETIME_HOURS} hours"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RateLimitRule, SeedUser};
    use crate::tenancy::{Tenant, TenantId, UserId};

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GateConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GateConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.csrf.header_name = "bad header".into();
        config.ip_filter.global_blocklist = vec!["10.0.0.0/99".into()];
        config.rate_limit.rules.push(RateLimitRule {
            name: "login".into(),
            path_prefix: "api".into(),
            capacity: 0,
            interval_secs: 0,
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"csrf.header_name"));
        assert!(fields.contains(&"ip_filter.global_blocklist"));
        // duplicate name, bad prefix, zero capacity, zero window
        assert_eq!(fields.iter().filter(|f| **f == "rate_limit.rules[1]").count(), 4);
    }

    #[test]
    fn test_cookie_lifetimes_are_capped() {
        let mut config = GateConfig::default();
        config.session.expiry_hours = MAX_LIFETIME_HOURS;
        config.csrf.cookie_max_age_hours = MAX_LIFETIME_HOURS;
        assert_eq!(validate_config(&config), Ok(()));

        config.session.expiry_hours = u64::MAX;
        config.csrf.cookie_max_age_hours = MAX_LIFETIME_HOURS + 1;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["session.expiry_hours", "csrf.cookie_max_age_hours"]);
    }

    #[test]
    fn test_seed_references() {
        let mut config = GateConfig::default();
        config.seed.users.push(SeedUser {
            id: UserId(1),
            email: "owner@example.org".into(),
            password_hash: String::new(),
            is_global_admin: false,
        });
        config.seed.tenants.push(Tenant {
            id: TenantId(1),
            subdomain: "camp".into(),
            custom_domain: None,
            owner_user_id: UserId(2),
            allowed_ips: vec!["garbage".into()],
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.field == "seed.tenants[1]"));
    }
}
