//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Overrides the configured base domain.
pub const BASE_DOMAIN_ENV: &str = "CAMP_BASE_DOMAIN";

/// Overrides the configured bind address.
pub const BIND_ADDRESS_ENV: &str = "CAMP_BIND_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    /// Neither `CAMP_SESSION_SECRET` nor `session.secret` is set.
    #[error("no session signing secret configured (set CAMP_SESSION_SECRET or session.secret)")]
    MissingSecret,
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, applying environment
/// overrides before validation.
pub fn load_config(path: &Path) -> Result<GateConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Parse configuration text. `env` supplies override values by variable name.
pub fn parse_config(
    content: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GateConfig, ConfigError> {
    let config: GateConfig = toml::from_str(content)?;
    finalize(config, env)
}

/// Built-in defaults with environment overrides applied, for running
/// without a configuration file.
pub fn default_config(env: impl Fn(&str) -> Option<String>) -> Result<GateConfig, ConfigError> {
    finalize(GateConfig::default(), env)
}

fn finalize(
    mut config: GateConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GateConfig, ConfigError> {
    apply_env_overrides(&mut config, env);
    normalize(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `CAMP_BASE_DOMAIN` and `CAMP_BIND_ADDRESS`. Empty values are ignored.
pub fn apply_env_overrides(config: &mut GateConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(domain) = env(BASE_DOMAIN_ENV).filter(|v| !v.is_empty()) {
        config.tenancy.base_domain = domain;
    }
    if let Some(addr) = env(BIND_ADDRESS_ENV).filter(|v| !v.is_empty()) {
        config.listener.bind_address = addr;
    }
}

/// Hosts compare case-insensitively; store the domain the way hosts are
/// normalized.
fn normalize(config: &mut GateConfig) {
    config.tenancy.base_domain = config
        .tenancy
        .base_domain
        .trim()
        .trim_matches('.')
        .to_ascii_lowercase();
}
