//! Startup orchestration.
//!
//! Config is loaded and validated by the caller; this seeds the directory and
//! builds the server. Any failure here is fatal.

use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigError, GateConfig};
use crate::http::GateServer;
use crate::pipeline::Collaborators;
use crate::tenancy::{DirectoryError, MemoryDirectory};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to seed directory: {0}")]
    Seed(#[from] DirectoryError),
}

/// Seed the in-memory directory from `[seed]` and build the server over it.
pub fn build_server(config: GateConfig) -> Result<GateServer, StartupError> {
    let directory = Arc::new(MemoryDirectory::from_seed(&config.seed)?);
    let server = GateServer::new(config, Collaborators::from_memory(directory))?;
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::{Tenant, TenantId, UserId};

    fn seeded() -> GateConfig {
        let mut config = GateConfig::default();
        config.session.secret = Some("startup-secret".into());
        for (id, sub) in [(1, "camp"), (2, "CAMP")] {
            config.seed.tenants.push(Tenant {
                id: TenantId(id),
                subdomain: sub.into(),
                custom_domain: None,
                owner_user_id: UserId(1),
                allowed_ips: Vec::new(),
            });
        }
        config
    }

    #[test]
    fn test_duplicate_seed_subdomain_is_fatal() {
        assert!(matches!(build_server(seeded()), Err(StartupError::Seed(_))));
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        if std::env::var(crate::auth::session::SECRET_ENV).is_ok() {
            return;
        }
        let mut config = seeded();
        config.seed.tenants.pop();
        config.session.secret = None;
        assert!(matches!(
            build_server(config),
            Err(StartupError::Config(ConfigError::MissingSecret))
        ));
    }
}
