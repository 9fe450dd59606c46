//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, env overrides, normalize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → consumed once by RequestPipeline::new
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → mpsc channel to the server
//!     → global blocklist swapped in place
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Environment wins over file for the secret, base domain and bind address
//! - A missing signing secret is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{apply_env_overrides, default_config, load_config, parse_config, ConfigError};
pub use schema::{
    CsrfConfig, GateConfig, IpFilterConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig,
    RateLimitRule, RoutesConfig, SecurityConfig, SeedConfig, SeedUser, SessionConfig,
    TenancyConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
