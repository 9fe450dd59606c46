//! Multi-tenant request admission for camp sites.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;
pub mod tenancy;

pub use config::GateConfig;
pub use http::GateServer;
pub use lifecycle::Shutdown;
pub use pipeline::{RequestContext, RequestPipeline};
