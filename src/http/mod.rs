//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout, body limit)
//!     → pipeline::admission_middleware (tenant-scoped routes)
//!       or pipeline::system_guard (/_gate/*)
//!     → handlers.rs (login, logout, session, site, health, status)
//!     → response (+ rate limit headers, CSRF cookie on first contact)
//! ```

pub mod cookies;
pub mod handlers;
pub mod server;

pub use server::GateServer;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";
