//! Request admission.
//!
//! # Data Flow
//! ```text
//! request
//!     → TenantResolver   (Host → tenant, 404)
//!     → IpFilter         (global blocklist + tenant allowlist, 403)
//!     → RateLimiter      (sensitive paths only, 429)
//!     → CsrfGuard        (POST/PUT/PATCH/DELETE, 403)
//!     → override lookup  (X-Site-Id / ?site_id, 404)
//!     → SessionAuthenticator (401)   ┐ skipped on
//!     → AccessController     (403)   ┘ public paths
//!     → RequestContext in request extensions → handler
//! ```
//!
//! # Design Decisions
//! - The pipeline is one explicitly constructed value shared via `Arc`
//! - An authorized override replaces the context tenant
//! - Rejection reasons are logged but never returned to the client

pub mod admission;
pub mod context;
pub mod stage;

pub use admission::{admission_middleware, system_guard, AdmissionRequest, Collaborators, RequestPipeline};
pub use context::RequestContext;
pub use stage::{AdmissionError, AuthFailure, ForbiddenReason, RateHeaders, Rejection, Stage};
