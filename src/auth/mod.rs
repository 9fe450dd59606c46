//! Authentication and authorization.
//!
//! # Data Flow
//! ```text
//! stinky_token cookie
//!     → session.rs (verify signature and validity window → Claims)
//!     → UserStore lookup (claims.user_id → User)
//!     → access.rs (User × Tenant → AccessGrant or Forbidden)
//! ```

pub mod access;
pub mod session;

pub use access::{AccessController, AccessError, AccessGrant};
pub use session::{Claims, SessionAuthenticator, SessionError};
