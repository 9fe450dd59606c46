//! Tenancy subsystem.
//!
//! # Data Flow
//! ```text
//! Host header
//!     → host.rs (lowercase, strip port, extract subdomain)
//!     → resolver.rs (TTL cache lookup)
//!     → directory.rs (TenantDirectory on cache miss)
//!     → Return: Arc<Tenant> or NotFound
//! ```
//!
//! # Design Decisions
//! - The cache is process-local; directory changes show up after the TTL
//! - No negative caching: unknown hosts always reach the directory
//! - Storage is behind traits; `memory.rs` is the in-process implementation

pub mod directory;
pub mod host;
pub mod memory;
pub mod model;
pub mod resolver;

pub use directory::{DirectoryError, MembershipStore, TenantDirectory, UserStore};
pub use memory::MemoryDirectory;
pub use model::{Membership, Role, Tenant, TenantId, User, UserId};
pub use resolver::{ResolveError, TenantResolver, TENANT_CACHE_TTL};
