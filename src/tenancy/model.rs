//! Tenant, user and membership records as seen by the admission core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a camp site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

/// Identifier of a platform user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A camp site sharing the platform process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    /// Unique among active tenants.
    pub subdomain: String,
    /// Unique among active tenants when present.
    #[serde(default)]
    pub custom_domain: Option<String>,
    pub owner_user_id: UserId,
    /// CIDR allowlist in stored order. Empty means unrestricted.
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

/// A platform user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Opaque to the admission core; only the login handler verifies it.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Bypasses every per-tenant check. Never granted implicitly.
    #[serde(default)]
    pub is_global_admin: bool,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("is_global_admin", &self.is_global_admin)
            .finish_non_exhaustive()
    }
}

/// Role a member holds on a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Editor,
}

/// Grants `user_id` a role on `tenant_id`. At most one per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
}
