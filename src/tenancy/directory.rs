//! Collaborator interfaces for tenant, user and membership storage.
//!
//! The admission core never assumes a backing store. Lookups are awaited
//! inline by the request task and are not retried; any failure other than
//! `NotFound` is surfaced to the caller as an internal error.

use async_trait::async_trait;
use thiserror::Error;

use crate::tenancy::model::{Membership, Tenant, TenantId, User, UserId};

/// Errors returned by the storage collaborators.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("record not found")]
    NotFound,

    #[error("{field} `{value}` is already used by an active tenant")]
    Conflict { field: &'static str, value: String },

    #[error("directory backend failure: {0}")]
    Backend(String),
}

impl DirectoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound)
    }
}

/// Tenant lookups. Deleted tenants are never returned.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Tenant, DirectoryError>;

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Tenant, DirectoryError>;

    /// Used for explicit tenant overrides.
    async fn find_by_id(&self, id: TenantId) -> Result<Tenant, DirectoryError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<User, DirectoryError>;

    async fn find_by_email(&self, email: &str) -> Result<User, DirectoryError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find(&self, tenant_id: TenantId, user_id: UserId) -> Result<Membership, DirectoryError>;
}
