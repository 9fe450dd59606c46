//! In-process directory backing all three storage collaborators.
//!
//! Stands in for the ORM-backed store when running standalone and in tests.
//! Tenants are soft-deleted so their domains can be reused while the record
//! itself stays around for audit.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::config::SeedConfig;
use crate::tenancy::directory::{DirectoryError, MembershipStore, TenantDirectory, UserStore};
use crate::tenancy::model::{Membership, Tenant, TenantId, User, UserId};

#[derive(Debug, Clone)]
struct TenantRecord {
    tenant: Tenant,
    deleted: bool,
}

/// Thread-safe in-memory tenant directory, user store and membership store.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    tenants: DashMap<TenantId, TenantRecord>,
    users: DashMap<UserId, User>,
    memberships: DashMap<(TenantId, UserId), Membership>,
    /// Serializes provisioning so uniqueness checks and inserts are atomic.
    provisioning: Mutex<()>,
    /// Number of domain lookups served (custom domain + subdomain).
    lookups: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from the `[seed]` configuration section.
    pub fn from_seed(seed: &SeedConfig) -> Result<Self, DirectoryError> {
        let directory = Self::new();
        for user in &seed.users {
            directory.insert_user(User {
                id: user.id,
                email: user.email.clone(),
                password_hash: user.password_hash.clone(),
                is_global_admin: user.is_global_admin,
            });
        }
        for tenant in &seed.tenants {
            directory.insert_tenant(tenant.clone())?;
        }
        for membership in &seed.memberships {
            directory.upsert_membership(membership.clone());
        }

        tracing::info!(
            tenants = directory.tenants.len(),
            users = directory.users.len(),
            memberships = directory.memberships.len(),
            "Seeded in-memory directory"
        );
        Ok(directory)
    }

    /// Add a tenant. Domains are stored lowercase and must not collide with
    /// any active tenant.
    pub fn insert_tenant(&self, mut tenant: Tenant) -> Result<(), DirectoryError> {
        tenant.subdomain = tenant.subdomain.to_lowercase();
        tenant.custom_domain = tenant.custom_domain.map(|d| d.to_lowercase());

        let _guard = self.provisioning.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_available(&tenant.subdomain, tenant.custom_domain.as_deref(), tenant.id)?;
        self.tenants.insert(tenant.id, TenantRecord { tenant, deleted: false });
        Ok(())
    }

    /// Soft-delete a tenant, releasing its subdomain and custom domain.
    pub fn delete_tenant(&self, id: TenantId) -> Result<(), DirectoryError> {
        let _guard = self.provisioning.lock().unwrap_or_else(PoisonError::into_inner);
        match self.tenants.get_mut(&id) {
            Some(mut record) if !record.deleted => {
                record.deleted = true;
                Ok(())
            }
            _ => Err(DirectoryError::NotFound),
        }
    }

    /// Point a tenant at a new custom domain (or clear it).
    pub fn set_custom_domain(&self, id: TenantId, domain: Option<&str>) -> Result<(), DirectoryError> {
        let domain = domain.map(str::to_lowercase);
        let _guard = self.provisioning.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(domain) = domain.as_deref() {
            let taken = self.tenants.iter().any(|r| {
                !r.deleted && r.tenant.id != id && r.tenant.custom_domain.as_deref() == Some(domain)
            });
            if taken {
                return Err(DirectoryError::Conflict {
                    field: "custom_domain",
                    value: domain.to_string(),
                });
            }
        }

        match self.tenants.get_mut(&id) {
            Some(mut record) if !record.deleted => {
                record.tenant.custom_domain = domain;
                Ok(())
            }
            _ => Err(DirectoryError::NotFound),
        }
    }

    pub fn insert_user(&self, mut user: User) {
        user.email = user.email.to_lowercase();
        self.users.insert(user.id, user);
    }

    /// Insert or replace the membership for its (tenant, user) pair.
    pub fn upsert_membership(&self, membership: Membership) {
        self.memberships
            .insert((membership.tenant_id, membership.user_id), membership);
    }

    pub fn remove_membership(&self, tenant_id: TenantId, user_id: UserId) -> bool {
        self.memberships.remove(&(tenant_id, user_id)).is_some()
    }

    /// Domain lookups served so far.
    pub fn domain_lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn ensure_available(
        &self,
        subdomain: &str,
        custom_domain: Option<&str>,
        id: TenantId,
    ) -> Result<(), DirectoryError> {
        for record in self.tenants.iter() {
            if record.deleted || record.tenant.id == id {
                continue;
            }
            if record.tenant.subdomain == subdomain {
                return Err(DirectoryError::Conflict {
                    field: "subdomain",
                    value: subdomain.to_string(),
                });
            }
            if custom_domain.is_some() && record.tenant.custom_domain.as_deref() == custom_domain {
                return Err(DirectoryError::Conflict {
                    field: "custom_domain",
                    value: custom_domain.unwrap_or_default().to_string(),
                });
            }
        }
        Ok(())
    }

    fn find_active(&self, predicate: impl Fn(&Tenant) -> bool) -> Result<Tenant, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.tenants
            .iter()
            .find(|r| !r.deleted && predicate(&r.tenant))
            .map(|r| r.tenant.clone())
            .ok_or(DirectoryError::NotFound)
    }
}

#[async_trait]
impl TenantDirectory for MemoryDirectory {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Tenant, DirectoryError> {
        self.find_active(|t| t.subdomain == subdomain)
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Tenant, DirectoryError> {
        self.find_active(|t| t.custom_domain.as_deref() == Some(domain))
    }

    async fn find_by_id(&self, id: TenantId) -> Result<Tenant, DirectoryError> {
        match self.tenants.get(&id) {
            Some(record) if !record.deleted => Ok(record.tenant.clone()),
            _ => Err(DirectoryError::NotFound),
        }
    }
}

#[async_trait]
impl UserStore for MemoryDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<User, DirectoryError> {
        self.users
            .get(&id)
            .map(|u| u.value().clone())
            .ok_or(DirectoryError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, DirectoryError> {
        let email = email.to_lowercase();
        self.users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.value().clone())
            .ok_or(DirectoryError::NotFound)
    }
}

#[async_trait]
impl MembershipStore for MemoryDirectory {
    async fn find(&self, tenant_id: TenantId, user_id: UserId) -> Result<Membership, DirectoryError> {
        self.memberships
            .get(&(tenant_id, user_id))
            .map(|m| m.value().clone())
            .ok_or(DirectoryError::NotFound)
    }
}
