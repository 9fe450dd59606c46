//! Tenant authorization.
//!
//! Rules, first match wins:
//! 1. Global admin → allowed on every tenant
//! 2. Tenant owner → allowed
//! 3. Any membership (owner, admin or editor) → allowed
//! 4. Otherwise → forbidden
//!
//! Global admin is an intentional elevation that bypasses all tenant scoping.
//! It is never derived from memberships and is not revoked per tenant.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::tenancy::{DirectoryError, MembershipStore, Role, Tenant, User};

/// Why access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "role", rename_all = "snake_case")]
pub enum AccessGrant {
    GlobalAdmin,
    Owner,
    Member(Role),
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("user has no access to this tenant")]
    Forbidden,

    #[error("membership lookup failed: {0}")]
    Directory(#[source] DirectoryError),
}

pub struct AccessController {
    memberships: Arc<dyn MembershipStore>,
}

impl AccessController {
    pub fn new(memberships: Arc<dyn MembershipStore>) -> Self {
        Self { memberships }
    }

    pub async fn authorize(&self, user: &User, tenant: &Tenant) -> Result<AccessGrant, AccessError> {
        if user.is_global_admin {
            return Ok(AccessGrant::GlobalAdmin);
        }
        if tenant.owner_user_id == user.id {
            return Ok(AccessGrant::Owner);
        }

        match self.memberships.find(tenant.id, user.id).await {
            Ok(membership) => Ok(AccessGrant::Member(membership.role)),
            Err(DirectoryError::NotFound) => Err(AccessError::Forbidden),
            Err(e) => Err(AccessError::Directory(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::{Membership, MemoryDirectory, TenantId, UserId};

    fn user(id: i64, admin: bool) -> User {
        User {
            id: UserId(id),
            email: format!("user{id}@example.org"),
            password_hash: String::new(),
            is_global_admin: admin,
        }
    }

    fn tenant(id: i64, owner: i64) -> Tenant {
        Tenant {
            id: TenantId(id),
            subdomain: format!("camp{id}"),
            custom_domain: None,
            owner_user_id: UserId(owner),
            allowed_ips: Vec::new(),
        }
    }

    fn controller() -> AccessController {
        let dir = Arc::new(MemoryDirectory::new());
        dir.upsert_membership(Membership {
            tenant_id: TenantId(1),
            user_id: UserId(3),
            role: Role::Editor,
        });
        AccessController::new(dir)
    }

    #[tokio::test]
    async fn test_global_admin_allowed_everywhere() {
        let access = controller();
        let admin = user(9, true);
        for id in 1..=3 {
            assert_eq!(
                access.authorize(&admin, &tenant(id, 1)).await.unwrap(),
                AccessGrant::GlobalAdmin
            );
        }
    }

    #[tokio::test]
    async fn test_owner_and_member_allowed() {
        let access = controller();
        assert_eq!(
            access.authorize(&user(1, false), &tenant(1, 1)).await.unwrap(),
            AccessGrant::Owner
        );
        assert_eq!(
            access.authorize(&user(3, false), &tenant(1, 1)).await.unwrap(),
            AccessGrant::Member(Role::Editor)
        );
    }

    #[tokio::test]
    async fn test_outsider_forbidden() {
        let access = controller();
        assert!(matches!(
            access.authorize(&user(4, false), &tenant(1, 1)).await,
            Err(AccessError::Forbidden)
        ));
        // Membership on tenant 1 grants nothing on tenant 2.
        assert!(matches!(
            access.authorize(&user(3, false), &tenant(2, 1)).await,
            Err(AccessError::Forbidden)
        ));
    }
}
