//! Per-request admission context.

use std::net::IpAddr;
use std::sync::Arc;

use crate::auth::{AccessGrant, Claims};
use crate::pipeline::stage::RateHeaders;
use crate::tenancy::{Tenant, User};

/// What admission learned about a request. Inserted into the request
/// extensions once every stage has passed.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: Option<IpAddr>,

    /// Tenant named by the Host header.
    pub host_tenant: Option<Arc<Tenant>>,

    /// Tenant the request acts on: the override tenant when one was named
    /// and authorized, otherwise the host tenant.
    pub tenant: Option<Arc<Tenant>>,

    /// `None` on public paths.
    pub user: Option<Arc<User>>,
    pub claims: Option<Claims>,
    pub grant: Option<AccessGrant>,

    /// CSRF token the client holds, or was just issued.
    pub csrf_token: Option<String>,

    pub rate: Option<RateHeaders>,
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// True when the effective tenant differs from the host tenant.
    pub fn is_override(&self) -> bool {
        match (&self.host_tenant, &self.tenant) {
            (Some(host), Some(effective)) => host.id != effective.id,
            _ => false,
        }
    }
}
