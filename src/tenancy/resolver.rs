//! Host → tenant resolution with a TTL cache.
//!
//! # Responsibilities
//! - Normalize the Host header into a cache key
//! - Serve live cache entries without touching the directory
//! - On miss: custom domain first, then subdomain under the base domain
//!
//! # Design Decisions
//! - Expired entries are deleted lazily on the first read past expiry
//! - The directory is queried with no cache lock held; concurrent misses for
//!   the same host both write, last write wins
//! - Directory mutations are visible here only after the TTL (bounded staleness)

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::tenancy::directory::{DirectoryError, TenantDirectory};
use crate::tenancy::host::{extract_subdomain, normalize_host};
use crate::tenancy::model::Tenant;

/// How long a resolved tenant is served from cache.
pub const TENANT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no tenant for host `{0}`")]
    NotFound(String),

    #[error("tenant directory lookup failed: {0}")]
    Directory(#[source] DirectoryError),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    tenant: Arc<Tenant>,
    expires_at: Instant,
}

/// Resolves the tenant a request belongs to.
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    base_domain: String,
    cache: DashMap<String, CacheEntry>,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>, base_domain: impl Into<String>) -> Self {
        Self {
            directory,
            base_domain: base_domain.into().to_lowercase(),
            cache: DashMap::new(),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Number of cache entries, live or not yet lazily evicted.
    pub fn cached_hosts(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a raw Host header value to its tenant.
    pub async fn resolve(&self, host_header: &str) -> Result<Arc<Tenant>, ResolveError> {
        let host = normalize_host(host_header);
        let now = Instant::now();

        // Copy out of the map so no shard lock survives past this statement.
        let cached = self
            .cache
            .get(&host)
            .map(|entry| (entry.tenant.clone(), entry.expires_at));

        match cached {
            Some((tenant, expires_at)) if now < expires_at => {
                metrics::record_tenant_cache("hit");
                return Ok(tenant);
            }
            Some(_) => {
                self.cache.remove_if(&host, |_, entry| now >= entry.expires_at);
                metrics::record_tenant_cache("expired");
            }
            None => metrics::record_tenant_cache("miss"),
        }

        let tenant = Arc::new(self.lookup(&host).await?);
        self.cache.insert(
            host.clone(),
            CacheEntry {
                tenant: tenant.clone(),
                expires_at: Instant::now() + TENANT_CACHE_TTL,
            },
        );

        tracing::debug!(host = %host, tenant_id = %tenant.id, "Tenant resolved from directory");
        Ok(tenant)
    }

    async fn lookup(&self, host: &str) -> Result<Tenant, ResolveError> {
        if host.is_empty() {
            return Err(ResolveError::NotFound(String::new()));
        }

        match self.directory.find_by_custom_domain(host).await {
            Ok(tenant) => return Ok(tenant),
            Err(DirectoryError::NotFound) => {}
            Err(e) => return Err(ResolveError::Directory(e)),
        }

        let subdomain = extract_subdomain(host, &self.base_domain)
            .ok_or_else(|| ResolveError::NotFound(host.to_string()))?;

        match self.directory.find_by_subdomain(subdomain).await {
            Ok(tenant) => Ok(tenant),
            Err(DirectoryError::NotFound) => Err(ResolveError::NotFound(host.to_string())),
            Err(e) => Err(ResolveError::Directory(e)),
        }
    }
}
