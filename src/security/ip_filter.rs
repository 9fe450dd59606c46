//! CIDR allow/block evaluation and client address extraction.
//!
//! # Order of evaluation
//! 1. Global blocklist match → reject
//! 2. No tenant in scope (system routes) → allow
//! 3. Tenant allowlist non-empty → client must match an entry; a list that
//!    fails to parse rejects everything (fail closed)
//! 4. Otherwise → allow
//!
//! IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`, as seen on dual-stack
//! listeners) are evaluated as the IPv4 address they carry.

use arc_swap::ArcSwap;
use axum::http::HeaderMap;
use ipnetwork::{IpNetwork, IpNetworkError};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::tenancy::Tenant;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Parse an ordered list of CIDR strings. Bare addresses become host routes.
pub fn parse_cidrs(entries: &[String]) -> Result<Vec<IpNetwork>, IpNetworkError> {
    entries.iter().map(|e| e.trim().parse::<IpNetwork>()).collect()
}

/// Evaluate a client address against the global blocklist and the tenant's
/// allowlist.
pub fn evaluate(client: IpAddr, global_blocklist: &[IpNetwork], tenant: Option<&Tenant>) -> bool {
    let client = client.to_canonical();
    if global_blocklist.iter().any(|net| net.contains(client)) {
        return false;
    }

    let Some(tenant) = tenant else {
        return true;
    };
    if tenant.allowed_ips.is_empty() {
        return true;
    }

    match parse_cidrs(&tenant.allowed_ips) {
        Ok(allowlist) => allowlist.iter().any(|net| net.contains(client)),
        Err(e) => {
            tracing::warn!(
                tenant_id = %tenant.id,
                error = %e,
                "Unparsable tenant IP allowlist, rejecting"
            );
            false
        }
    }
}

/// IP filter with a hot-swappable global blocklist.
pub struct IpFilter {
    global_blocklist: ArcSwap<Vec<IpNetwork>>,
}

impl IpFilter {
    pub fn new(global_blocklist: Vec<IpNetwork>) -> Self {
        Self {
            global_blocklist: ArcSwap::from_pointee(global_blocklist),
        }
    }

    pub fn from_config(entries: &[String]) -> Result<Self, IpNetworkError> {
        Ok(Self::new(parse_cidrs(entries)?))
    }

    /// Atomically replace the global blocklist; in-flight checks keep the old one.
    pub fn replace_blocklist(&self, entries: Vec<IpNetwork>) {
        tracing::info!(entries = entries.len(), "Global IP blocklist replaced");
        self.global_blocklist.store(Arc::new(entries));
    }

    pub fn blocklist_len(&self) -> usize {
        self.global_blocklist.load().len()
    }

    pub fn allow(&self, client: IpAddr, tenant: Option<&Tenant>) -> bool {
        evaluate(client, &self.global_blocklist.load(), tenant)
    }

    /// Decide for a request whose client address could not be determined.
    /// Nothing can match the blocklist; a tenant allowlist cannot be satisfied.
    pub fn allow_unknown(&self, tenant: Option<&Tenant>) -> bool {
        tenant.map_or(true, |t| t.allowed_ips.is_empty())
    }
}

/// Determine the client address: the first `X-Forwarded-For` entry when
/// present (proxies are trusted, hops are not validated), else the peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(parse_ip_token);

    forwarded
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_canonical())
}

/// Parse `1.2.3.4`, `1.2.3.4:80`, `::1`, `[::1]` or `[::1]:443`.
pub fn parse_ip_token(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    raw.strip_prefix('[')
        .and_then(|rest| rest.split_once(']'))
        .and_then(|(inner, _)| inner.parse::<IpAddr>().ok())
}
