//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): admissions by outcome (admitted, rejected)
//! - `gate_rejections_total` (counter): rejections by stage
//! - `gate_tenant_cache_total` (counter): resolver cache hit, miss, expired
//! - `gate_rate_limited_total` (counter): rate limit rejections by rule
//! - `gate_rate_buckets` (gauge): live rate buckets after each sweep
//! - `gate_admission_duration_seconds` (histogram): time spent in the pipeline

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
/// Must be called from within the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_tenant_cache(result: &'static str) {
    ::metrics::counter!("gate_tenant_cache_total", "result" => result).increment(1);
}

pub fn record_rate_buckets(count: usize) {
    ::metrics::gauge!("gate_rate_buckets").set(count as f64);
}

pub fn record_rate_limited(rule: &str) {
    ::metrics::counter!("gate_rate_limited_total", "rule" => rule.to_string()).increment(1);
}

pub fn record_rejection(stage: &'static str) {
    ::metrics::counter!("gate_rejections_total", "stage" => stage).increment(1);
}

/// Record one finished admission.
pub fn record_admission(admitted: bool, start: Instant) {
    let outcome = if admitted { "admitted" } else { "rejected" };
    ::metrics::counter!("gate_requests_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("gate_admission_duration_seconds").record(start.elapsed().as_secs_f64());
}
