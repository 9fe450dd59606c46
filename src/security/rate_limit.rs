//! Fixed-window token buckets keyed by client.
//!
//! A bucket holds `capacity` tokens for one interval and is fully reset (not
//! gradually refilled) once the interval elapses. Buckets are created on the
//! first request from a key and removed by a periodic sweep once idle.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::{RateLimitConfig, RateLimitRule};
use crate::observability::metrics;
use crate::security::path_has_prefix;

/// Result of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    next_refill_at: Instant,
    refilled_at: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant, interval: Duration) -> Self {
        Self {
            tokens: capacity,
            next_refill_at: now + interval,
            refilled_at: now,
        }
    }
}

/// One limiter: a capacity, a window, and a bucket per client key.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    capacity: u32,
    interval: Duration,
    buckets: DashMap<String, Arc<Mutex<Bucket>>>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, capacity: u32, interval: Duration) -> Self {
        Self {
            name: name.into(),
            capacity,
            interval,
            buckets: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Take one token for `key` if any are left in the current window.
    pub fn allow(&self, key: &str) -> RateDecision {
        let now = Instant::now();

        // The map lock is held only to find or create the bucket; token
        // accounting happens under the bucket's own mutex.
        let existing = self.buckets.get(key).map(|b| Arc::clone(b.value()));
        let bucket = match existing {
            Some(bucket) => bucket,
            None => Arc::clone(
                self.buckets
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(Bucket::full(self.capacity, now, self.interval))))
                    .value(),
            ),
        };

        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        if now >= bucket.next_refill_at {
            bucket.tokens = self.capacity;
            bucket.next_refill_at = now + self.interval;
            bucket.refilled_at = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            RateDecision { allowed: true, remaining: bucket.tokens }
        } else {
            RateDecision { allowed: false, remaining: 0 }
        }
    }

    /// Drop buckets whose last refill is older than `idle_ttl`.
    /// Returns the number of buckets removed.
    pub fn sweep(&self, idle_ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            now.saturating_duration_since(bucket.refilled_at) <= idle_ttl
        });
        before.saturating_sub(self.buckets.len())
    }
}

/// The limiters for all designated sensitive paths.
#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    rules: Vec<(String, Arc<RateLimiter>)>,
}

impl RateLimitRegistry {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::default();
        }
        let rules = config
            .rules
            .iter()
            .map(|rule: &RateLimitRule| {
                let limiter = RateLimiter::new(
                    rule.name.clone(),
                    rule.capacity,
                    Duration::from_secs(rule.interval_secs),
                );
                (rule.path_prefix.clone(), Arc::new(limiter))
            })
            .collect();
        Self { rules }
    }

    /// The limiter guarding `path`, longest prefix wins.
    pub fn for_path(&self, path: &str) -> Option<&Arc<RateLimiter>> {
        self.rules
            .iter()
            .filter(|(prefix, _)| path_has_prefix(path, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, limiter)| limiter)
    }

    pub fn bucket_count(&self) -> usize {
        self.rules.iter().map(|(_, l)| l.bucket_count()).sum()
    }

    pub fn sweep(&self, idle_ttl: Duration) -> usize {
        self.rules.iter().map(|(_, l)| l.sweep(idle_ttl)).sum()
    }
}

/// Periodically evict idle buckets until shutdown.
pub async fn run_sweeper(
    registry: Arc<RateLimitRegistry>,
    every: Duration,
    idle_ttl: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(
        interval_secs = every.as_secs(),
        idle_ttl_secs = idle_ttl.as_secs(),
        "Rate bucket sweeper starting"
    );

    let mut ticker = time::interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = registry.sweep(idle_ttl);
                let remaining = registry.bucket_count();
                metrics::record_rate_buckets(remaining);
                if removed > 0 {
                    tracing::debug!(removed, remaining, "Swept idle rate buckets");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Rate bucket sweeper received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_capacity_then_reject_within_window() {
        let limiter = RateLimiter::new("login", 2, Duration::from_secs(60));

        assert_eq!(limiter.allow("1.2.3.4"), RateDecision { allowed: true, remaining: 1 });
        assert_eq!(limiter.allow("1.2.3.4"), RateDecision { allowed: true, remaining: 0 });
        assert_eq!(limiter.allow("1.2.3.4"), RateDecision { allowed: false, remaining: 0 });

        // Other keys have their own bucket.
        assert!(limiter.allow("5.6.7.8").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_reset_at_window_boundary() {
        let limiter = RateLimiter::new("login", 2, Duration::from_secs(60));
        limiter.allow("k");
        limiter.allow("k");
        assert!(!limiter.allow("k").allowed);

        time::advance(Duration::from_secs(59)).await;
        assert!(!limiter.allow("k").allowed);

        time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.allow("k"), RateDecision { allowed: true, remaining: 1 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_callers_share_one_bucket() {
        let limiter = Arc::new(RateLimiter::new("login", 50, Duration::from_secs(3600)));

        let tasks: Vec<_> = (0..400)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.allow("k") })
            })
            .collect();

        let mut remaining = Vec::new();
        for task in tasks {
            let decision = task.await.unwrap();
            if decision.allowed {
                remaining.push(decision.remaining);
            }
        }

        // Every token is handed out exactly once.
        remaining.sort_unstable();
        assert_eq!(remaining, (0..50).collect::<Vec<u32>>());
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_idle_buckets() {
        let limiter = RateLimiter::new("login", 5, Duration::from_secs(60));
        limiter.allow("old");

        time::advance(Duration::from_secs(11 * 60)).await;
        limiter.allow("fresh");

        assert_eq!(limiter.sweep(Duration::from_secs(10 * 60)), 1);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_registry_longest_prefix() {
        let config = RateLimitConfig {
            enabled: true,
            rules: vec![
                RateLimitRule {
                    name: "auth".into(),
                    path_prefix: "/auth".into(),
                    capacity: 10,
                    interval_secs: 60,
                },
                RateLimitRule {
                    name: "login".into(),
                    path_prefix: "/auth/login".into(),
                    capacity: 5,
                    interval_secs: 60,
                },
            ],
            ..RateLimitConfig::default()
        };
        let registry = RateLimitRegistry::from_config(&config);

        assert_eq!(registry.for_path("/auth/login").unwrap().name(), "login");
        assert_eq!(registry.for_path("/auth/logout").unwrap().name(), "auth");
        assert!(registry.for_path("/api/session").is_none());
        assert_eq!(registry.for_path("/auth/login/sso").unwrap().name(), "login");
        assert_eq!(registry.for_path("/auth/loginx").unwrap().name(), "auth");
        assert!(registry.for_path("/authx").is_none());
    }

    #[test]
    fn test_disabled_registry_is_empty() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        assert!(RateLimitRegistry::from_config(&config).for_path("/auth/login").is_none());
    }
}
