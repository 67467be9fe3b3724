// Path: crates/rpc/src/limiter.rs
//! Token-bucket rate limiting.
//!
//! Three tiers: a global bucket per method (with a `"fallback"` default
//! rate), a per-IP per-method bucket created lazily with burst equal to
//! the rate, and a pressure release that prunes idle clients once the
//! tracked set exceeds `max_clients`. The global bucket is consulted
//! first; a global refusal never depletes the per-IP bucket. Pruning is
//! O(n) and mutually exclusive with `allow`: while a prune holds the
//! lock, `allow` refuses rather than waiting.

use lightnode_types::config::LimiterConfig;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl Bucket {
    fn new(burst: f64, now: Instant) -> Self {
        Self { tokens: burst, last: now }
    }

    fn allow(&mut self, rate: f64, burst: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Client {
    buckets: HashMap<String, Bucket>,
    last_seen: Instant,
}

struct Inner {
    global: HashMap<String, Bucket>,
    clients: HashMap<IpAddr, Client>,
}

/// The three-tier rate limiter.
pub struct RateLimiter {
    inner: Mutex<Inner>,
    conf: LimiterConfig,
}

impl RateLimiter {
    /// Creates a limiter with the given configuration.
    pub fn new(conf: LimiterConfig) -> Self {
        Self {
            inner: Mutex::new(Inner { global: HashMap::new(), clients: HashMap::new() }),
            conf,
        }
    }

    fn global_rate(&self, method: &str) -> f64 {
        self.conf.method_rates.get(method).copied().unwrap_or(self.conf.global_rate)
    }

    /// Decides whether a request from `ip` for `method` may proceed.
    ///
    /// Returns `false` while a pruning pass holds the lock.
    pub fn allow(&self, method: &str, ip: IpAddr) -> bool {
        let Ok(mut inner) = self.inner.try_lock() else {
            return false;
        };
        let now = Instant::now();

        let global_rate = self.global_rate(method);
        let global = inner
            .global
            .entry(method.to_string())
            .or_insert_with(|| Bucket::new(global_rate, now));
        if !global.allow(global_rate, global_rate, now) {
            // Global refusal must not deplete the per-IP bucket.
            return false;
        }

        let client = inner.clients.entry(ip).or_insert_with(|| Client {
            buckets: HashMap::new(),
            last_seen: now,
        });
        client.last_seen = now;
        let ip_rate = self.conf.ip_rate;
        let bucket = client
            .buckets
            .entry(method.to_string())
            .or_insert_with(|| Bucket::new(ip_rate, now));
        let allowed = bucket.allow(ip_rate, ip_rate, now);

        if inner.clients.len() > self.conf.max_clients {
            let ttl = std::time::Duration::from_secs(self.conf.ttl_secs);
            let before = inner.clients.len();
            inner.clients.retain(|_, c| now.duration_since(c.last_seen) < ttl);
            tracing::debug!(
                target: "limiter",
                pruned = before - inner.clients.len(),
                remaining = inner.clients.len(),
                "pruned idle clients"
            );
        }

        allowed
    }

    /// The number of tracked client IPs.
    pub fn tracked_clients(&self) -> usize {
        self.inner.lock().map(|inner| inner.clients.len()).unwrap_or(0)
    }
}
