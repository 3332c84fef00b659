//! Per-IP token-bucket rate limiting for broker requests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

#[derive(Debug)]
struct Bucket {
    level: f64,
    refilled_at: Instant,
}

/// Token-bucket limiter keyed by client IP. Cloneable handle shared across
/// connection tasks.
#[derive(Clone)]
pub struct RequestLimiter {
    buckets: Arc<Mutex<HashMap<IpAddr, Bucket>>>,
    refill_per_sec: f64,
    burst: f64,
}

impl RequestLimiter {
    pub fn new(refill_per_sec: f64, burst: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            refill_per_sec,
            burst,
        }
    }

    /// True when a request from `ip` may proceed.
    pub async fn allow(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(ip).or_insert_with(|| Bucket {
            level: self.burst,
            refilled_at: Instant::now(),
        });

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.refilled_at = now;
        bucket.level = (bucket.level + elapsed * self.refill_per_sec).min(self.burst);

        if bucket.level >= 1.0 {
            bucket.level -= 1.0;
            true
        } else {
            false
        }
    }

    /// Evict buckets idle longer than `max_idle_secs`.
    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| {
            now.duration_since(bucket.refilled_at).as_secs_f64() < max_idle_secs
        });
    }
}

impl Default for RequestLimiter {
    fn default() -> Self {
        // 20 req/s sustained, burst of 40
        Self::new(20.0, 40.0)
    }
}
