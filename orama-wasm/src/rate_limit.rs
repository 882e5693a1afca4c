//! Per-function invocation rate limiting, checked before compilation so a
//! throttled caller never pays the compile/instantiate cost (§4.3.2).

use dashmap::DashMap;
use std::time::{Duration, Instant};

pub trait RateLimiter: Send + Sync {
    /// `true` if an invocation of `key` may proceed right now.
    fn allow(&self, key: &str) -> bool;
}

/// Permissive limiter used when no quota is configured.
#[derive(Default)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn allow(&self, _key: &str) -> bool {
        true
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Simple per-key token bucket: `capacity` tokens, refilled continuously at
/// `refill_per_sec`.
pub struct TokenBucketRateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: DashMap<String, Bucket>,
}

impl TokenBucketRateLimiter {
    pub fn new(capacity: u32, refill_per_sec: u32) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: refill_per_sec as f64,
            buckets: DashMap::new(),
        }
    }
}

impl RateLimiter for TokenBucketRateLimiter {
    fn allow(&self, key: &str) -> bool {
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: Instant::now(),
        });
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refills() {
        let limiter = TokenBucketRateLimiter::new(2, 1000);
        assert!(limiter.allow("f"));
        assert!(limiter.allow("f"));
        assert!(!limiter.allow("f"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.allow("f"));
    }

    #[test]
    fn independent_keys_have_independent_budgets() {
        let limiter = TokenBucketRateLimiter::new(1, 1);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
    }
}
