//! Per-user token bucket rate limiter, synchronized with `parking_lot` like
//! the rest of this proxy's shared in-memory state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    rps: f64,
    burst: f64,
    enabled: bool,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(rps: u32, burst: u32, enabled: bool) -> Self {
        Self {
            rps: f64::from(rps),
            burst: f64::from(burst),
            enabled,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consumes one token for `key`, refilling at `rps` tokens/second up to
    /// `burst`. Returns `false` when no token is available. Always `true`
    /// when the limiter is disabled.
    pub fn check(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rps).min(self.burst);
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
    fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(1, 1, false);
        for _ in 0..100 {
            assert!(limiter.check("alice"));
        }
    }

    #[test]
    fn burst_is_consumed_then_denied() {
        let limiter = RateLimiter::new(1, 3, true);
        assert!(limiter.check("alice"));
        assert!(limiter.check("alice"));
        assert!(limiter.check("alice"));
        assert!(!limiter.check("alice"));
    }

    #[test]
    fn buckets_are_independent_per_key() {
        let limiter = RateLimiter::new(1, 1, true);
        assert!(limiter.check("alice"));
        assert!(limiter.check("bob"));
    }

    #[test]
    fn refill_over_time_grants_a_token() {
        let limiter = RateLimiter::new(1000, 1, true);
        assert!(limiter.check("alice"));
        assert!(!limiter.check("alice"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.check("alice"));
    }
}
