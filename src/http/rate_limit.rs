//! Per-client request limiter for checkout and payment endpoints.
//!
//! A keyed GCRA limiter: each client may spend `limit` requests per minute,
//! refilled evenly across the minute, with bursts up to `limit`.

use std::num::NonZeroU32;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as KeyedLimiter};

/// Idle keys are dropped once this many clients are tracked.
const RETAIN_AT: usize = 10_000;

type Limiter = KeyedLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

pub struct RateLimiter {
    limiter: Limiter,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        let limit = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
        Self { limiter: KeyedLimiter::keyed(Quota::per_minute(limit)), clock: DefaultClock::default() }
    }

    /// Counts one request for `key`. `Err` carries the whole seconds to wait
    /// before the next request would be admitted.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        if self.limiter.len() >= RETAIN_AT {
            self.limiter.retain_recent();
        }
        self.limiter.check_key(&key.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            secs.max(1)
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("tracked_clients", &self.limiter.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_blocks_per_client() {
        let rl = RateLimiter::per_minute(2);
        assert!(rl.check("1.2.3.4").is_ok());
        assert!(rl.check("1.2.3.4").is_ok());
        let retry = rl.check("1.2.3.4").unwrap_err();
        // Two per minute refills one slot every thirty seconds.
        assert!((1..=30).contains(&retry), "retry after {retry}s");
        // Other clients are unaffected.
        assert!(rl.check("5.6.7.8").is_ok());
    }

    #[test]
    fn test_zero_limit_still_admits_one() {
        let rl = RateLimiter::per_minute(0);
        assert!(rl.check("k").is_ok());
        let retry = rl.check("k").unwrap_err();
        assert!(retry >= 1 && retry <= 60);
    }
}
