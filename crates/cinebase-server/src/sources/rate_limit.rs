//! Per-source request pacing

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// Spaces requests at least `interval` apart.
///
/// A governor quota of one cell replenished every `interval`, without burst.
pub struct MinInterval {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    interval: Duration,
}

impl MinInterval {
    pub fn new(interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(quota),
            interval,
        }
    }

    /// Wait until the next request may go out.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for MinInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinInterval").field("interval", &self.interval).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_spaces_requests() {
        let limiter = MinInterval::new(Duration::from_millis(50));
        let started = Instant::now();
        for _ in 0..3 {
            limiter.wait().await;
        }
        // First cell is free, the next two each wait one interval.
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        assert_eq!(MinInterval::new(Duration::ZERO).interval(), Duration::from_millis(1));
    }
}
