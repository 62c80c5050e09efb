//! In-process sliding-window rate limiter.
//!
//! Stands in for the external cache/rate-limit tier: `dashmap`-backed
//! fixed-window counters keyed `rl:{tenant}:{key}:{endpoint}`, a `DashMap`
//! indexed by a composite key with no lock held across an entry's whole
//! lifetime. [`crate::storage::QuotaStorage`] is the durable backstop this
//! cache shadows: a restart loses in-process counters but quota windows
//! already persisted survive.

use crate::domain_types::RateLimitPerWindow;
use crate::error::CoreError;
use dashmap::DashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Sliding-window width. Fixed per the shared-services contract; not
/// configurable because the wire key format (`rl:{tenant}:{key}:{endpoint}`)
/// assumes one window size across the process.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start_secs: u64,
    count: u32,
}

/// A `dashmap`-backed fixed-window rate limiter.
///
/// Each `(tenant_id, key, endpoint)` triple gets its own counter that resets
/// whenever the wall clock crosses into a new 60-second window. This is
/// intentionally a fixed window, not a true sliding log: it matches the
/// `TTL = window` counter the external cache tier's key scheme implies,
/// trading precision at window boundaries for O(1) space per key.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    /// Creates an empty rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Checks and increments the counter for `(tenant_id, key, endpoint)`
    /// against `limit`, using `now` as the wall clock. Returns
    /// `Ok(())` if the request is admitted, or
    /// [`CoreError::RateLimited`] with milliseconds remaining in the current
    /// window if the limit is already exhausted.
    pub fn check_and_increment(
        &self,
        tenant_id: &str,
        key: &str,
        endpoint: &str,
        limit: RateLimitPerWindow,
        now: SystemTime,
    ) -> Result<(), CoreError> {
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let window_start_secs = now_secs - (now_secs % WINDOW.as_secs());
        let cache_key = format!("rl:{tenant_id}:{key}:{endpoint}");

        let mut entry = self.buckets.entry(cache_key).or_insert(Bucket {
            window_start_secs,
            count: 0,
        });

        if entry.window_start_secs != window_start_secs {
            entry.window_start_secs = window_start_secs;
            entry.count = 0;
        }

        if entry.count >= limit.into_inner() {
            let window_end_secs = window_start_secs + WINDOW.as_secs();
            let retry_after_ms = (window_end_secs.saturating_sub(now_secs)) * 1000;
            return Err(CoreError::RateLimited { retry_after_ms });
        }

        entry.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn admits_requests_under_the_limit() {
        let limiter = RateLimiter::new();
        let limit = RateLimitPerWindow::try_new(3).unwrap();
        for _ in 0..3 {
            assert!(limiter
                .check_and_increment("tenant-a", "agent-1", "broadcast", limit, at(100))
                .is_ok());
        }
    }

    #[test]
    fn rejects_requests_once_limit_is_exhausted() {
        let limiter = RateLimiter::new();
        let limit = RateLimitPerWindow::try_new(2).unwrap();
        assert!(limiter
            .check_and_increment("tenant-a", "agent-1", "broadcast", limit, at(100))
            .is_ok());
        assert!(limiter
            .check_and_increment("tenant-a", "agent-1", "broadcast", limit, at(100))
            .is_ok());
        let result = limiter.check_and_increment("tenant-a", "agent-1", "broadcast", limit, at(100));
        assert!(matches!(result, Err(CoreError::RateLimited { .. })));
    }

    #[test]
    fn counter_resets_in_a_new_window() {
        let limiter = RateLimiter::new();
        let limit = RateLimitPerWindow::try_new(1).unwrap();
        assert!(limiter
            .check_and_increment("tenant-a", "agent-1", "broadcast", limit, at(100))
            .is_ok());
        assert!(limiter
            .check_and_increment("tenant-a", "agent-1", "broadcast", limit, at(100))
            .is_err());
        assert!(limiter
            .check_and_increment("tenant-a", "agent-1", "broadcast", limit, at(100 + WINDOW.as_secs()))
            .is_ok());
    }

    #[test]
    fn distinct_keys_and_endpoints_have_independent_counters() {
        let limiter = RateLimiter::new();
        let limit = RateLimitPerWindow::try_new(1).unwrap();
        assert!(limiter
            .check_and_increment("tenant-a", "agent-1", "broadcast", limit, at(100))
            .is_ok());
        assert!(limiter
            .check_and_increment("tenant-a", "agent-2", "broadcast", limit, at(100))
            .is_ok());
        assert!(limiter
            .check_and_increment("tenant-a", "agent-1", "collect", limit, at(100))
            .is_ok());
        assert!(limiter
            .check_and_increment("tenant-b", "agent-1", "broadcast", limit, at(100))
            .is_ok());
    }
}
