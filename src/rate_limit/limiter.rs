//! Sliding-Window Rate Limiter
//!
//! Tracks call timestamps per operation key and rejects a call once more
//! than the allowed number have been recorded within the trailing window.
//! The window slides: only calls newer than `now - window` count. The check
//! is synchronous and non-blocking; the limiter never delays a caller.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::WebhookError;

/// Limit for one operation key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum calls allowed inside the window
    pub max_calls: u32,

    /// Length of the trailing window
    pub window: Duration,
}

impl RateLimit {
    /// Create a new limit
    pub const fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }

    /// Outbound dispatch default: 60 calls per 60 seconds
    pub const fn outbound() -> Self {
        Self::new(60, Duration::from_secs(60))
    }

    /// Inbound handling default: 120 calls per 60 seconds
    pub const fn inbound() -> Self {
        Self::new(120, Duration::from_secs(60))
    }
}

/// Sliding-window rate limiter keyed by operation name
#[derive(Debug, Default)]
pub struct RateLimiter {
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a new limiter with no recorded calls
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call for `key` and check it against `limit`.
    ///
    /// The call is recorded even when it is rejected, so a caller hammering
    /// a saturated key keeps extending its own penalty. Returns
    /// [`WebhookError::RateLimitExceeded`] with the time until the oldest
    /// recorded call leaves the window.
    pub fn check(&self, key: &str, limit: RateLimit) -> Result<(), WebhookError> {
        self.check_at(key, limit, Instant::now())
    }

    fn check_at(&self, key: &str, limit: RateLimit, now: Instant) -> Result<(), WebhookError> {
        let mut calls = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entries = calls.entry(key.to_string()).or_default();

        // Forget calls that have slid out of the window
        while let Some(&front) = entries.front() {
            if now.duration_since(front) > limit.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        entries.push_back(now);

        if entries.len() as u32 > limit.max_calls {
            let retry_after = entries
                .front()
                .map(|&oldest| limit.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(Duration::ZERO);

            warn!(
                "Rate limit exceeded for '{}': {} calls in {:?} (max {})",
                key,
                entries.len(),
                limit.window,
                limit.max_calls
            );

            return Err(WebhookError::RateLimitExceeded {
                key: key.to_string(),
                retry_after,
            });
        }

        Ok(())
    }

    /// Number of calls currently recorded for a key
    pub fn recorded_calls(&self, key: &str) -> usize {
        let calls = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        calls.get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// Drop every recorded call for every key
    pub fn reset(&self) {
        let mut calls = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_limit(max_calls: u32) -> RateLimit {
        RateLimit::new(max_calls, Duration::from_secs(60))
    }

    #[test]
    fn test_allows_up_to_max_calls() {
        let limiter = RateLimiter::new();
        let limit = tiny_limit(3);

        for _ in 0..3 {
            assert!(limiter.check("webhooks:outbound", limit).is_ok());
        }
    }

    #[test]
    fn test_rejects_call_exceeding_threshold() {
        let limiter = RateLimiter::new();
        let limit = tiny_limit(3);

        for _ in 0..3 {
            limiter.check("webhooks:outbound", limit).unwrap();
        }

        let result = limiter.check("webhooks:outbound", limit);
        assert!(matches!(
            result,
            Err(WebhookError::RateLimitExceeded { key, .. }) if key == "webhooks:outbound"
        ));
    }

    #[test]
    fn test_rejected_call_is_still_recorded() {
        let limiter = RateLimiter::new();
        let limit = tiny_limit(2);

        limiter.check("k", limit).unwrap();
        limiter.check("k", limit).unwrap();
        assert!(limiter.check("k", limit).is_err());

        assert_eq!(limiter.recorded_calls("k"), 3);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let limit = tiny_limit(1);

        limiter.check("webhooks:outbound", limit).unwrap();
        assert!(limiter.check("webhooks:outbound", limit).is_err());

        // A different key has its own counters
        assert!(limiter.check("webhooks:inbound", limit).is_ok());
    }

    #[test]
    fn test_calls_outside_window_are_forgotten() {
        let limiter = RateLimiter::new();
        let limit = RateLimit::new(2, Duration::from_millis(100));
        let t0 = Instant::now();

        limiter.check_at("k", limit, t0).unwrap();
        limiter.check_at("k", limit, t0).unwrap();
        assert!(limiter.check_at("k", limit, t0).is_err());

        // Past the window, the old calls no longer count
        let later = t0 + Duration::from_millis(200);
        assert!(limiter.check_at("k", limit, later).is_ok());
        assert!(limiter.check_at("k", limit, later).is_ok());
    }

    #[test]
    fn test_window_slides_rather_than_resets() {
        let limiter = RateLimiter::new();
        let limit = RateLimit::new(2, Duration::from_millis(100));
        let t0 = Instant::now();

        limiter.check_at("k", limit, t0).unwrap();
        limiter
            .check_at("k", limit, t0 + Duration::from_millis(90))
            .unwrap();

        // t0 call has left the window; the 90ms call still counts
        assert!(limiter
            .check_at("k", limit, t0 + Duration::from_millis(150))
            .is_ok());
        // Three calls now inside the trailing 100ms
        assert!(limiter
            .check_at("k", limit, t0 + Duration::from_millis(160))
            .is_err());
    }

    #[test]
    fn test_retry_after_reflects_oldest_call() {
        let limiter = RateLimiter::new();
        let limit = RateLimit::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check_at("k", limit, t0).unwrap();
        let result = limiter.check_at("k", limit, t0 + Duration::from_secs(10));

        match result {
            Err(WebhookError::RateLimitExceeded { retry_after, .. }) => {
                assert!(retry_after <= Duration::from_secs(50));
                assert!(retry_after > Duration::from_secs(40));
            }
            other => panic!("expected RateLimitExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_clears_all_keys() {
        let limiter = RateLimiter::new();
        let limit = tiny_limit(5);

        limiter.check("a", limit).unwrap();
        limiter.check("b", limit).unwrap();
        limiter.reset();

        assert_eq!(limiter.recorded_calls("a"), 0);
        assert_eq!(limiter.recorded_calls("b"), 0);
    }

    #[test]
    fn test_default_limits() {
        assert_eq!(RateLimit::outbound().max_calls, 60);
        assert_eq!(RateLimit::outbound().window, Duration::from_secs(60));
        assert_eq!(RateLimit::inbound().max_calls, 120);
        assert_eq!(RateLimit::inbound().window, Duration::from_secs(60));
    }
}
