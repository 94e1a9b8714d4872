//! Retry Policies and Executor
//!
//! This module provides the single retry executor used by every delivery
//! path. Behavior is described by a [`RetryPolicy`] value: attempt ceiling,
//! backoff strategy, jitter, and an optional per-attempt timeout. The
//! executor only re-attempts operations whose error is transient (see
//! [`WebhookError::is_retryable`]); permanent failures and the final error
//! after exhaustion propagate to the caller unchanged.
//!
//! # Example
//!
//! ```ignore
//! use webhook_relay::retry::{retry, Backoff, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(450)));
//!
//! let result = retry(&policy, |_attempt| async {
//!     // Operation that might fail transiently
//!     Ok(42)
//! }).await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::WebhookError;

/// Delay strategy between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// Delay grows by `step` per attempt: min(step * (attempt + 1), cap)
    Linear { step: Duration, cap: Duration },
    /// Delay doubles per attempt: min(base * 2^attempt, cap)
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay before the retry that follows `attempt` (zero-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { step, cap } => {
                step.saturating_mul(attempt.saturating_add(1)).min(cap)
            }
            Backoff::Exponential { base, cap } => {
                base.saturating_mul(2_u32.saturating_pow(attempt)).min(cap)
            }
        }
    }
}

/// Retry behavior for a delivery path
///
/// # Fields
///
/// * `max_attempts` - Attempt ceiling, including the initial attempt
/// * `backoff` - Delay strategy between attempts
/// * `jitter` - Random delay variation factor (0.0 = deterministic)
/// * `attempt_timeout` - Budget for each individual attempt
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    pub max_attempts: u32,

    /// Delay strategy between attempts
    pub backoff: Backoff,

    /// Jitter factor (0.0 to 1.0) - adds random variation to delays
    /// to prevent thundering herd when many deliveries retry together
    pub jitter: f64,

    /// Timeout applied to each individual attempt; a hung attempt fails
    /// with [`WebhookError::Timeout`] instead of blocking forever
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_millis(500)),
            jitter: 0.0,
            attempt_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt ceiling and backoff
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            ..Self::default()
        }
    }

    /// Set the jitter factor, clamped to [0.0, 1.0]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the per-attempt timeout
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Disable the per-attempt timeout
    pub fn no_attempt_timeout(mut self) -> Self {
        self.attempt_timeout = None;
        self
    }

    /// Delay before the retry that follows `attempt`, with jitter applied
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff.delay_for(attempt);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        // Random variation +/- jitter/2 around the nominal delay
        let jitter_range = delay.mul_f64(self.jitter);
        let jitter_offset = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range.as_secs_f64();
        if jitter_offset >= 0.0 {
            delay.saturating_add(Duration::from_secs_f64(jitter_offset))
        } else {
            delay.saturating_sub(Duration::from_secs_f64(-jitter_offset))
        }
    }
}

/// Run an operation under a retry policy
///
/// The operation receives the zero-indexed attempt number. It is invoked up
/// to `policy.max_attempts` times; the policy's backoff delay is slept
/// between consecutive attempts. An attempt that exceeds the policy's
/// timeout fails with [`WebhookError::Timeout`], which is itself retryable.
///
/// Non-retryable errors return immediately; the final error after
/// exhaustion propagates unchanged.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, WebhookError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, WebhookError>>,
{
    let mut attempt = 0;

    loop {
        let result = run_attempt(policy.attempt_timeout, operation(attempt)).await;

        match result {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        "Operation succeeded on attempt {} after {} retries",
                        attempt + 1,
                        attempt
                    );
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!("Operation failed after {} attempts: {}", attempt + 1, e);
                return Err(e);
            }
        }
    }
}

/// Run an operation whose backoff delay precedes every attempt
///
/// Unlike [`retry`], which fires the first attempt immediately and sleeps
/// between attempts, this sleeps `policy.delay_for(offset + attempt)` before
/// each attempt, including the first. `offset` shifts the schedule forward
/// for work resuming an attempt counter from earlier rounds, so the delays
/// keep growing instead of restarting from the first step.
pub async fn retry_deferred<T, F, Fut>(
    policy: &RetryPolicy,
    offset: u32,
    mut operation: F,
) -> Result<T, WebhookError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, WebhookError>>,
{
    let mut attempt = 0;

    loop {
        let delay = policy.delay_for(offset.saturating_add(attempt));
        debug!("Waiting {:?} before attempt {}", delay, attempt + 1);
        sleep(delay).await;

        let result = run_attempt(policy.attempt_timeout, operation(attempt)).await;

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                warn!("Attempt {} failed: {}", attempt + 1, e);
                attempt += 1;
            }
            Err(e) => {
                debug!("Operation failed after {} attempts: {}", attempt + 1, e);
                return Err(e);
            }
        }
    }
}

async fn run_attempt<T, Fut>(limit: Option<Duration>, fut: Fut) -> Result<T, WebhookError>
where
    Fut: Future<Output = Result<T, WebhookError>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(WebhookError::Timeout(limit)),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn transient() -> WebhookError {
        WebhookError::DeliveryFailed("simulated".to_string())
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed(Duration::from_millis(450));
        assert_eq!(backoff.delay_for(0), Duration::from_millis(450));
        assert_eq!(backoff.delay_for(5), Duration::from_millis(450));
    }

    #[test]
    fn test_linear_backoff_grows_then_caps() {
        let backoff = Backoff::Linear {
            step: Duration::from_millis(5000),
            cap: Duration::from_millis(30000),
        };
        assert_eq!(backoff.delay_for(0), Duration::from_millis(5000));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(10000));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(25000));
        assert_eq!(backoff.delay_for(5), Duration::from_millis(30000));
        assert_eq!(backoff.delay_for(100), Duration::from_millis(30000));
    }

    #[test]
    fn test_exponential_backoff_doubles_then_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
        };
        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_clamping() {
        let policy = RetryPolicy::default().jitter(1.5);
        assert_eq!(policy.jitter, 1.0);

        let policy = RetryPolicy::default().jitter(-0.5);
        assert_eq!(policy.jitter, 0.0);
    }

    #[test]
    fn test_delay_with_jitter_varies() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(100))).jitter(0.5);

        let delays: Vec<_> = (0..20).map(|_| policy.delay_for(0)).collect();
        let min = *delays.iter().min().unwrap();
        let max = *delays.iter().max().unwrap();

        // With 50% jitter over 20 samples we expect visible spread
        assert!(max - min >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_retry_success_invokes_once() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(10)));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result = retry(&policy, move |_| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, WebhookError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_invokes_exactly_max_attempts() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(10)));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), _> = retry(&policy, move |_| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(matches!(result, Err(WebhookError::DeliveryFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let policy = RetryPolicy::new(4, Backoff::Fixed(Duration::from_millis(10)));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result = retry(&policy, move |_| {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("delivered")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "delivered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(10)));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), _> = retry(&policy, move |_| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WebhookError::TargetDisabled("hook-1".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(WebhookError::TargetDisabled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fixed_delay_elapses_between_attempts() {
        let delay = Duration::from_millis(30);
        let policy = RetryPolicy::new(3, Backoff::Fixed(delay));

        let start = Instant::now();
        let result: Result<(), _> = retry(&policy, |_| async { Err(transient()) }).await;
        let elapsed = start.elapsed();

        assert!(result.is_err());
        // Two inter-attempt waits for three attempts
        assert!(elapsed >= delay * 2, "elapsed {:?}", elapsed);
        assert!(elapsed < delay * 6, "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_attempt_timeout_produces_timeout_error() {
        let policy = RetryPolicy::new(2, Backoff::Fixed(Duration::from_millis(10)))
            .attempt_timeout(Duration::from_millis(20));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), _> = retry(&policy, move |_| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;

        // Timeout is transient, so both attempts run and time out
        assert!(matches!(result, Err(WebhookError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deferred_sleeps_before_the_first_attempt() {
        let policy = RetryPolicy::new(
            3,
            Backoff::Linear {
                step: Duration::from_millis(30),
                cap: Duration::from_secs(30),
            },
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let start = Instant::now();
        let result = retry_deferred(&policy, 3, move |_| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, WebhookError>("delivered")
            }
        })
        .await;
        let elapsed = start.elapsed();

        assert_eq!(result.unwrap(), "delivered");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Offset 3 means the first wait is already step * 4
        assert!(elapsed >= Duration::from_millis(120), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_deferred_exhaustion_invokes_exactly_max_attempts() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(10)));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let start = Instant::now();
        let result: Result<(), _> = retry_deferred(&policy, 0, move |_| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(WebhookError::DeliveryFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // One wait per attempt, the first one included
        assert!(elapsed >= Duration::from_millis(30), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_operation_receives_attempt_number() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(10)));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let _: Result<(), _> = retry(&policy, move |attempt| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.lock().unwrap().push(attempt);
                Err(transient())
            }
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    proptest! {
        #[test]
        fn prop_linear_backoff_never_exceeds_cap(
            step_ms in 1u64..10_000,
            cap_ms in 1u64..60_000,
            attempt in 0u32..128,
        ) {
            let backoff = Backoff::Linear {
                step: Duration::from_millis(step_ms),
                cap: Duration::from_millis(cap_ms),
            };
            prop_assert!(backoff.delay_for(attempt) <= Duration::from_millis(cap_ms));
        }

        #[test]
        fn prop_exponential_backoff_never_exceeds_cap(
            base_ms in 1u64..10_000,
            cap_ms in 1u64..60_000,
            attempt in 0u32..128,
        ) {
            let backoff = Backoff::Exponential {
                base: Duration::from_millis(base_ms),
                cap: Duration::from_millis(cap_ms),
            };
            prop_assert!(backoff.delay_for(attempt) <= Duration::from_millis(cap_ms));
        }

        #[test]
        fn prop_backoff_delays_are_monotone(
            step_ms in 1u64..10_000,
            attempt in 0u32..64,
        ) {
            let backoff = Backoff::Linear {
                step: Duration::from_millis(step_ms),
                cap: Duration::from_secs(3600),
            };
            prop_assert!(backoff.delay_for(attempt) <= backoff.delay_for(attempt + 1));
        }
    }
}
