//! Webhook Error Types
//!
//! Every error carries a retryability classification: the retry executor in
//! [`crate::retry`] only re-attempts operations whose error reports
//! `is_retryable()`. Permanent failures (disabled target, bad signature,
//! exhausted rate limit) propagate to the caller immediately.

use std::time::Duration;

/// Error types for webhook dispatch and handling
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Too many calls recorded for a rate-limit key within its window
    #[error("Rate limit exceeded for '{key}', retry after {retry_after:?}")]
    RateLimitExceeded {
        key: String,
        retry_after: Duration,
    },

    /// Transient delivery failure (connection error, 5xx response)
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// A single delivery attempt exceeded its timeout budget
    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Target webhook is disabled; retrying cannot change the outcome
    #[error("Webhook target '{0}' is disabled")]
    TargetDisabled(String),

    /// Inbound signature header missing or too short
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Delivery log persistence failure
    #[error("Log store error: {0}")]
    Storage(String),
}

impl WebhookError {
    /// Whether the retry executor should attempt the operation again.
    ///
    /// Transient failures (network, timeout, log store) are retryable;
    /// everything else fails the operation on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeliveryFailed(_) | Self::Timeout(_) | Self::Storage(_)
        )
    }
}
