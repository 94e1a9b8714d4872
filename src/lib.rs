//! Webhook Relay Library
//!
//! Webhook delivery engine extracted from a CRM backend. It provides
//! sliding-window rate limiting, a single retry executor driven by
//! [`RetryPolicy`] values, an outbound dispatcher over a pluggable
//! transport, an inbound handler with signature verification, and
//! linear-backoff redelivery scheduling for exhausted dispatches.

pub mod config;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod retry;
pub mod webhooks;

pub use config::Config;
pub use error::WebhookError;
pub use rate_limit::{RateLimit, RateLimiter};
pub use retry::{Backoff, RetryPolicy};
pub use webhooks::{
    InboundHandler, InboundPayload, MemoryLogStore, OutboundDispatcher, OutboundTask,
    RedeliveryScheduler, TargetConfig, WebhookLogEntry, WebhookLogStore,
};
