//! Rate Limiting Module
//!
//! Sliding-window call accounting for outbound dispatch and inbound
//! handling. The limiter counts recent calls per operation key within a
//! trailing window; calls older than the window are forgotten.
//!
//! The limiter is an explicit instance handed to the dispatcher and the
//! inbound handler rather than a process-global table, so tests and tenants
//! get isolated counters.

pub mod limiter;

pub use limiter::{RateLimit, RateLimiter};
