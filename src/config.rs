// Configuration File Support
//
// This module provides configuration file parsing for the webhook relay.
// Supports TOML format with environment variable overrides. The file path
// comes from `WEBHOOK_RELAY_CONFIG` or an explicit call site.
//
//   [outbound]
//   rate_limit_max_calls = 60
//   retry_delay_ms = 450
//
//   [[targets]]
//   id = "crm-main"
//   url = "https://example.com/hooks"
//   events = ["lead.created", "deal.stage_changed"]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::rate_limit::RateLimit;
use crate::retry::{Backoff, RetryPolicy};
use crate::webhooks::outbound::TargetConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Outbound dispatch configuration
    pub outbound: OutboundConfig,

    /// Inbound handling configuration
    pub inbound: InboundConfig,

    /// Redelivery scheduling configuration
    pub redelivery: RedeliveryConfig,

    /// Configured webhook targets
    pub targets: Vec<TargetConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Outbound dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutboundConfig {
    /// Sliding-window limit for the outbound key
    pub rate_limit_max_calls: u32,

    /// Window length in seconds
    pub rate_limit_window_secs: u64,

    /// Fixed delay between inline retry attempts, in milliseconds
    pub retry_delay_ms: u64,

    /// Jitter factor (0.0 to 1.0) applied to retry delays
    pub jitter: f64,

    /// Attempt ceiling for ordinary targets
    pub base_attempts: u32,

    /// Attempt ceiling for targets above the events threshold
    pub extended_attempts: u32,

    /// Targets subscribed to more event types than this get the extended
    /// ceiling. Carried over from the CRM backend; treated as arbitrary
    /// rather than load-bearing.
    pub extended_events_threshold: usize,

    /// Per-attempt timeout in milliseconds; absent disables the timeout
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            rate_limit_max_calls: 60,
            rate_limit_window_secs: 60,
            retry_delay_ms: 450,
            jitter: 0.0,
            base_attempts: 3,
            extended_attempts: 4,
            extended_events_threshold: 3,
            attempt_timeout_ms: Some(10_000),
        }
    }
}

impl OutboundConfig {
    /// Rate limit for the outbound dispatch key
    pub fn rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.rate_limit_max_calls,
            Duration::from_secs(self.rate_limit_window_secs),
        )
    }

    /// Retry policy for a target, applying the attempt-ceiling heuristic
    pub fn policy_for(&self, target: &TargetConfig) -> RetryPolicy {
        let max_attempts = if target.events.len() > self.extended_events_threshold {
            self.extended_attempts
        } else {
            self.base_attempts
        };

        let mut policy = RetryPolicy::new(
            max_attempts,
            Backoff::Fixed(Duration::from_millis(self.retry_delay_ms)),
        )
        .jitter(self.jitter)
        .no_attempt_timeout();
        if let Some(timeout_ms) = self.attempt_timeout_ms {
            policy = policy.attempt_timeout(Duration::from_millis(timeout_ms));
        }
        policy
    }
}

/// Inbound handling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InboundConfig {
    /// Sliding-window limit for the inbound key
    pub rate_limit_max_calls: u32,

    /// Window length in seconds
    pub rate_limit_window_secs: u64,

    /// Fixed delay between retry attempts, in milliseconds
    pub retry_delay_ms: u64,

    /// Attempt ceiling
    pub max_attempts: u32,

    /// Per-attempt timeout in milliseconds; absent disables the timeout
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            rate_limit_max_calls: 120,
            rate_limit_window_secs: 60,
            retry_delay_ms: 500,
            max_attempts: 3,
            attempt_timeout_ms: Some(10_000),
        }
    }
}

impl InboundConfig {
    /// Rate limit for the inbound handling key
    pub fn rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.rate_limit_max_calls,
            Duration::from_secs(self.rate_limit_window_secs),
        )
    }

    /// Retry policy for inbound acceptance
    pub fn policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::new(
            self.max_attempts,
            Backoff::Fixed(Duration::from_millis(self.retry_delay_ms)),
        )
        .no_attempt_timeout();
        if let Some(timeout_ms) = self.attempt_timeout_ms {
            policy = policy.attempt_timeout(Duration::from_millis(timeout_ms));
        }
        policy
    }
}

/// Redelivery scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedeliveryConfig {
    /// Re-attempt ceiling
    pub max_attempts: u32,

    /// Backoff step in milliseconds; the delay before re-attempt n is
    /// min(step * (n + 1), cap)
    pub step_ms: u64,

    /// Backoff cap in milliseconds
    pub cap_ms: u64,

    /// Jitter factor (0.0 to 1.0) applied to the backoff delays
    pub jitter: f64,
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            step_ms: 5_000,
            cap_ms: 30_000,
            jitter: 0.0,
        }
    }
}

impl RedeliveryConfig {
    /// Retry policy for scheduled redelivery rounds
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Linear {
                step: Duration::from_millis(self.step_ms),
                cap: Duration::from_millis(self.cap_ms),
            },
        )
        .jitter(self.jitter)
    }
}

impl Config {
    /// Load configuration from the path in `WEBHOOK_RELAY_CONFIG`
    ///
    /// Falls back to defaults when the variable is unset or the file does
    /// not exist.
    pub fn load() -> Result<Self> {
        match std::env::var("WEBHOOK_RELAY_CONFIG") {
            Ok(path) => Self::load_from_path(path),
            Err(_) => Ok(Self::default().apply_env_overrides()),
        }
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default().apply_env_overrides());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        // Apply environment variable overrides
        let config = config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - WEBHOOK_RELAY_LOG_LEVEL
    /// - WEBHOOK_RELAY_LOG_FORMAT
    /// - WEBHOOK_RELAY_OUTBOUND_MAX_CALLS
    /// - WEBHOOK_RELAY_OUTBOUND_RETRY_DELAY_MS
    /// - WEBHOOK_RELAY_INBOUND_MAX_CALLS
    /// - WEBHOOK_RELAY_REDELIVERY_MAX_ATTEMPTS
    fn apply_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(level) = std::env::var("WEBHOOK_RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("WEBHOOK_RELAY_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Outbound overrides
        if let Ok(max) = std::env::var("WEBHOOK_RELAY_OUTBOUND_MAX_CALLS") {
            if let Ok(max) = max.parse::<u32>() {
                if max > 0 {
                    self.outbound.rate_limit_max_calls = max;
                }
            }
        }
        if let Ok(delay) = std::env::var("WEBHOOK_RELAY_OUTBOUND_RETRY_DELAY_MS") {
            if let Ok(delay) = delay.parse::<u64>() {
                self.outbound.retry_delay_ms = delay;
            }
        }

        // Inbound overrides
        if let Ok(max) = std::env::var("WEBHOOK_RELAY_INBOUND_MAX_CALLS") {
            if let Ok(max) = max.parse::<u32>() {
                if max > 0 {
                    self.inbound.rate_limit_max_calls = max;
                }
            }
        }

        // Redelivery overrides
        if let Ok(attempts) = std::env::var("WEBHOOK_RELAY_REDELIVERY_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse::<u32>() {
                if attempts > 0 {
                    self.redelivery.max_attempts = attempts;
                }
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.outbound.base_attempts == 0 || self.inbound.max_attempts == 0 {
            anyhow::bail!("Attempt ceilings must be at least 1");
        }
        if self.outbound.extended_attempts < self.outbound.base_attempts {
            anyhow::bail!(
                "outbound.extended_attempts ({}) must not be below base_attempts ({})",
                self.outbound.extended_attempts,
                self.outbound.base_attempts
            );
        }
        if self.outbound.rate_limit_window_secs == 0 || self.inbound.rate_limit_window_secs == 0 {
            anyhow::bail!("Rate-limit windows must be non-zero");
        }
        if !(0.0..=1.0).contains(&self.outbound.jitter)
            || !(0.0..=1.0).contains(&self.redelivery.jitter)
        {
            anyhow::bail!("Jitter factors must be within 0.0 to 1.0");
        }
        if self.redelivery.cap_ms < self.redelivery.step_ms {
            anyhow::bail!(
                "redelivery.cap_ms ({}) must not be below step_ms ({})",
                self.redelivery.cap_ms,
                self.redelivery.step_ms
            );
        }

        for target in &self.targets {
            if target.id.is_empty() {
                anyhow::bail!("Target IDs must be non-empty");
            }
            if !target.url.starts_with("http://") && !target.url.starts_with("https://") {
                anyhow::bail!("Target '{}' has a non-HTTP URL: {}", target.id, target.url);
            }
        }

        Ok(())
    }
}
