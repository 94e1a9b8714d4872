// Outbound webhook dispatcher
//
// Applies the outbound rate limit, then runs one retry loop around single
// delivery attempts. A disabled target fails the dispatch without retries.
// The attempt ceiling follows the legacy CRM heuristic: targets subscribed
// to more than three event types get four attempts, everything else three.
// Delivery itself goes through a transport seam; the default transport
// simulates the network with a ~90% success rate.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OutboundConfig;
use crate::error::WebhookError;
use crate::rate_limit::RateLimiter;
use crate::retry::{retry, RetryPolicy};
use crate::webhooks::log::{DeliveryStatus, Direction, WebhookLogEntry, WebhookLogStore};

/// Rate-limit key shared by every outbound dispatch
pub const OUTBOUND_RATE_KEY: &str = "webhooks:outbound";

/// Webhook target configuration
///
/// Owned by external configuration storage; read-only to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique target ID
    pub id: String,
    /// URL the target receives events at
    pub url: String,
    /// Disabled targets fail dispatch immediately
    pub enabled: bool,
    /// Event types this target subscribes to ("*" matches all)
    pub events: Vec<String>,
}

impl TargetConfig {
    /// Create an enabled target subscribed to all events
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            enabled: true,
            events: vec!["*".to_string()],
        }
    }

    /// Whether this target should receive an event of the given type
    pub fn handles_event(&self, event_type: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.events.iter().any(|e| e == "*" || e == event_type)
    }
}

/// One dispatch request: target + event + payload
#[derive(Debug, Clone)]
pub struct OutboundTask {
    pub target: TargetConfig,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Completed delivery rounds before this one (redelivery bookkeeping)
    pub attempt: u32,
}

impl OutboundTask {
    pub fn new(
        target: TargetConfig,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            target,
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
            attempt: 0,
        }
    }
}

/// Successful dispatch outcome
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub success: bool,
    /// Generated request ID, prefixed with "out-"
    pub request_id: String,
    /// Human-readable delivery summary
    pub message: String,
}

/// Response produced by a transport attempt
#[derive(Debug, Clone, Copy)]
pub struct TransportResponse {
    pub status_code: u16,
    pub latency_ms: u64,
}

/// Delivery seam between the dispatcher and the wire
///
/// The default implementation simulates the network; tests inject
/// deterministic fakes.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(
        &self,
        target: &TargetConfig,
        event_id: &str,
        payload: &serde_json::Value,
    ) -> Result<TransportResponse, WebhookError>;
}

/// Simulated transport: small random latency, ~90% success rate
#[derive(Debug, Default)]
pub struct SimulatedTransport;

#[async_trait]
impl DeliveryTransport for SimulatedTransport {
    async fn deliver(
        &self,
        target: &TargetConfig,
        event_id: &str,
        _payload: &serde_json::Value,
    ) -> Result<TransportResponse, WebhookError> {
        let (latency_ms, delivered) = {
            let mut rng = rand::rng();
            (rng.random_range(20..120), rng.random_bool(0.9))
        };
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        if delivered {
            debug!(
                "Simulated delivery of event {} to {} ({} ms)",
                event_id, target.url, latency_ms
            );
            Ok(TransportResponse {
                status_code: 200,
                latency_ms,
            })
        } else {
            Err(WebhookError::DeliveryFailed(format!(
                "simulated 502 from {}",
                target.url
            )))
        }
    }
}

/// Outbound webhook dispatcher
pub struct OutboundDispatcher {
    limiter: Arc<RateLimiter>,
    store: Arc<dyn WebhookLogStore>,
    transport: Arc<dyn DeliveryTransport>,
    config: OutboundConfig,
}

impl OutboundDispatcher {
    /// Create a dispatcher using the simulated transport
    pub fn new(
        limiter: Arc<RateLimiter>,
        store: Arc<dyn WebhookLogStore>,
        config: OutboundConfig,
    ) -> Self {
        Self::with_transport(limiter, store, Arc::new(SimulatedTransport), config)
    }

    /// Create a dispatcher with an explicit transport
    pub fn with_transport(
        limiter: Arc<RateLimiter>,
        store: Arc<dyn WebhookLogStore>,
        transport: Arc<dyn DeliveryTransport>,
        config: OutboundConfig,
    ) -> Self {
        Self {
            limiter,
            store,
            transport,
            config,
        }
    }

    /// Dispatch a task with the policy derived from its target
    ///
    /// Fails fast with [`WebhookError::RateLimitExceeded`] before any
    /// attempt when the outbound key is saturated.
    pub async fn dispatch(&self, task: &OutboundTask) -> Result<DispatchReceipt, WebhookError> {
        let policy = self.config.policy_for(&task.target);
        self.dispatch_with_policy(task, &policy).await
    }

    /// Dispatch a task under an explicit retry policy
    pub async fn dispatch_with_policy(
        &self,
        task: &OutboundTask,
        policy: &RetryPolicy,
    ) -> Result<DispatchReceipt, WebhookError> {
        self.limiter
            .check(OUTBOUND_RATE_KEY, self.config.rate_limit())?;

        let max_attempts = policy.max_attempts;
        retry(policy, |attempt| {
            self.attempt_delivery(task, attempt, max_attempts)
        })
        .await
    }

    /// One rate-limited delivery attempt with no inline retries
    ///
    /// The redelivery scheduler drives its own retry loop through this, so
    /// inline retries and scheduled redelivery never stack. `max_attempts`
    /// is the caller's overall budget and is recorded unchanged on the log
    /// entry, keeping entries from consecutive rounds comparable.
    pub async fn dispatch_once(
        &self,
        task: &OutboundTask,
        max_attempts: u32,
    ) -> Result<DispatchReceipt, WebhookError> {
        self.limiter
            .check(OUTBOUND_RATE_KEY, self.config.rate_limit())?;
        self.attempt_delivery(task, task.attempt, max_attempts).await
    }

    /// Fan an event out to every subscribed target; returns delivered count
    pub async fn publish(
        &self,
        targets: &[TargetConfig],
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> usize {
        let mut delivered = 0;
        for target in targets {
            if !target.handles_event(event_type) {
                debug!(
                    "Target {} skipped for event type '{}'",
                    target.id, event_type
                );
                continue;
            }

            let task = OutboundTask::new(target.clone(), event_id, event_type, payload.clone());
            match self.dispatch(&task).await {
                Ok(receipt) => {
                    info!("{}", receipt.message);
                    delivered += 1;
                }
                Err(e) => {
                    warn!("Dispatch of event {} to {} failed: {}", event_id, target.id, e);
                }
            }
        }
        delivered
    }

    async fn attempt_delivery(
        &self,
        task: &OutboundTask,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<DispatchReceipt, WebhookError> {
        if !task.target.enabled {
            return Err(WebhookError::TargetDisabled(task.target.id.clone()));
        }

        let start = Instant::now();
        let result = self
            .transport
            .deliver(&task.target, &task.event_id, &task.payload)
            .await;

        let (status, response_code, latency_ms) = match &result {
            Ok(response) => (
                DeliveryStatus::Success,
                Some(response.status_code),
                response.latency_ms,
            ),
            Err(_) => (
                DeliveryStatus::Failure,
                None,
                start.elapsed().as_millis() as u64,
            ),
        };

        let entry = WebhookLogEntry::new(
            task.event_id.clone(),
            Direction::Outbound,
            status,
            response_code,
            latency_ms,
            attempt + 1,
            max_attempts,
        );
        // The outbound log is advisory; a store failure must not fail an
        // otherwise successful delivery
        if let Err(e) = self.store.append(entry).await {
            warn!("Failed to record delivery log entry: {}", e);
        }

        result.map(|_| DispatchReceipt {
            success: true,
            request_id: format!("out-{}", Uuid::new_v4()),
            message: format!(
                "Delivered event {} to {}",
                task.event_id, task.target.url
            ),
        })
    }
}
