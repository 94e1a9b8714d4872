// Redelivery scheduling for exhausted dispatches
//
// A dispatch that used up its inline retry budget can be handed to the
// scheduler, which re-runs it under a linear capped backoff keyed to the
// task's cumulative attempt counter: the delay before re-attempt n is
// min(step * (n + 1), cap), so 5s, 10s, 15s, ..., capped at 30s, for at
// most five re-attempts. The delay precedes every round, the first one
// included. Each scheduled round is a single rate-limited dispatch
// attempt, so inline fixed-delay retries never stack underneath the
// scheduled ones.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RedeliveryConfig;
use crate::error::WebhookError;
use crate::retry::retry_deferred;
use crate::webhooks::outbound::{DispatchReceipt, OutboundDispatcher, OutboundTask};

/// Scheduler that re-dispatches failed outbound tasks
pub struct RedeliveryScheduler {
    dispatcher: Arc<OutboundDispatcher>,
    config: RedeliveryConfig,
}

impl RedeliveryScheduler {
    pub fn new(dispatcher: Arc<OutboundDispatcher>, config: RedeliveryConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Re-deliver a previously failed task
    ///
    /// The task's attempt counter marks the rounds already spent; it keys
    /// the backoff schedule, so a task that already burned n rounds waits
    /// min(step * (n + 1), cap) before the next one, and each scheduled
    /// round increments it for log bookkeeping. The final error propagates
    /// unchanged once the redelivery budget is exhausted.
    pub async fn redeliver(&self, task: &OutboundTask) -> Result<DispatchReceipt, WebhookError> {
        let policy = self.config.policy();
        let budget = task.attempt + policy.max_attempts;
        info!(
            "Scheduling redelivery of event {} to {} ({} attempts max)",
            task.event_id, task.target.id, policy.max_attempts
        );

        let result = retry_deferred(&policy, task.attempt, |attempt| {
            let mut round = task.clone();
            round.attempt = task.attempt + attempt;
            async move { self.dispatcher.dispatch_once(&round, budget).await }
        })
        .await;

        if let Err(e) = &result {
            warn!(
                "Redelivery of event {} to {} gave up: {}",
                task.event_id, task.target.id, e
            );
        }
        result
    }
}
