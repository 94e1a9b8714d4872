// Webhook delivery log
//
// One immutable entry per delivery attempt. The production system persists
// entries through the CRM's log store; here the store is a trait with an
// in-memory implementation that also emits a tracing line per entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::WebhookError;

/// Direction of the delivery an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failure,
}

/// Immutable record of one delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLogEntry {
    /// Unique ID for this log entry
    pub id: String,
    /// Event the attempt belongs to
    pub event_id: String,
    /// Outbound dispatch or inbound receipt
    pub direction: Direction,
    /// Attempt outcome
    pub status: DeliveryStatus,
    /// When the attempt completed
    pub delivered_at: DateTime<Utc>,
    /// HTTP-style response code, when one was produced
    pub response_code: Option<u16>,
    /// Attempt latency in milliseconds
    pub latency_ms: u64,
    /// One-based attempt number within its retry loop
    pub attempt: u32,
    /// Attempt ceiling of the retry loop
    pub max_attempts: u32,
}

impl WebhookLogEntry {
    pub fn new(
        event_id: String,
        direction: Direction,
        status: DeliveryStatus,
        response_code: Option<u16>,
        latency_ms: u64,
        attempt: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: format!("log-{}", Uuid::new_v4()),
            event_id,
            direction,
            status,
            delivered_at: Utc::now(),
            response_code,
            latency_ms,
            attempt,
            max_attempts,
        }
    }
}

/// Persistence seam for delivery log entries
#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    /// Persist one entry. Failures are transient from the caller's point of
    /// view and may be retried.
    async fn append(&self, entry: WebhookLogEntry) -> Result<(), WebhookError>;
}

/// In-memory log store
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: RwLock<Vec<WebhookLogEntry>>,
}

impl MemoryLogStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, oldest first
    pub async fn entries(&self) -> Vec<WebhookLogEntry> {
        self.entries.read().await.clone()
    }

    /// Entries recorded for a specific event
    pub async fn for_event(&self, event_id: &str) -> Vec<WebhookLogEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Number of stored entries
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Aggregate counts over the stored log
    pub async fn stats(&self) -> LogStats {
        let entries = self.entries.read().await;
        LogStats {
            total: entries.len(),
            succeeded: entries
                .iter()
                .filter(|e| e.status == DeliveryStatus::Success)
                .count(),
            failed: entries
                .iter()
                .filter(|e| e.status == DeliveryStatus::Failure)
                .count(),
            outbound: entries
                .iter()
                .filter(|e| e.direction == Direction::Outbound)
                .count(),
            inbound: entries
                .iter()
                .filter(|e| e.direction == Direction::Inbound)
                .count(),
        }
    }
}

#[async_trait]
impl WebhookLogStore for MemoryLogStore {
    async fn append(&self, entry: WebhookLogEntry) -> Result<(), WebhookError> {
        info!(
            "Webhook {:?} attempt {}/{} for event {} -> {:?} ({} ms)",
            entry.direction,
            entry.attempt,
            entry.max_attempts,
            entry.event_id,
            entry.status,
            entry.latency_ms
        );
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }
}

/// Delivery log statistics
#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outbound: usize,
    pub inbound: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(event_id: &str, direction: Direction, status: DeliveryStatus) -> WebhookLogEntry {
        WebhookLogEntry::new(event_id.to_string(), direction, status, Some(200), 12, 1, 3)
    }

    #[test]
    fn test_entry_gets_unique_id() {
        let a = entry("evt-1", Direction::Outbound, DeliveryStatus::Success);
        let b = entry("evt-1", Direction::Outbound, DeliveryStatus::Success);

        assert!(a.id.starts_with("log-"));
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_append_and_query() {
        let store = MemoryLogStore::new();

        store
            .append(entry("evt-1", Direction::Outbound, DeliveryStatus::Success))
            .await
            .unwrap();
        store
            .append(entry("evt-2", Direction::Inbound, DeliveryStatus::Failure))
            .await
            .unwrap();

        assert_eq!(store.count().await, 2);
        assert_eq!(store.for_event("evt-1").await.len(), 1);
        assert_eq!(store.for_event("evt-3").await.len(), 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = MemoryLogStore::new();

        store
            .append(entry("evt-1", Direction::Outbound, DeliveryStatus::Success))
            .await
            .unwrap();
        store
            .append(entry("evt-1", Direction::Outbound, DeliveryStatus::Failure))
            .await
            .unwrap();
        store
            .append(entry("evt-2", Direction::Inbound, DeliveryStatus::Success))
            .await
            .unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.outbound, 2);
        assert_eq!(stats.inbound, 1);
    }
}
