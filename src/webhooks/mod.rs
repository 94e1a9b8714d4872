// Webhook delivery module
//
// Handles:
// - Outbound dispatch with rate limiting and retries
// - Inbound handling with signature verification
// - Per-attempt delivery logging
// - Redelivery scheduling for exhausted dispatches

pub mod inbound;
pub mod log;
pub mod outbound;
pub mod redelivery;

pub use inbound::{InboundHandler, InboundPayload};
pub use log::{DeliveryStatus, Direction, LogStats, MemoryLogStore, WebhookLogEntry, WebhookLogStore};
pub use outbound::{
    DeliveryTransport, DispatchReceipt, OutboundDispatcher, OutboundTask, SimulatedTransport,
    TargetConfig,
};
pub use redelivery::RedeliveryScheduler;
