//! Downstream receiver of normalized inbound events

use async_trait::async_trait;

use crate::inbound::InboundMessageEvent;

/// Trait for webhook sink implementations
///
/// A sink performs exactly one delivery attempt per call. Retries and
/// queueing belong to [`WebhookDispatcher`](crate::webhook::WebhookDispatcher).
#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// Deliver one event
    async fn deliver(&self, event: &InboundMessageEvent) -> Result<(), crate::Error>;

    /// Where events are delivered (for logging)
    fn endpoint(&self) -> &str;
}
