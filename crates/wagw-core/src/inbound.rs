//! Inbound message normalization
//!
//! Raw inbound payloads come in several shapes. The normalizer reduces them to
//! a stable [`InboundMessageEvent`] (sender, text, timestamp) and hands it to
//! the [`WebhookDispatcher`]. Extraction is total: a message without text
//! (media-only, reactions) still produces an event with empty text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::traits::{MessageContent, RawMessage};
use crate::webhook::{DispatchOutcome, WebhookDispatcher};

/// Normalized inbound message, as posted to the webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessageEvent {
    /// Sender address
    pub from: String,
    /// Extracted text, possibly empty
    pub message: String,
    /// Receipt time (serialized as RFC 3339)
    pub timestamp: DateTime<Utc>,
    /// Protocol message id
    #[serde(rename = "messageId")]
    pub message_id: String,
}

/// What happened to one raw inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Queued for webhook delivery
    Forwarded,
    /// Sent by the gateway's own account
    SkippedSelf,
    /// Protocol stub without a message body
    SkippedEmpty,
    /// History sync rather than a live notification
    SkippedHistory,
    /// Webhook queue saturated or closed; the event was dropped
    Dropped,
}

/// Extract text with the fallback chain: plain text, then extended text, then `""`
pub fn extract_text(content: &MessageContent) -> String {
    let plain = content.conversation.as_deref().unwrap_or_default();
    if !plain.is_empty() {
        return plain.to_string();
    }

    content
        .extended_text
        .as_ref()
        .and_then(|ext| ext.text.as_deref())
        .unwrap_or_default()
        .to_string()
}

/// Build the normalized event for a raw message, or the reason it is filtered
pub fn normalize(raw: &RawMessage) -> Result<InboundMessageEvent, InboundOutcome> {
    if raw.from_me {
        return Err(InboundOutcome::SkippedSelf);
    }
    if !raw.notify {
        return Err(InboundOutcome::SkippedHistory);
    }
    let content = raw.content.as_ref().ok_or(InboundOutcome::SkippedEmpty)?;

    Ok(InboundMessageEvent {
        from: raw.sender.clone(),
        message: extract_text(content),
        timestamp: Utc::now(),
        message_id: raw.id.clone(),
    })
}

/// Reacts to inbound message events and forwards them to the webhook
#[derive(Debug, Clone)]
pub struct InboundNormalizer {
    dispatcher: WebhookDispatcher,
}

impl InboundNormalizer {
    pub fn new(dispatcher: WebhookDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Handle one raw inbound message
    ///
    /// Never blocks on the webhook and never fails.
    pub fn on_message_event(&self, raw: RawMessage) -> InboundOutcome {
        let event = match normalize(&raw) {
            Ok(event) => event,
            Err(skipped) => {
                debug!("Inbound message {} not forwarded: {:?}", raw.id, skipped);
                return skipped;
            }
        };

        info!("Message from {}: {}", event.from, event.message);

        match self.dispatcher.dispatch(event) {
            DispatchOutcome::Queued => InboundOutcome::Forwarded,
            DispatchOutcome::Dropped | DispatchOutcome::Closed => InboundOutcome::Dropped,
        }
    }
}
