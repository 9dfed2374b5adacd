//! Outbound send gateway
//!
//! Validation runs in a fixed order and stops at the first failure:
//!
//! 1. session must be `Connected`, otherwise [`SendError::NotConnected`]
//! 2. destination is qualified with the default user server if needed
//! 3. the qualified address must parse, otherwise [`SendError::InvalidAddress`]
//! 4. one plain-text transmit through the client, bounded by a timeout
//! 5. transmit failure becomes [`SendError::DeliveryFailed`]
//!
//! Nothing is transmitted when validation fails, and nothing is retried.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::address::{Jid, qualify};
use crate::error::SendError;
use crate::session::SessionContext;
use crate::traits::WhatsAppClient;

/// A request to send a text message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSendRequest {
    /// Destination; a bare number is qualified with the default server
    pub number: String,
    /// Text content
    pub message: String,
}

impl OutboundSendRequest {
    pub fn new(number: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            message: message.into(),
        }
    }
}

/// Acknowledgement of a successful send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendAck {
    /// Fully qualified destination
    pub to: String,
    /// Message id assigned by the client library
    pub message_id: String,
}

/// Validates and dispatches outbound text messages
pub struct SendGateway {
    ctx: SessionContext,
    client: Arc<dyn WhatsAppClient>,
    timeout: Duration,
}

impl SendGateway {
    pub fn new(ctx: SessionContext, client: Arc<dyn WhatsAppClient>, timeout: Duration) -> Self {
        Self {
            ctx,
            client,
            timeout,
        }
    }

    /// Send a text message
    pub async fn send(&self, request: &OutboundSendRequest) -> Result<SendAck, SendError> {
        if !self.ctx.is_connected() {
            warn!("Rejecting send to {}: session not connected", request.number);
            return Err(SendError::NotConnected);
        }

        let to = qualify(&request.number);
        let jid: Jid = to
            .parse()
            .map_err(|e: crate::Error| SendError::InvalidAddress(e.to_string()))?;

        let transmit = self.client.send_text(&jid, &request.message);
        let receipt = tokio::time::timeout(self.timeout, transmit)
            .await
            .map_err(|_| {
                SendError::DeliveryFailed(format!("send timed out after {:?}", self.timeout))
            })?
            .map_err(|e| {
                warn!("Send to {} failed: {}", to, e);
                SendError::DeliveryFailed(e.to_string())
            })?;

        info!("Sent message {} to {}", receipt.message_id, to);
        Ok(SendAck {
            to,
            message_id: receipt.message_id,
        })
    }
}

impl std::fmt::Debug for SendGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGateway")
            .field("client", &self.client.client_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
