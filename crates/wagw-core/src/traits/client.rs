// # WhatsApp Client Trait
//
// The seam between the gateway and the WhatsApp multi-device protocol
// implementation. Everything behind this trait (wire protocol, key exchange,
// framing) is owned by the client library.
//
// ## Usage
//
// ```rust,ignore
// use wagw_core::WhatsAppClient;
// use tokio_stream::StreamExt;
//
// let mut events = client.events();
// let pairing = client.pairing_codes(); // only before first pairing
// client.connect().await?;
//
// while let Some(event) = events.next().await {
//     println!("session event: {:?}", event);
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::address::Jid;

/// Why the connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Network drop or server restart; credentials are still valid
    Transient,
    /// The device was unlinked; re-pairing is required
    LoggedOut,
}

/// Asynchronous session events emitted by the client library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is open and authenticated
    Connected,

    /// The session was closed
    Disconnected { reason: DisconnectReason },

    /// A new pairing code was issued, superseding the previous one
    PairingCodeIssued { code: String },

    /// An inbound message arrived
    MessageReceived(RawMessage),
}

/// An inbound message as delivered by the client library
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawMessage {
    /// Protocol message id
    pub id: String,
    /// Chat the message belongs to
    pub chat: String,
    /// Address of the author
    pub sender: String,
    /// Sent by the gateway's own account
    pub from_me: bool,
    /// Live notification (false for history sync / appended messages)
    pub notify: bool,
    /// Message body; `None` for protocol stubs without content
    pub content: Option<MessageContent>,
}

/// Text-bearing parts of a message body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageContent {
    /// Plain conversation text
    pub conversation: Option<String>,
    /// Extended text (replies, link previews, quoted messages)
    pub extended_text: Option<ExtendedText>,
}

/// Extended text message payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtendedText {
    pub text: Option<String>,
}

impl MessageContent {
    /// Body with only plain conversation text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            conversation: Some(text.into()),
            extended_text: None,
        }
    }

    /// Body with only extended text
    pub fn extended(text: impl Into<String>) -> Self {
        Self {
            conversation: None,
            extended_text: Some(ExtendedText {
                text: Some(text.into()),
            }),
        }
    }
}

/// Items of the first-time pairing stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingItem {
    /// A fresh pairing code; earlier codes are no longer valid
    Code(String),
    /// The code was scanned and the device is paired
    Success,
    /// No code was scanned before the pairing window closed
    Timeout,
}

/// Acknowledgement of a transmitted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Protocol message id assigned to the outbound message
    pub message_id: String,
    /// Server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Boxed stream of session events
pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send + 'static>>;

/// Boxed stream of pairing items
pub type PairingStream = Pin<Box<dyn Stream<Item = PairingItem> + Send + 'static>>;

/// Trait for WhatsApp client library bindings
///
/// Implementations must be thread-safe: the engine drives events and
/// connection from one task while HTTP handlers call [`send_text`]
/// concurrently.
///
/// [`send_text`]: WhatsAppClient::send_text
#[async_trait]
pub trait WhatsAppClient: Send + Sync {
    /// Session event stream
    ///
    /// Called once by the engine before [`connect`](WhatsAppClient::connect).
    /// The stream ends only when the client is torn down.
    fn events(&self) -> EventStream;

    /// Rotating pairing codes for a device without credentials
    ///
    /// Must be requested before `connect()`. Returns `None` when the device
    /// is already paired or the stream was already taken.
    fn pairing_codes(&self) -> Option<PairingStream>;

    /// Open the connection
    async fn connect(&self) -> Result<(), crate::Error>;

    /// Close the connection
    async fn disconnect(&self);

    /// Transmit a plain-text message
    async fn send_text(&self, to: &Jid, text: &str) -> Result<SendReceipt, crate::Error>;

    /// Name of the client implementation (for logging)
    fn client_name(&self) -> &'static str;
}
