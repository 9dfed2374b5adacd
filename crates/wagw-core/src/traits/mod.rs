//! Collaborator traits for the gateway
//!
//! The gateway core talks to the outside world only through these seams:
//!
//! - [`WhatsAppClient`]: the protocol library (events, pairing codes, transmit)
//! - [`DeviceStore`]: credential/device persistence
//! - [`WebhookSink`]: the downstream receiver of inbound messages

pub mod client;
pub mod device_store;
pub mod webhook_sink;

pub use client::{
    DisconnectReason, EventStream, ExtendedText, MessageContent, PairingItem, PairingStream,
    RawMessage, SendReceipt, SessionEvent, WhatsAppClient,
};
pub use device_store::{DeviceRecord, DeviceStore};
pub use webhook_sink::WebhookSink;
