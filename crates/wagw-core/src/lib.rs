// # wagw-core
//
// Session lifecycle and event routing for a single-account WhatsApp gateway.
//
// ## Architecture Overview
//
// The WhatsApp protocol itself lives behind the [`WhatsAppClient`] trait. This
// crate owns everything around it:
// - **SessionContext**: process-wide session state and the live pairing code
// - **PairingCodeConsumer**: drains the rotating pairing-code stream
// - **InboundNormalizer**: turns raw inbound messages into webhook events
// - **WebhookDispatcher**: bounded background delivery to the automation webhook
// - **SendGateway**: validates and dispatches outbound text messages
// - **GatewayEngine**: the single event-processing loop tying it together
//
// ## Design Principles
//
// 1. **One session per process**: a single `SessionContext` is shared by the
//    event loop (writer) and the HTTP layer (readers)
// 2. **Event-driven**: client events are processed one at a time, in order
// 3. **Never block on the webhook**: inbound delivery is queued and dropped on
//    saturation
// 4. **Library-first**: the daemon is thin wiring around this crate

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod pairing;
pub mod session;
pub mod store;
pub mod traits;
pub mod webhook;

// Re-export core types for convenience
pub use address::Jid;
pub use config::GatewayConfig;
pub use engine::{GatewayEngine, GatewayEvent};
pub use error::{Error, Result, SendError};
pub use inbound::{InboundMessageEvent, InboundNormalizer};
pub use outbound::{OutboundSendRequest, SendAck, SendGateway};
pub use pairing::PairingCodeConsumer;
pub use session::{SessionContext, SessionSnapshot, SessionState};
pub use store::{FileDeviceStore, MemoryDeviceStore};
pub use traits::{DeviceStore, WebhookSink, WhatsAppClient};
pub use webhook::{HttpWebhookSink, WebhookDispatcher, WebhookPolicy};
