//! Error types for the gateway
//!
//! [`Error`] covers the library as a whole. The outbound path has its own
//! [`SendError`] because every variant maps onto a distinct caller-facing
//! outcome.

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the gateway
#[derive(Error, Debug)]
pub enum Error {
    /// WhatsApp client library errors (connect, transmit)
    #[error("Client error: {0}")]
    Client(String),

    /// Device/credential store errors
    #[error("Device store error: {0}")]
    DeviceStore(String),

    /// Webhook delivery failed (never surfaced to the inbound event source)
    #[error("Webhook delivery failed: {0}")]
    WebhookDeliveryFailed(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a client library error
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    /// Create a device store error
    pub fn device_store(msg: impl Into<String>) -> Self {
        Self::DeviceStore(msg.into())
    }

    /// Create a webhook delivery error
    pub fn webhook(msg: impl Into<String>) -> Self {
        Self::WebhookDeliveryFailed(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Failure of an outbound send request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The session is not connected; nothing was transmitted
    #[error("WhatsApp session is not connected")]
    NotConnected,

    /// The destination could not be parsed into a WhatsApp address
    #[error("Invalid destination address: {0}")]
    InvalidAddress(String),

    /// The client library reported a transmit failure
    #[error("{0}")]
    DeliveryFailed(String),
}
