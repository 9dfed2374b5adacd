//! Configuration types for the gateway
//!
//! The daemon builds a [`GatewayConfig`] from environment variables; library
//! users can construct or deserialize one directly.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::webhook::WebhookPolicy;

/// Default webhook target: a local automation engine
pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:5678/webhook/whatsapp";

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP facade settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Inbound webhook delivery settings
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Outbound send settings
    #[serde(default)]
    pub send: SendConfig,

    /// Session (reconnect) settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl GatewayConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.http.validate()?;
        self.webhook.validate()?;

        if self.send.timeout_secs == 0 {
            return Err(crate::Error::config("Send timeout must be > 0"));
        }

        if self.session.connect_timeout_ms == 0 {
            return Err(crate::Error::config("Connect timeout must be > 0"));
        }

        if self.engine.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        Ok(())
    }
}

/// HTTP facade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to bind (e.g., "0.0.0.0")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Service name reported by `GET /`
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Version reported by `GET /`
    #[serde(default = "default_version")]
    pub version: String,
}

impl HttpConfig {
    /// Validate the HTTP configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.bind_addr.is_empty() {
            return Err(crate::Error::config("HTTP bind address cannot be empty"));
        }
        if self.port == 0 {
            return Err(crate::Error::config("HTTP port must be > 0"));
        }
        Ok(())
    }

    /// `bind_addr:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            service_name: default_service_name(),
            version: default_version(),
        }
    }
}

/// Webhook delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL that receives normalized inbound messages
    #[serde(default = "default_webhook_url")]
    pub url: String,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,

    /// Capacity of the delivery queue
    ///
    /// When full, new inbound events are dropped (with a warning log) so a
    /// slow webhook can never stall the session event loop.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Extra delivery attempts after a failure (0 = drop on first failure)
    #[serde(default)]
    pub max_retries: usize,

    /// Delay between delivery attempts (in milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl WebhookConfig {
    /// Validate the webhook configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.url.is_empty() {
            return Err(crate::Error::config("Webhook URL cannot be empty"));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(crate::Error::config(format!(
                "Webhook URL must use HTTP or HTTPS scheme. Got: {}",
                self.url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Webhook timeout must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(crate::Error::config("Webhook queue capacity must be > 0"));
        }
        Ok(())
    }

    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy for the dispatcher
    pub fn policy(&self) -> WebhookPolicy {
        WebhookPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: default_webhook_url(),
            timeout_secs: default_webhook_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Outbound send configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfig {
    /// Upper bound on one transmit call (in seconds)
    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,
}

impl SendConfig {
    /// Transmit timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Reconnect after a transient disconnect
    ///
    /// A logged-out session is never reconnected: its credentials are gone.
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,

    /// Delay before reconnecting (in milliseconds)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound on one reconnect attempt (in milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl SessionConfig {
    /// Reconnect delay as a [`Duration`]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reconnect attempt timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: default_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the monitoring event channel
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_service_name() -> String {
    "WhatsApp Gateway".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_webhook_url() -> String {
    DEFAULT_WEBHOOK_URL.to_string()
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    256
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_send_timeout_secs() -> u64 {
    20
}

fn default_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_event_channel_capacity() -> usize {
    1000
}
