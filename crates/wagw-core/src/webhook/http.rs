// # HTTP Webhook Sink
//
// Posts normalized inbound events as JSON to the configured webhook URL
// (typically an automation engine such as n8n).
//
// One request per call; retries are owned by the dispatcher.

use async_trait::async_trait;
use std::time::Duration;

use crate::inbound::InboundMessageEvent;
use crate::traits::WebhookSink;
use crate::{Error, Result};

/// Default HTTP timeout for webhook requests (10 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook sink that performs an HTTP POST per event
#[derive(Debug, Clone)]
pub struct HttpWebhookSink {
    /// Target URL
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpWebhookSink {
    /// Create a sink with the default timeout
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a sink with a custom request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::config("Webhook URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn deliver(&self, event: &InboundMessageEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| Error::webhook(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::webhook(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        tracing::debug!("Webhook accepted message {} ({})", event.message_id, status);
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn rejects_empty_url() {
        assert!(matches!(HttpWebhookSink::new(""), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn connection_refused_is_a_webhook_error() {
        // Nothing listens on loopback port 9.
        let sink = HttpWebhookSink::with_timeout(
            "http://127.0.0.1:9/webhook/whatsapp",
            Duration::from_secs(2),
        )
        .unwrap();

        let event = InboundMessageEvent {
            from: "5511@s.whatsapp.net".to_string(),
            message: "hi".to_string(),
            timestamp: Utc::now(),
            message_id: "ABC".to_string(),
        };

        let err = sink.deliver(&event).await.unwrap_err();
        assert!(matches!(err, Error::WebhookDeliveryFailed(_)));
        assert_eq!(sink.endpoint(), "http://127.0.0.1:9/webhook/whatsapp");
    }
}
