//! Webhook dispatcher
//!
//! Inbound events are handed to a single background worker through a bounded
//! channel. The event loop never waits on the webhook:
//!
//! ```text
//! InboundNormalizer ──try_send──▶ [bounded queue] ──▶ worker ──▶ WebhookSink
//!                         │
//!                         └── full: drop + warn
//! ```
//!
//! Delivery failures are logged and discarded after the configured number of
//! retries; they never reach the session state or the event source.

pub mod http;

pub use http::HttpWebhookSink;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::inbound::InboundMessageEvent;
use crate::traits::WebhookSink;

/// Retry policy for failed deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookPolicy {
    /// Extra attempts after the first failure
    pub max_retries: usize,
    /// Delay between attempts
    pub retry_delay: Duration,
}

impl Default for WebhookPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Result of handing an event to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Queued for delivery
    Queued,
    /// Queue full; the event was dropped
    Dropped,
    /// Worker has stopped; the event was dropped
    Closed,
}

/// Delivery counters reported by the worker when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebhookStats {
    /// Events delivered successfully
    pub delivered: usize,
    /// Events discarded after all attempts failed
    pub failed: usize,
    /// Delivery attempts made in total
    pub attempts: usize,
}

/// Handle for queueing events to the webhook worker
///
/// Cloning shares the queue. The worker stops after every handle is dropped
/// and the queue is drained.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    tx: mpsc::Sender<InboundMessageEvent>,
}

impl WebhookDispatcher {
    /// Spawn the delivery worker
    ///
    /// Returns the dispatcher handle and the worker's join handle, which
    /// resolves to delivery counters once the queue closes.
    pub fn spawn(
        sink: Arc<dyn WebhookSink>,
        capacity: usize,
        policy: WebhookPolicy,
    ) -> (Self, JoinHandle<WebhookStats>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(sink, rx, policy));
        (Self { tx }, worker)
    }

    /// Queue an event without waiting
    pub fn dispatch(&self, event: InboundMessageEvent) -> DispatchOutcome {
        match self.tx.try_send(event) {
            Ok(()) => DispatchOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Webhook queue full, dropping message {} from {}. Consider increasing the queue capacity.",
                    event.message_id, event.from
                );
                DispatchOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                error!(
                    "Webhook worker stopped, dropping message {}",
                    event.message_id
                );
                DispatchOutcome::Closed
            }
        }
    }
}

async fn run_worker(
    sink: Arc<dyn WebhookSink>,
    mut rx: mpsc::Receiver<InboundMessageEvent>,
    policy: WebhookPolicy,
) -> WebhookStats {
    let mut stats = WebhookStats::default();

    while let Some(event) = rx.recv().await {
        let mut attempt = 0;
        loop {
            stats.attempts += 1;
            match sink.deliver(&event).await {
                Ok(()) => {
                    debug!("Delivered message {} to {}", event.message_id, sink.endpoint());
                    stats.delivered += 1;
                    break;
                }
                Err(e) if attempt < policy.max_retries => {
                    attempt += 1;
                    warn!(
                        "Webhook attempt {} for message {} failed: {}",
                        attempt, event.message_id, e
                    );
                    tokio::time::sleep(policy.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        "Discarding message {} after {} attempt(s): {}",
                        event.message_id,
                        attempt + 1,
                        e
                    );
                    stats.failed += 1;
                    break;
                }
            }
        }
    }

    debug!(
        "Webhook worker stopped ({} delivered, {} failed)",
        stats.delivered, stats.failed
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(id: &str) -> InboundMessageEvent {
        InboundMessageEvent {
            from: "5511@s.whatsapp.net".to_string(),
            message: "hi".to_string(),
            timestamp: Utc::now(),
            message_id: id.to_string(),
        }
    }

    /// Fails the first `failures` deliveries, then succeeds
    struct FlakySink {
        failures: usize,
        calls: AtomicUsize,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebhookSink for FlakySink {
        async fn deliver(&self, event: &InboundMessageEvent) -> crate::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(crate::Error::webhook("connection refused"));
            }
            self.delivered.lock().unwrap().push(event.message_id.clone());
            Ok(())
        }

        fn endpoint(&self) -> &str {
            "test://flaky"
        }
    }

    fn flaky(failures: usize) -> Arc<FlakySink> {
        Arc::new(FlakySink {
            failures,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let sink = flaky(0);
        let (dispatcher, worker) =
            WebhookDispatcher::spawn(sink.clone(), 8, WebhookPolicy::default());

        assert_eq!(dispatcher.dispatch(event("a")), DispatchOutcome::Queued);
        assert_eq!(dispatcher.dispatch(event("b")), DispatchOutcome::Queued);
        drop(dispatcher);

        let stats = worker.await.unwrap();
        assert_eq!(stats.delivered, 2);
        assert_eq!(*sink.delivered.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failure_without_retries_is_discarded() {
        let sink = flaky(1);
        let (dispatcher, worker) =
            WebhookDispatcher::spawn(sink.clone(), 8, WebhookPolicy::default());

        dispatcher.dispatch(event("lost"));
        dispatcher.dispatch(event("kept"));
        drop(dispatcher);

        let stats = worker.await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(*sink.delivered.lock().unwrap(), vec!["kept"]);
    }

    #[tokio::test]
    async fn retries_up_to_policy() {
        let sink = flaky(2);
        let policy = WebhookPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(5),
        };
        let (dispatcher, worker) = WebhookDispatcher::spawn(sink.clone(), 8, policy);

        dispatcher.dispatch(event("eventually"));
        drop(dispatcher);

        let stats = worker.await.unwrap();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        /// Never completes a delivery
        struct StuckSink;

        #[async_trait]
        impl WebhookSink for StuckSink {
            async fn deliver(&self, _event: &InboundMessageEvent) -> crate::Result<()> {
                std::future::pending::<()>().await;
                Ok(())
            }

            fn endpoint(&self) -> &str {
                "test://stuck"
            }
        }

        let (dispatcher, worker) =
            WebhookDispatcher::spawn(Arc::new(StuckSink), 1, WebhookPolicy::default());

        // First event is picked up by the worker, second fills the queue.
        dispatcher.dispatch(event("1"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.dispatch(event("2")), DispatchOutcome::Queued);
        assert_eq!(dispatcher.dispatch(event("3")), DispatchOutcome::Dropped);

        worker.abort();
    }
}
