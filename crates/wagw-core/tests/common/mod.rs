//! Test doubles and common utilities for gateway contract tests
//!
//! The doubles are driven entirely by the test: session events and pairing
//! items are pushed through unbounded channels, and every call into a double
//! is counted so tests can assert on what the gateway did (and did not) do.

#![allow(dead_code)]

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use wagw_core::config::GatewayConfig;
use wagw_core::inbound::InboundMessageEvent;
use wagw_core::traits::{
    EventStream, MessageContent, PairingItem, PairingStream, RawMessage, SendReceipt,
    SessionEvent, WebhookSink, WhatsAppClient,
};
use wagw_core::{Error, Jid, Result};

/// A WhatsApp client whose events are emitted on demand
pub struct ControlledClient {
    event_tx: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    pairing_tx: Mutex<Option<mpsc::UnboundedSender<PairingItem>>>,
    pairing_rx: Mutex<Option<mpsc::UnboundedReceiver<PairingItem>>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    pairing_calls: AtomicUsize,
    fail_sends: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
    connect_delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl ControlledClient {
    pub fn new() -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (pairing_tx, pairing_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            event_tx: Mutex::new(Some(event_tx)),
            event_rx: Mutex::new(Some(event_rx)),
            pairing_tx: Mutex::new(Some(pairing_tx)),
            pairing_rx: Mutex::new(Some(pairing_rx)),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            pairing_calls: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            send_delay: Mutex::new(None),
            connect_delay: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Emit a session event
    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = self.event_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Emit an inbound text message
    pub fn emit_text(&self, id: &str, sender: &str, text: &str) {
        self.emit(SessionEvent::MessageReceived(text_message(id, sender, text)));
    }

    /// Push an item onto the pairing stream
    pub fn pairing(&self, item: PairingItem) {
        if let Some(tx) = self.pairing_tx.lock().unwrap().as_ref() {
            let _ = tx.send(item);
        }
    }

    /// Push a pairing code
    pub fn issue_code(&self, code: &str) {
        self.pairing(PairingItem::Code(code.to_string()));
    }

    /// End the event stream
    pub fn close_events(&self) {
        self.event_tx.lock().unwrap().take();
    }

    /// End the pairing stream without a terminal item
    pub fn close_pairing(&self) {
        self.pairing_tx.lock().unwrap().take();
    }

    /// Make every later send fail
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Delay every later send
    pub fn delay_sends(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    /// Delay every later connect
    pub fn delay_connects(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn pairing_calls(&self) -> usize {
        self.pairing_calls.load(Ordering::SeqCst)
    }

    /// Transmitted (destination, text) pairs
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WhatsAppClient for ControlledClient {
    fn events(&self) -> EventStream {
        let rx = self
            .event_rx
            .lock()
            .unwrap()
            .take()
            .expect("events() can only be called once");
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn pairing_codes(&self) -> Option<PairingStream> {
        self.pairing_calls.fetch_add(1, Ordering::SeqCst);
        let rx = self.pairing_rx.lock().unwrap().take()?;
        Some(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn send_text(&self, to: &Jid, text: &str) -> Result<SendReceipt> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::client("stream replaced"));
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), text.to_string()));
        Ok(SendReceipt {
            message_id: format!("OUT{}", sent.len()),
            timestamp: Utc::now(),
        })
    }

    fn client_name(&self) -> &'static str {
        "controlled"
    }
}

/// A webhook sink that records every delivery
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<InboundMessageEvent>>,
    calls: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delivered(&self) -> Vec<InboundMessageEvent> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` events were delivered (or give up after 2s)
    pub async fn wait_for(&self, n: usize) -> Vec<InboundMessageEvent> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.delivered.lock().unwrap().len() < n && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.delivered()
    }
}

#[async_trait::async_trait]
impl WebhookSink for RecordingSink {
    async fn deliver(&self, event: &InboundMessageEvent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn endpoint(&self) -> &str {
        "test://recording"
    }
}

/// A live text message from `sender`
pub fn text_message(id: &str, sender: &str, text: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        chat: sender.to_string(),
        sender: sender.to_string(),
        from_me: false,
        notify: true,
        content: Some(MessageContent::text(text)),
    }
}

/// Configuration with short delays for tests
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.session.reconnect_delay_ms = 20;
    config.webhook.retry_delay_ms = 5;
    config
}

/// Give the engine time to process what was emitted
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// A running engine and the handles a test needs to drive it
pub struct RunningEngine {
    pub ctx: wagw_core::SessionContext,
    pub events: mpsc::Receiver<wagw_core::GatewayEvent>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<Result<()>>,
}

impl RunningEngine {
    /// Build and spawn an engine around `client`
    pub async fn start(
        client: Arc<ControlledClient>,
        store: &dyn wagw_core::DeviceStore,
        sink: Arc<dyn WebhookSink>,
        config: GatewayConfig,
    ) -> Self {
        let (dispatcher, _worker) = wagw_core::WebhookDispatcher::spawn(
            sink,
            config.webhook.queue_capacity,
            config.webhook.policy(),
        );
        let (engine, events) = wagw_core::GatewayEngine::new(client, store, dispatcher, &config)
            .await
            .expect("engine construction succeeds");

        let ctx = engine.context();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle =
            tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

        settle().await;
        Self {
            ctx,
            events,
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    /// Signal shutdown and wait for the engine to return
    pub async fn stop(mut self) -> Vec<wagw_core::GatewayEvent> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), &mut self.handle)
            .await
            .expect("engine terminates within 5 seconds")
            .expect("engine task does not panic")
            .expect("engine shuts down cleanly");
        self.drain()
    }

    /// Everything emitted so far
    pub fn drain(&mut self) -> Vec<wagw_core::GatewayEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}
