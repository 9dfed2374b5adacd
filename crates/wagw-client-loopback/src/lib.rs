// # Loopback WhatsApp Client
//
// An in-process implementation of `WhatsAppClient` that never touches the
// network. It behaves like a protocol library from the gateway's point of
// view:
//
// - `connect()` with a paired device emits `Connected`
// - `connect()` without credentials starts a pairing-code rotation that ends
//   in `Timeout` unless pairing completes first
// - logging out wipes the device from the store
//
// A `LoopbackHandle` plays the part of the phone and the network: it can
// complete pairing, drop the connection, and inject inbound messages.
//
// ## Echo mode
//
// With echo enabled every sent message comes back as an inbound message from
// its destination, which exercises the full send → receive → webhook path in a
// local demo.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use wagw_core::traits::{
    DeviceStore, DisconnectReason, EventStream, MessageContent, PairingItem, PairingStream,
    RawMessage, SendReceipt, SessionEvent, WhatsAppClient,
};
use wagw_core::{Error, Jid, Result};

/// Default interval between pairing codes
const DEFAULT_CODE_INTERVAL: Duration = Duration::from_secs(20);

/// Codes issued before the pairing window closes
const DEFAULT_MAX_CODES: usize = 6;

/// A message transmitted through the loopback client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub text: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

struct Shared {
    store: Arc<dyn DeviceStore>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    pairing_tx: Mutex<Option<mpsc::UnboundedSender<PairingItem>>>,
    pairing_rx: Mutex<Option<mpsc::UnboundedReceiver<PairingItem>>>,
    connected: AtomicBool,
    fail_sends: AtomicBool,
    connect_calls: AtomicUsize,
    next_id: AtomicU64,
    sent: Mutex<Vec<SentMessage>>,
    rotation: Mutex<Option<JoinHandle<()>>>,
    auto_pair: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Loopback event stream has no receiver");
        }
    }

    fn push_pairing(&self, item: PairingItem) -> bool {
        match lock(&self.pairing_tx).as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    fn next_message_id(&self) -> String {
        format!("3EB0{:012X}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn complete_pairing(&self, id: &str) -> Result<()> {
        let mut device = self.store.get_or_create_device().await?;
        device.pair(id);
        self.store.save_device(&device).await?;

        if let Some(task) = lock(&self.rotation).take() {
            task.abort();
        }
        self.push_pairing(PairingItem::Success);
        lock(&self.pairing_tx).take();

        info!("Loopback device paired as {}", id);
        self.connected.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::Connected);
        Ok(())
    }
}

/// Loopback client
pub struct LoopbackClient {
    shared: Arc<Shared>,
    code_interval: Duration,
    max_codes: usize,
    auto_pair: Option<(Duration, String)>,
    echo: bool,
}

impl LoopbackClient {
    /// Create a client backed by `store`
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (pairing_tx, pairing_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                store,
                event_tx,
                event_rx: Mutex::new(Some(event_rx)),
                pairing_tx: Mutex::new(Some(pairing_tx)),
                pairing_rx: Mutex::new(Some(pairing_rx)),
                connected: AtomicBool::new(false),
                fail_sends: AtomicBool::new(false),
                connect_calls: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
                sent: Mutex::new(Vec::new()),
                rotation: Mutex::new(None),
                auto_pair: Mutex::new(None),
            }),
            code_interval: DEFAULT_CODE_INTERVAL,
            max_codes: DEFAULT_MAX_CODES,
            auto_pair: None,
            echo: false,
        }
    }

    /// Rotate pairing codes at `interval`, closing the window after `max_codes`
    pub fn with_code_rotation(mut self, interval: Duration, max_codes: usize) -> Self {
        self.code_interval = interval;
        self.max_codes = max_codes;
        self
    }

    /// Pretend the first code is scanned after `delay`, pairing as `id`
    pub fn with_auto_pair(mut self, delay: Duration, id: impl Into<String>) -> Self {
        self.auto_pair = Some((delay, id.into()));
        self
    }

    /// Loop every sent message back as an inbound message
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Handle for driving the simulated phone and network
    pub fn handle(&self) -> LoopbackHandle {
        LoopbackHandle {
            shared: self.shared.clone(),
        }
    }

    fn start_pairing(&self) {
        let mut rotation = lock(&self.shared.rotation);
        if rotation.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let shared = self.shared.clone();
        let interval = self.code_interval;
        let max_codes = self.max_codes;
        *rotation = Some(tokio::spawn(async move {
            for n in 1..=max_codes {
                let code = format!("2@LOOPBACK{:02}{:X}", n, Utc::now().timestamp_millis());
                if !shared.push_pairing(PairingItem::Code(code)) {
                    debug!("Pairing stream closed, stopping code rotation");
                    return;
                }
                tokio::time::sleep(interval).await;
            }
            warn!("Loopback pairing window closed after {} codes", max_codes);
            shared.push_pairing(PairingItem::Timeout);
        }));
        drop(rotation);

        if let Some((delay, id)) = self.auto_pair.clone() {
            let shared = self.shared.clone();
            *lock(&self.shared.auto_pair) = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = shared.complete_pairing(&id).await {
                    warn!("Loopback auto-pair failed: {}", e);
                }
            }));
        }
    }
}

#[async_trait]
impl WhatsAppClient for LoopbackClient {
    fn events(&self) -> EventStream {
        match lock(&self.shared.event_rx).take() {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => {
                warn!("Loopback event stream requested twice");
                Box::pin(tokio_stream::empty())
            }
        }
    }

    fn pairing_codes(&self) -> Option<PairingStream> {
        let rx = lock(&self.shared.pairing_rx).take()?;
        Some(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn connect(&self) -> Result<()> {
        self.shared.connect_calls.fetch_add(1, Ordering::SeqCst);
        let device = self.shared.store.get_or_create_device().await?;

        if device.is_paired() {
            info!("Loopback session open for {}", device.id.as_deref().unwrap_or_default());
            self.shared.connected.store(true, Ordering::SeqCst);
            self.shared.emit(SessionEvent::Connected);
        } else {
            info!("Loopback device unpaired, issuing pairing codes");
            self.start_pairing();
        }
        Ok(())
    }

    async fn disconnect(&self) {
        for task in [&self.shared.rotation, &self.shared.auto_pair] {
            if let Some(task) = lock(task).take() {
                task.abort();
            }
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        debug!("Loopback session closed");
    }

    async fn send_text(&self, to: &Jid, text: &str) -> Result<SendReceipt> {
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::client("loopback transmit failure"));
        }
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(Error::client("loopback session is not connected"));
        }

        let message = SentMessage {
            to: to.to_string(),
            text: text.to_string(),
            message_id: self.shared.next_message_id(),
            timestamp: Utc::now(),
        };
        lock(&self.shared.sent).push(message.clone());

        if self.echo {
            self.shared.emit(SessionEvent::MessageReceived(RawMessage {
                id: self.shared.next_message_id(),
                chat: message.to.clone(),
                sender: message.to.clone(),
                from_me: false,
                notify: true,
                content: Some(MessageContent::text(text)),
            }));
        }

        Ok(SendReceipt {
            message_id: message.message_id,
            timestamp: message.timestamp,
        })
    }

    fn client_name(&self) -> &'static str {
        "loopback"
    }
}

/// Driver for the simulated phone and network
#[derive(Clone)]
pub struct LoopbackHandle {
    shared: Arc<Shared>,
}

impl LoopbackHandle {
    /// Push a pairing code, as if the server rotated it
    pub fn issue_pairing_code(&self, code: impl Into<String>) -> bool {
        self.shared.push_pairing(PairingItem::Code(code.into()))
    }

    /// Close the pairing window without a scan
    pub fn expire_pairing(&self) -> bool {
        self.shared.push_pairing(PairingItem::Timeout)
    }

    /// Scan the current code: persist the device and open the session
    pub async fn complete_pairing(&self, id: &str) -> Result<()> {
        self.shared.complete_pairing(id).await
    }

    /// Signal that the session (re)opened
    pub fn connection_established(&self) {
        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.emit(SessionEvent::Connected);
    }

    /// Drop the connection
    ///
    /// `LoggedOut` wipes the device credentials, like an unlink from the phone.
    pub async fn drop_connection(&self, reason: DisconnectReason) -> Result<()> {
        self.shared.connected.store(false, Ordering::SeqCst);
        if reason == DisconnectReason::LoggedOut {
            self.shared.store.delete_device().await?;
        }
        self.shared.emit(SessionEvent::Disconnected { reason });
        Ok(())
    }

    /// Inject an inbound message
    pub fn deliver(&self, message: RawMessage) {
        self.shared.emit(SessionEvent::MessageReceived(message));
    }

    /// Make transmits fail (or succeed again)
    pub fn fail_sends(&self, fail: bool) {
        self.shared.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Messages transmitted so far
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.shared.sent).clone()
    }

    /// Number of `connect()` calls
    pub fn connect_calls(&self) -> usize {
        self.shared.connect_calls.load(Ordering::SeqCst)
    }

    /// Whether the simulated session is open
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LoopbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackHandle")
            .field("connected", &self.is_connected())
            .field("connect_calls", &self.connect_calls())
            .finish()
    }
}
