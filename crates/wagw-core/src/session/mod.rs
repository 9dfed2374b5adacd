// # Session Context
//
// Process-wide session state: the connection state machine and the live
// pairing code, kept together behind one synchronization point so readers
// never observe a code paired with the wrong state.
//
// ## Writers and readers
//
// - Writer: the engine's event loop (one event at a time, in arrival order)
// - Readers: HTTP handlers and the send gateway, from any task
//
// ## State machine
//
// ```text
//   Unpaired ──code──▶ AwaitingScan ──connected──▶ Connected
//       ▲                    │                         │
//       │                    └──────disconnected───────┤
//       │                                              ▼
//       └───────────(credentials wiped)───────── Disconnected
// ```
//
// Invariant: the pairing code is non-empty only in `Unpaired` or
// `AwaitingScan`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::traits::SessionEvent;

/// Connection state of the single WhatsApp session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No credentials, pairing not started
    Unpaired,
    /// A pairing code is live and waiting to be scanned
    AwaitingScan,
    /// Session open
    Connected,
    /// Session closed
    Disconnected,
}

impl SessionState {
    /// Initial state at process start
    ///
    /// A process with persisted credentials starts `Connected`; one without
    /// starts `Unpaired`.
    pub fn initial(has_credentials: bool) -> Self {
        if has_credentials {
            SessionState::Connected
        } else {
            SessionState::Unpaired
        }
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unpaired => "unpaired",
            SessionState::AwaitingScan => "awaiting_scan",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
        }
    }

    /// Whether a pairing code may be live in this state
    pub fn allows_pairing_code(&self) -> bool {
        matches!(self, SessionState::Unpaired | SessionState::AwaitingScan)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent view of the session at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Connection state
    pub state: SessionState,
    /// Latest pairing code, empty when none is live
    pub pairing_code: String,
    /// When the snapshot last changed
    pub updated_at: DateTime<Utc>,
}

/// Outcome of applying one session event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    /// Whether the pairing code was replaced or cleared
    pub code_changed: bool,
}

impl Transition {
    /// Whether the connection state changed
    pub fn state_changed(&self) -> bool {
        self.from != self.to
    }
}

/// Shared, internally synchronized session state
///
/// Cheap to clone; all clones observe the same session. Backed by a
/// [`watch`] channel so mutations are atomic and observers can await changes.
#[derive(Debug, Clone)]
pub struct SessionContext {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionContext {
    /// Create a context in the given state with no pairing code
    pub fn new(state: SessionState) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot {
            state,
            pairing_code: String::new(),
            updated_at: Utc::now(),
        });
        Self { tx: Arc::new(tx) }
    }

    /// Create a context for a device with or without persisted credentials
    pub fn for_device(has_credentials: bool) -> Self {
        Self::new(SessionState::initial(has_credentials))
    }

    /// Current connection state
    pub fn current_state(&self) -> SessionState {
        self.tx.borrow().state
    }

    /// Latest pairing code, empty if none is active
    pub fn latest_code(&self) -> String {
        self.tx.borrow().pairing_code.clone()
    }

    /// Whether the session is connected
    pub fn is_connected(&self) -> bool {
        self.current_state() == SessionState::Connected
    }

    /// State and pairing code read together
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Observe changes to the session
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Apply a session event to the state machine
    ///
    /// Every event is accepted; repeated events are no-ops. Message events do
    /// not touch session state.
    pub fn on_session_event(&self, event: &SessionEvent) -> Transition {
        match event {
            SessionEvent::Connected => self.update(|snap| {
                snap.state = SessionState::Connected;
                snap.pairing_code.clear();
            }),
            SessionEvent::Disconnected { .. } => self.update(|snap| {
                snap.state = SessionState::Disconnected;
                snap.pairing_code.clear();
            }),
            SessionEvent::PairingCodeIssued { code } => self.update(|snap| {
                if snap.state == SessionState::Connected || code.is_empty() {
                    return;
                }
                snap.state = SessionState::AwaitingScan;
                snap.pairing_code.clone_from(code);
            }),
            SessionEvent::MessageReceived(_) => {
                let state = self.current_state();
                Transition {
                    from: state,
                    to: state,
                    code_changed: false,
                }
            }
        }
    }

    /// The pairing window closed without a scan
    pub fn pairing_expired(&self) -> Transition {
        self.update(|snap| {
            if snap.state == SessionState::Connected {
                return;
            }
            snap.state = SessionState::Disconnected;
            snap.pairing_code.clear();
        })
    }

    fn update(&self, apply: impl FnOnce(&mut SessionSnapshot)) -> Transition {
        let mut transition = Transition {
            from: SessionState::Unpaired,
            to: SessionState::Unpaired,
            code_changed: false,
        };
        self.tx.send_if_modified(|snap| {
            let before_state = snap.state;
            let before_code = snap.pairing_code.clone();
            apply(snap);

            let code_changed = snap.pairing_code != before_code;
            let modified = snap.state != before_state || code_changed;
            if modified {
                snap.updated_at = Utc::now();
            }
            debug_assert!(snap.pairing_code.is_empty() || snap.state.allows_pairing_code());

            transition = Transition {
                from: before_state,
                to: snap.state,
                code_changed,
            };
            modified
        });

        if transition.state_changed() {
            debug!("Session state {} -> {}", transition.from, transition.to);
        }
        transition
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(SessionState::Unpaired)
    }
}
