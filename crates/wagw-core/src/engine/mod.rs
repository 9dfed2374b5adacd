//! Gateway engine
//!
//! The GatewayEngine is the single event-processing loop of the gateway:
//! - Feeds client session events into the [`SessionContext`]
//! - Drains the pairing-code stream while the device is unpaired
//! - Routes inbound messages through the [`InboundNormalizer`]
//! - Reconnects after transient disconnects
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   SessionEvent    ┌───────────────┐
//! │ WhatsAppClient │──────────────────▶│ GatewayEngine │──▶ GatewayEvent
//! └────────────────┘   PairingItem     └───────────────┘      (monitoring)
//!                                        │          │
//!                                        ▼          ▼
//!                              ┌────────────────┐ ┌───────────────────┐
//!                              │ SessionContext │ │ InboundNormalizer │
//!                              │ (state + code) │ │  ──▶ webhook      │
//!                              └────────────────┘ └───────────────────┘
//!                                        ▲
//!                                        │ read
//!                              HTTP handlers / SendGateway
//! ```
//!
//! Events are processed one at a time in arrival order. Nothing in the loop
//! waits on the webhook.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::inbound::{InboundNormalizer, InboundOutcome};
use crate::pairing::{PairingCodeConsumer, PairingStep};
use crate::session::{SessionContext, SessionState};
use crate::traits::{DeviceStore, DisconnectReason, SessionEvent, WhatsAppClient};
use crate::webhook::WebhookDispatcher;

/// Events emitted by the GatewayEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Engine started
    Started {
        /// Whether persisted credentials were found
        paired: bool,
    },

    /// Session state changed
    StateChanged {
        from: SessionState,
        to: SessionState,
    },

    /// A new pairing code is live
    PairingCodeRotated { rotation: usize },

    /// Pairing-code consumption ended
    PairingEnded { step: PairingStep },

    /// Inbound message queued for the webhook
    InboundForwarded { message_id: String },

    /// Inbound message filtered out
    InboundSkipped {
        message_id: String,
        outcome: InboundOutcome,
    },

    /// Inbound message dropped (webhook queue saturated)
    InboundDropped { message_id: String },

    /// Reconnect attempt scheduled after a transient disconnect
    ReconnectScheduled { attempt: u32, delay: Duration },

    /// Engine stopped
    Stopped { reason: String },
}

/// Core gateway engine
///
/// ## Lifecycle
///
/// 1. Create with [`GatewayEngine::new()`]
/// 2. Hand [`GatewayEngine::context()`] to the HTTP layer
/// 3. Start with [`GatewayEngine::run()`]
/// 4. The engine runs until a shutdown signal or the client's event stream ends
pub struct GatewayEngine {
    /// Protocol client
    client: Arc<dyn WhatsAppClient>,

    /// Shared session state
    ctx: SessionContext,

    /// Inbound routing
    normalizer: InboundNormalizer,

    /// Whether credentials existed at startup
    paired: bool,

    /// Reconnect after transient disconnects
    reconnect: bool,

    /// Delay before each reconnect attempt
    reconnect_delay: Duration,

    /// Upper bound on one reconnect attempt
    connect_timeout: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<GatewayEvent>,
}

impl GatewayEngine {
    /// Create a new gateway engine
    ///
    /// Loads the device from `store` to decide the initial session state.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub async fn new(
        client: Arc<dyn WhatsAppClient>,
        store: &dyn DeviceStore,
        dispatcher: WebhookDispatcher,
        config: &GatewayConfig,
    ) -> Result<(Self, mpsc::Receiver<GatewayEvent>)> {
        config.validate()?;

        let device = store.get_or_create_device().await?;
        let paired = device.is_paired();
        let ctx = SessionContext::for_device(paired);

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            client,
            ctx,
            normalizer: InboundNormalizer::new(dispatcher),
            paired,
            reconnect: config.session.reconnect,
            reconnect_delay: config.session.reconnect_delay(),
            connect_timeout: config.session.connect_timeout(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Shared session context (for the HTTP layer and the send gateway)
    pub fn context(&self) -> SessionContext {
        self.ctx.clone()
    }

    /// Whether credentials existed at startup
    pub fn is_paired(&self) -> bool {
        self.paired
    }

    /// Run the engine until SIGINT
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires
    ///
    /// `None` falls back to waiting for SIGINT, like [`run()`](Self::run).
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(GatewayEvent::Started {
            paired: self.paired,
        });
        info!(
            "Starting gateway engine with client {} ({})",
            self.client.client_name(),
            if self.paired { "paired" } else { "unpaired" }
        );

        // Both streams must be taken before connecting.
        let mut events = self.client.events();
        let mut pairing = if self.paired {
            None
        } else {
            let codes = self.client.pairing_codes();
            if codes.is_none() {
                warn!("Device is unpaired but the client offers no pairing codes");
            }
            codes.map(|codes| PairingCodeConsumer::new(codes, self.ctx.clone()))
        };

        self.client.connect().await?;

        let mut reconnect: Option<Pin<Box<Sleep>>> = None;
        let mut reconnect_attempts: u32 = 0;

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                event = events.next() => {
                    let Some(event) = event else {
                        warn!("Client event stream ended");
                        break "Event stream closed";
                    };
                    self.handle_session_event(event, &mut pairing, &mut reconnect, &mut reconnect_attempts);
                }

                step = async {
                    match pairing.as_mut() {
                        Some(consumer) => consumer.step().await,
                        None => std::future::pending().await,
                    }
                }, if pairing.is_some() => {
                    self.handle_pairing_step(step, &mut pairing);
                }

                () = async {
                    match reconnect.as_mut() {
                        Some(sleep) => sleep.await,
                        None => std::future::pending().await,
                    }
                }, if reconnect.is_some() => {
                    reconnect = None;
                    info!("Reconnecting (attempt {})", reconnect_attempts);
                    match tokio::time::timeout(self.connect_timeout, self.client.connect()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!("Reconnect attempt {} failed: {}", reconnect_attempts, e);
                            reconnect = self.schedule_reconnect(&mut reconnect_attempts);
                        }
                        Err(_) => {
                            error!(
                                "Reconnect attempt {} timed out after {:?}",
                                reconnect_attempts, self.connect_timeout
                            );
                            reconnect = self.schedule_reconnect(&mut reconnect_attempts);
                        }
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break "Shutdown signal";
                }
            }
        };

        drop(pairing);
        self.client.disconnect().await;
        self.emit_event(GatewayEvent::Stopped {
            reason: reason.to_string(),
        });
        info!("Gateway engine stopped: {}", reason);

        Ok(())
    }

    fn handle_session_event(
        &self,
        event: SessionEvent,
        pairing: &mut Option<PairingCodeConsumer>,
        reconnect: &mut Option<Pin<Box<Sleep>>>,
        reconnect_attempts: &mut u32,
    ) {
        let raw = match event {
            SessionEvent::MessageReceived(raw) => raw,
            other => {
                let transition = self.ctx.on_session_event(&other);
                if transition.state_changed() {
                    self.emit_event(GatewayEvent::StateChanged {
                        from: transition.from,
                        to: transition.to,
                    });
                }

                match other {
                    SessionEvent::Connected => {
                        info!("Connected to WhatsApp");
                        if pairing.take().is_some() {
                            self.emit_event(GatewayEvent::PairingEnded {
                                step: PairingStep::Paired,
                            });
                        }
                        *reconnect = None;
                        *reconnect_attempts = 0;
                    }
                    SessionEvent::Disconnected {
                        reason: DisconnectReason::Transient,
                    } => {
                        warn!("Disconnected from WhatsApp");
                        if self.reconnect && reconnect.is_none() {
                            *reconnect = self.schedule_reconnect(reconnect_attempts);
                        }
                    }
                    SessionEvent::Disconnected {
                        reason: DisconnectReason::LoggedOut,
                    } => {
                        warn!("Logged out from WhatsApp; the device must be paired again");
                        *reconnect = None;
                    }
                    SessionEvent::PairingCodeIssued { .. } => {
                        debug!("Pairing code issued on the event stream");
                    }
                    SessionEvent::MessageReceived(_) => {}
                }
                return;
            }
        };

        let message_id = raw.id.clone();
        let event = match self.normalizer.on_message_event(raw) {
            InboundOutcome::Forwarded => GatewayEvent::InboundForwarded { message_id },
            InboundOutcome::Dropped => GatewayEvent::InboundDropped { message_id },
            outcome => GatewayEvent::InboundSkipped {
                message_id,
                outcome,
            },
        };
        self.emit_event(event);
    }

    fn handle_pairing_step(&self, step: PairingStep, pairing: &mut Option<PairingCodeConsumer>) {
        match step {
            PairingStep::Rotated { rotation } => {
                self.emit_event(GatewayEvent::PairingCodeRotated { rotation });
            }
            terminal => {
                debug!("Pairing consumer finished: {:?}", terminal);
                *pairing = None;
                self.emit_event(GatewayEvent::PairingEnded { step: terminal });
            }
        }
    }

    fn schedule_reconnect(&self, attempts: &mut u32) -> Option<Pin<Box<Sleep>>> {
        if !self.reconnect {
            return None;
        }
        *attempts += 1;
        info!(
            "Reconnect attempt {} scheduled in {:?}",
            attempts, self.reconnect_delay
        );
        self.emit_event(GatewayEvent::ReconnectScheduled {
            attempt: *attempts,
            delay: self.reconnect_delay,
        });
        Some(Box::pin(tokio::time::sleep(self.reconnect_delay)))
    }

    fn emit_event(&self, event: GatewayEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver dropped");
            }
        }
    }
}

impl std::fmt::Debug for GatewayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayEngine")
            .field("client", &self.client.client_name())
            .field("paired", &self.paired)
            .field("reconnect", &self.reconnect)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_pairing_steps() {
        assert!(!PairingStep::Rotated { rotation: 1 }.is_terminal());
        assert!(PairingStep::Paired.is_terminal());
        assert!(PairingStep::TimedOut.is_terminal());
        assert!(PairingStep::Closed.is_terminal());
    }

    #[test]
    fn events_compare_by_value() {
        let event = GatewayEvent::StateChanged {
            from: SessionState::Unpaired,
            to: SessionState::AwaitingScan,
        };
        assert_eq!(event.clone(), event);
        assert_ne!(
            event,
            GatewayEvent::Stopped {
                reason: "Shutdown signal".to_string()
            }
        );
    }
}
