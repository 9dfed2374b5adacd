//! Pairing code stream consumer
//!
//! During first-time authentication the client library produces a sequence of
//! rotating pairing codes. Only the newest code is useful: an older one may
//! already have expired on the protocol side. The consumer publishes each
//! rotation into the [`SessionContext`] and stops for good once the session
//! is connected, even if the upstream stream stays open.

use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::session::{SessionContext, SessionState};
use crate::traits::{PairingItem, PairingStream, SessionEvent};

/// Result of one consumption step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStep {
    /// A new code replaced the previous one
    Rotated { rotation: usize },
    /// The device was paired (or the session is already connected)
    Paired,
    /// The pairing window closed without a scan
    TimedOut,
    /// The upstream stream ended
    Closed,
}

impl PairingStep {
    /// Whether consumption has ended
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PairingStep::Rotated { .. })
    }
}

/// Consumer of the rotating pairing-code stream
pub struct PairingCodeConsumer {
    codes: PairingStream,
    ctx: SessionContext,
    rotations: usize,
    finished: bool,
}

impl PairingCodeConsumer {
    /// Create a consumer publishing into `ctx`
    pub fn new(codes: PairingStream, ctx: SessionContext) -> Self {
        Self {
            codes,
            ctx,
            rotations: 0,
            finished: false,
        }
    }

    /// Latest published code, empty if none is active
    pub fn latest_code(&self) -> String {
        self.ctx.latest_code()
    }

    /// Number of codes published so far
    pub fn rotations(&self) -> usize {
        self.rotations
    }

    /// Whether the consumer has stopped
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for the next pairing item and apply it
    ///
    /// Once a terminal step has been returned, every later call returns
    /// [`PairingStep::Closed`] without polling the upstream stream.
    pub async fn step(&mut self) -> PairingStep {
        if self.finished {
            return PairingStep::Closed;
        }

        if self.ctx.current_state() == SessionState::Connected {
            return self.finish(PairingStep::Paired);
        }

        match self.codes.next().await {
            Some(PairingItem::Code(code)) => {
                let transition = self
                    .ctx
                    .on_session_event(&SessionEvent::PairingCodeIssued { code });

                if transition.to == SessionState::Connected {
                    // Connected while we were waiting; the code was not applied.
                    return self.finish(PairingStep::Paired);
                }

                self.rotations += 1;
                info!(
                    "Pairing code #{} issued, scan it via GET /qr",
                    self.rotations
                );
                PairingStep::Rotated {
                    rotation: self.rotations,
                }
            }
            Some(PairingItem::Success) => {
                info!("Pairing completed after {} code(s)", self.rotations);
                self.finish(PairingStep::Paired)
            }
            Some(PairingItem::Timeout) => {
                warn!("Pairing timed out without a scan");
                self.ctx.pairing_expired();
                self.finish(PairingStep::TimedOut)
            }
            None => {
                // No further rotation can arrive, so the last code is dead.
                debug!("Pairing code stream closed");
                self.ctx.pairing_expired();
                self.finish(PairingStep::Closed)
            }
        }
    }

    fn finish(&mut self, step: PairingStep) -> PairingStep {
        self.finished = true;
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn consumer(ctx: &SessionContext) -> (PairingCodeConsumer, mpsc::UnboundedSender<PairingItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream: PairingStream = Box::pin(UnboundedReceiverStream::new(rx));
        (PairingCodeConsumer::new(stream, ctx.clone()), tx)
    }

    #[tokio::test]
    async fn keeps_only_latest_code() {
        let ctx = SessionContext::default();
        let (mut consumer, tx) = consumer(&ctx);

        tx.send(PairingItem::Code("one".into())).unwrap();
        tx.send(PairingItem::Code("two".into())).unwrap();

        assert_eq!(consumer.step().await, PairingStep::Rotated { rotation: 1 });
        assert_eq!(consumer.step().await, PairingStep::Rotated { rotation: 2 });
        assert_eq!(consumer.latest_code(), "two");
        assert_eq!(ctx.current_state(), SessionState::AwaitingScan);
    }

    #[tokio::test]
    async fn stops_once_connected_even_if_stream_stays_open() {
        let ctx = SessionContext::default();
        let (mut consumer, tx) = consumer(&ctx);

        tx.send(PairingItem::Code("one".into())).unwrap();
        consumer.step().await;

        ctx.on_session_event(&SessionEvent::Connected);
        tx.send(PairingItem::Code("late".into())).unwrap();

        assert_eq!(consumer.step().await, PairingStep::Paired);
        assert!(consumer.is_finished());
        assert_eq!(consumer.step().await, PairingStep::Closed);
        assert!(ctx.latest_code().is_empty());
    }

    #[tokio::test]
    async fn timeout_clears_code() {
        let ctx = SessionContext::default();
        let (mut consumer, tx) = consumer(&ctx);

        tx.send(PairingItem::Code("one".into())).unwrap();
        tx.send(PairingItem::Timeout).unwrap();

        consumer.step().await;
        assert_eq!(consumer.step().await, PairingStep::TimedOut);
        assert!(ctx.latest_code().is_empty());
        assert_eq!(ctx.current_state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn closed_stream_is_terminal() {
        let ctx = SessionContext::default();
        let (mut consumer, tx) = consumer(&ctx);
        drop(tx);

        let step = consumer.step().await;
        assert_eq!(step, PairingStep::Closed);
        assert!(step.is_terminal());
    }

    #[tokio::test]
    async fn closed_stream_withdraws_last_code() {
        let ctx = SessionContext::default();
        let (mut consumer, tx) = consumer(&ctx);

        tx.send(PairingItem::Code("dead".into())).unwrap();
        assert_eq!(consumer.step().await, PairingStep::Rotated { rotation: 1 });
        drop(tx);

        assert_eq!(consumer.step().await, PairingStep::Closed);
        assert!(ctx.latest_code().is_empty());
        assert_eq!(ctx.current_state(), SessionState::Disconnected);
    }
}
