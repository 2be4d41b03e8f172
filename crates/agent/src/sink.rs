//! Output side of a run.

use tokio::sync::mpsc;
use toolrelay_core::ConversationEvent;

/// The consumer of a run's events went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event stream closed by the consumer")]
pub struct SinkClosed;

/// Where a run emits its events, in order.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ConversationEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ConversationEvent>) -> Self {
        Self { tx }
    }

    /// A bounded sink and the receiver the transport drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ConversationEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    /// Emit one event, waiting while the consumer catches up.
    pub async fn emit(&self, event: ConversationEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn ensure_open(&self) -> Result<(), SinkClosed> {
        if self.is_closed() {
            Err(SinkClosed)
        } else {
            Ok(())
        }
    }

    /// Resolves once the consumer has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
