//! Sequence-numbered event emission.

use protocol::{EventKind, StreamEvent};
use tokio::sync::mpsc;

/// The receiver side dropped: the client disconnected and the turn must be
/// cancelled.
#[derive(Debug)]
pub(crate) struct ClientGone;

/// Emits stream events with a strictly monotonic sequence number shared
/// across all turns of one stream. The disabled emitter (non-streaming path)
/// swallows everything.
pub(crate) enum Emitter {
    Disabled,
    Channel { tx: mpsc::Sender<StreamEvent>, next: u64 },
}

impl Emitter {
    pub fn disabled() -> Self {
        Emitter::Disabled
    }

    pub fn channel(tx: mpsc::Sender<StreamEvent>) -> Self {
        Emitter::Channel { tx, next: 0 }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Emitter::Channel { .. })
    }

    /// Emit one event. Blocks when the channel is full, which is the
    /// backpressure path: a slow consumer slows the loop down.
    pub async fn emit(&mut self, kind: EventKind) -> Result<(), ClientGone> {
        match self {
            Emitter::Disabled => Ok(()),
            Emitter::Channel { tx, next } => {
                let event = StreamEvent::new(*next, kind);
                *next += 1;

                tx.send(event).await.map_err(|_| ClientGone)
            }
        }
    }
}
