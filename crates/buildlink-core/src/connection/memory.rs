//! In-process connection pair.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::{Connection, SerialCounter};
use crate::errors::TransportError;
use crate::protocol::Envelope;

/// One end of an in-memory link.
///
/// Envelopes are handed over as values, so no codec runs. Closing either
/// end makes the other end's `receive` return `Closed` once it has drained
/// what was already sent.
pub struct MemoryConnection {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    serials: SerialCounter,
    closed: CancellationToken,
    peer_closed: CancellationToken,
}

impl MemoryConnection {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a_closed = CancellationToken::new();
        let b_closed = CancellationToken::new();
        let a = Self {
            tx: a_tx,
            rx: Mutex::new(a_rx),
            serials: SerialCounter::new(),
            closed: a_closed.clone(),
            peer_closed: b_closed.clone(),
        };
        let b = Self {
            tx: b_tx,
            rx: Mutex::new(b_rx),
            serials: SerialCounter::new(),
            closed: b_closed,
            peer_closed: a_closed,
        };
        (a, b)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.tx.send(envelope).map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> Result<Envelope, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(TransportError::Closed),
            received = rx.recv() => received.ok_or(TransportError::Closed),
            () = self.peer_closed.cancelled() => Err(TransportError::Closed),
        }
    }

    fn next_serial(&self) -> u64 {
        self.serials.next()
    }

    async fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.peer_closed.is_cancelled()
    }
}
