//! The connection capability consumed by the client engine.
//!
//! A [`Connection`] moves whole [`Envelope`]s. Framing and encoding are the
//! implementation's business; [`MemoryConnection`] skips them entirely and
//! [`LineConnection`] uses newline-delimited JSON over TCP.

mod lines;
mod memory;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::protocol::Envelope;

pub use lines::LineConnection;
pub use memory::MemoryConnection;

/// A bidirectional, message-framed link to the server.
///
/// `send` may be called from several tasks at once; each call writes one
/// whole frame. `receive` is only ever called by one task at a time.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Write one envelope.
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Read the next envelope. Returns [`TransportError::Closed`] at end of
    /// stream and after [`Connection::close`].
    async fn receive(&self) -> Result<Envelope, TransportError>;

    /// Reserve the serial for the next outbound message.
    fn next_serial(&self) -> u64;

    /// Close the link. Idempotent; a blocked `receive` returns promptly.
    async fn close(&self);

    /// Whether `close` was called or the peer went away.
    fn is_closed(&self) -> bool;
}

/// Strictly increasing serial source, starting at 1.
#[derive(Debug)]
pub struct SerialCounter(AtomicU64);

impl SerialCounter {
    /// New counter.
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Take the next serial.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SerialCounter {
    fn default() -> Self {
        Self::new()
    }
}
