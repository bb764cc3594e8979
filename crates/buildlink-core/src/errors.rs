//! Transport and protocol error types.

use thiserror::Error;

/// Failure of the underlying connection.
///
/// Every variant means the connection can no longer be used; the dispatch
/// loop treats all of them as a normal end of the session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection was closed, locally or by the peer.
    #[error("connection closed")]
    Closed,
    /// Socket-level I/O failure (reset, broken pipe, ...).
    #[error("connection I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// An outbound envelope could not be encoded.
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] ProtocolError),
}

impl TransportError {
    /// Whether the peer simply went away, as opposed to a local fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            Self::Encode(_) => false,
        }
    }
}

/// A frame that could not be turned into an envelope (or back).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON or does not match the envelope shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}
