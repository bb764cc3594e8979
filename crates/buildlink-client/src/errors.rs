//! Client error types.

use buildlink_core::TransportError;
use thiserror::Error;

/// Why a request did not produce a value.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The connection closed before a reply arrived.
    #[error("connection closed")]
    ConnectionClosed,
    /// The transport failed while sending or dialing.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The server answered with an error response.
    #[error("server error: {message}")]
    Server {
        /// Server-provided description.
        message: String,
    },
    /// No reply arrived within the configured request timeout.
    #[error("no reply within {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
}

impl From<TransportError> for ClientError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Closed => Self::ConnectionClosed,
            other => Self::Transport(other.to_string()),
        }
    }
}
