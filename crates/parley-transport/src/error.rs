//! Transport errors.

use parley_core::{EmitError, SessionId};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The session's outbound queue is closed.
    #[error("Connection closed: {0}")]
    ConnectionClosed(SessionId),

    /// The session's outbound queue is full; the event was dropped.
    #[error("Outbound queue full: {0}")]
    QueueFull(SessionId),

    /// Failed to write to the socket.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] parley_protocol::ProtocolError),
}

impl From<TransportError> for EmitError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed(session) => EmitError::SessionClosed(session),
            other => EmitError::Failed(other.to_string()),
        }
    }
}
