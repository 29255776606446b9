//! Transport abstraction traits.
//!
//! The two halves of a realtime connection are used from different tasks, so
//! they are separate traits.

use async_trait::async_trait;
use chanrelay_protocol::Event;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session-start call failed.
    #[error("Session handshake failed: {0}")]
    Handshake(String),

    /// The websocket could not be opened.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] chanrelay_protocol::ProtocolError),
}

impl TransportError {
    /// Whether the connection is still usable after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Protocol(_) | TransportError::SendFailed(_)
        )
    }
}

/// The receiving half of a realtime connection.
#[async_trait]
pub trait EventSource: Send {
    /// Receive the next event.
    ///
    /// Returns `None` once the connection is closed.
    async fn recv(&mut self) -> Result<Option<Event>, TransportError>;
}

/// The sending half of a realtime connection.
#[async_trait]
pub trait EventSink: Send {
    /// Transmit one event.
    async fn send(&mut self, event: &Event) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        let decode = chanrelay_protocol::decode("{").unwrap_err();
        assert!(TransportError::Protocol(decode).is_recoverable());
        assert!(TransportError::SendFailed("broken pipe".into()).is_recoverable());
        assert!(!TransportError::ReceiveFailed("reset".into()).is_recoverable());
        assert!(!TransportError::ConnectionClosed.is_recoverable());
    }
}
