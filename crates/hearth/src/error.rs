//! Unified error type for the Hearth framework.

use hearth_protocol::ProtocolError;
use hearth_room::RoomError;
use hearth_transport::TransportError;

/// Top-level error that wraps all crate-specific errors, so users of the
/// `hearth` meta-crate deal with a single type.
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    /// A transport-level error (pump, socket, deadlines).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, payload codec).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (lobby lookups, dead actors).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Binding the listener failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// The websocket upgrade failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// Dialing a remote server failed.
    #[error("connect failed: {0}")]
    Connect(String),
}
