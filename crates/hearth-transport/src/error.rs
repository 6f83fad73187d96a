//! Error types for the transport layer.

use hearth_protocol::ProtocolError;

/// Errors that can occur on a connection. All of them are fatal to the
/// connection they occur on; none are retried.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No read activity (data or pong) within the idle deadline.
    #[error("read deadline exceeded")]
    ReadTimeout,

    /// A frame could not be written within the write deadline.
    #[error("write deadline exceeded")]
    WriteTimeout,

    /// The peer sent a frame larger than the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// Receiving from the socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Sending on the socket failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The peer sent bytes that do not parse as a frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
