//! Error types for the protocol layer.

/// Errors that can occur while framing or serializing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame's message-type varint could not be parsed. Connection-fatal:
    /// the pump disconnects the peer that sent it.
    #[error("malformed frame: unparsable message-type varint")]
    MalformedFrame,

    /// Payload serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Payload deserialization failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
