//! Error types for the room layer.

use hearth_protocol::RoomId;

/// Errors that can occur during lobby and room-handle operations.
///
/// All of these are synchronous return values to the caller; faults inside
/// a running room never surface here (they terminate that room's actor).
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this id is registered.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// A room with this id already exists; the existing room is untouched.
    #[error("room {0} already exists")]
    Duplicate(RoomId),

    /// The room's actor is no longer servicing its queue.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
