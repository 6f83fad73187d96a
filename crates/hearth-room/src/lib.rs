//! Room lifecycle for Hearth.
//!
//! Each room runs as an isolated Tokio task (actor model) owning its own
//! member set, owner, and tick cadence. The outside world reaches a room
//! only through its [`RoomFront`], and rooms are created, joined, left,
//! and destroyed through the [`Lobby`].
//!
//! # Key types
//!
//! - [`Room`] — the capability set application room types implement
//! - [`RoomBase`] — membership/ownership state embedded by composition
//! - [`RoomFront`] — queue-send handle to a running actor
//! - [`Lobby`] — the registry coordinating room lifecycle

mod actor;
mod error;
mod lobby;
mod room;

pub use actor::{Action, RoomFront};
pub use error::RoomError;
pub use lobby::Lobby;
pub use room::{Room, RoomBase};
