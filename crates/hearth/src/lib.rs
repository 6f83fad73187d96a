//! # Hearth
//!
//! A room-based realtime multiplayer server framework.
//!
//! Clients connect over websockets and are paired with an
//! application-defined [`User`](hearth_transport::User). Users are grouped
//! into [`Room`](hearth_room::Room) actors — one task per room, all state
//! owned by that task — and rooms are created, joined, and destroyed
//! through the [`Lobby`](hearth_room::Lobby). Each connection runs a
//! duplex message pump with keepalive and backpressure.
//!
//! The application supplies the two capability sets:
//!
//! - a `User` per listening path, built by the constructor passed to
//!   [`Server::route`] — handles its connection's packets;
//! - a `Room` type per lobby — reacts to joins, leaves, messages, and
//!   ticks.
//!
//! Everything else (framing, pumping, keepalive, actor scheduling, room
//! lifecycle) is the framework's job.

mod error;
mod server;

pub use error::HearthError;
pub use server::{Server, connect};

/// One-stop imports for applications embedding Hearth.
pub mod prelude {
    pub use hearth_protocol::{Codec, JsonCodec, MessageType, ProtocolError, RoomId, UserId};
    pub use hearth_room::{Action, Lobby, Room, RoomBase, RoomError, RoomFront};
    pub use hearth_transport::{MessagePump, PumpConfig, TransportError, User, UserBase};

    pub use crate::{HearthError, Server, connect};
}
