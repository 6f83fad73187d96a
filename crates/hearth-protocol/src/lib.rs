//! Wire protocol for Hearth.
//!
//! This crate defines what travels on the wire and how:
//!
//! - **Frame layout** ([`frame`]) — a varint message-type prefix followed by
//!   raw payload bytes, one frame per transport message.
//! - **Payload codec** ([`Codec`], [`JsonCodec`]) — how payload bytes map to
//!   application types.
//! - **Identifiers** ([`MessageType`], [`RoomId`], [`UserId`]) — shared by
//!   every layer above.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about connections or rooms; it only
//! turns values into bytes and back.

mod codec;
mod error;
pub mod frame;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{decode_frame, encode_frame};
pub use types::{MessageType, RoomId, UserId};
