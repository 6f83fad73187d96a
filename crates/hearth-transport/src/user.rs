//! The user capability set and its embeddable base state.
//!
//! A [`User`] is the application-side object behind one connection. The
//! pump builds it through a constructor when the connection opens and
//! drives its hooks from the read loop. Application types embed
//! [`UserBase`] by composition and delegate [`User::base`] to it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hearth_protocol::{JsonCodec, Codec, MessageType, UserId};
use serde::Serialize;

use crate::{MessagePump, TransportError};

/// Application callbacks for one connection.
///
/// `handle_packet` runs synchronously on the connection's read loop: a slow
/// handler delays every following frame from that peer, so long work should
/// be pushed onto a room queue instead.
#[async_trait]
pub trait User: Send + 'static {
    /// The embedded base state.
    fn base(&self) -> &UserBase;

    /// Called once when the connection is established, before any packet is
    /// dispatched.
    async fn on_connect(&mut self) {}

    /// Called exactly once when the connection ends, whatever side failed.
    /// `error` is `None` for a clean peer close.
    async fn on_disconnect(&mut self, _error: Option<TransportError>) {}

    /// Called for every decoded frame received from the peer.
    async fn handle_packet(&mut self, msg_type: MessageType, payload: &[u8]);
}

#[async_trait]
impl User for Box<dyn User> {
    fn base(&self) -> &UserBase {
        (**self).base()
    }

    async fn on_connect(&mut self) {
        (**self).on_connect().await;
    }

    async fn on_disconnect(&mut self, error: Option<TransportError>) {
        (**self).on_disconnect(error).await;
    }

    async fn handle_packet(&mut self, msg_type: MessageType, payload: &[u8]) {
        (**self).handle_packet(msg_type, payload).await;
    }
}

/// Identity plus a reference to the connection's pump.
///
/// Cheap to clone; clones are what rooms hold as their member set, so a
/// room can reach a member's pump without owning the member's state.
#[derive(Clone)]
pub struct UserBase {
    id: UserId,
    pump: Arc<MessagePump>,
}

impl fmt::Debug for UserBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserBase").field("id", &self.id).finish_non_exhaustive()
    }
}

impl UserBase {
    /// Builds the base for a fresh connection, allocating a new [`UserId`].
    pub fn new(pump: Arc<MessagePump>) -> Self {
        Self {
            id: UserId::next(),
            pump,
        }
    }

    /// This user's identity.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Whether the underlying connection is still up.
    pub fn is_connected(&self) -> bool {
        self.pump.is_connected()
    }

    /// Serializes `payload` and schedules it on the outbound queue.
    ///
    /// A no-op once the connection has closed. While connected this blocks
    /// when the queue is full (backpressure) and never drops the message.
    ///
    /// # Errors
    /// Returns an error only when serialization fails.
    pub async fn send_message<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: &T,
    ) -> Result<(), TransportError> {
        let bytes = JsonCodec.encode(payload)?;
        self.pump.send(msg_type, &bytes).await;
        Ok(())
    }

    /// Schedules already-serialized payload bytes on the outbound queue.
    pub async fn send_raw(&self, msg_type: MessageType, payload: &[u8]) {
        self.pump.send(msg_type, payload).await;
    }

    /// Requests disconnection of this user's connection. Idempotent.
    pub async fn disconnect(&self) {
        self.pump.disconnect().await;
    }
}
