//! The room capability set and its embeddable base state.
//!
//! Application room types embed [`RoomBase`] by composition and implement
//! [`Room`] on top of it. All of a room's mutable state is touched only by
//! its own actor task; nothing here needs a lock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hearth_protocol::{Codec, JsonCodec, MessageType, RoomId, UserId};
use hearth_transport::UserBase;
use serde::Serialize;

/// Application callbacks for one room.
///
/// Every method runs on the room's actor task with exclusive access to the
/// room state. The defaults for `add_user`/`remove_user` keep the base
/// membership bookkeeping; overrides that want it must delegate down.
#[async_trait]
pub trait Room: Send + 'static {
    /// The embedded base state.
    fn base(&self) -> &RoomBase;

    /// Mutable access to the embedded base state.
    fn base_mut(&mut self) -> &mut RoomBase;

    /// Called on every tick of the room's cadence.
    async fn tick(&mut self) {}

    /// Called when a member joins.
    async fn add_user(&mut self, user: UserBase) {
        self.base_mut().add_user(user);
    }

    /// Called when a member leaves.
    async fn remove_user(&mut self, user: UserBase) {
        self.base_mut().remove_user(user.id());
    }

    /// Called for every application message pushed into the room.
    async fn handle_message(&mut self, user: UserBase, msg_type: MessageType, payload: Vec<u8>);

    /// Runs once when the actor exits, whatever the reason.
    fn cleanup(&mut self) {}
}

/// Membership, ownership, and cadence state common to every room.
#[derive(Debug)]
pub struct RoomBase {
    id: RoomId,
    users: HashMap<UserId, UserBase>,
    owner: Option<UserId>,
    tick_interval: Duration,
    destroying: bool,
}

impl RoomBase {
    /// Creates the base state for a room ticking at `tick_interval`.
    pub fn new(id: RoomId, tick_interval: Duration) -> Self {
        Self {
            id,
            users: HashMap::new(),
            owner: None,
            tick_interval,
            destroying: false,
        }
    }

    /// The room's id.
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// The current owner, if the room has members.
    ///
    /// Invariant: the owner is always a current member or `None`.
    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    /// Number of current members.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Looks up a member by id.
    pub fn user(&self, id: UserId) -> Option<&UserBase> {
        self.users.get(&id)
    }

    /// Iterates over the current members in no particular order.
    pub fn users(&self) -> impl Iterator<Item = &UserBase> {
        self.users.values()
    }

    /// The tick cadence this room was created with.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Whether teardown has been requested. The actor checks this once per
    /// iteration and exits when set.
    pub fn is_destroying(&self) -> bool {
        self.destroying
    }

    /// Marks the room for teardown.
    pub fn destroy(&mut self) {
        self.destroying = true;
    }

    /// Adds a member. The first member to join claims ownership.
    pub fn add_user(&mut self, user: UserBase) {
        if self.owner.is_none() {
            self.owner = Some(user.id());
        }
        self.users.insert(user.id(), user);
    }

    /// Removes a member.
    ///
    /// If the owner left, ownership moves to the remaining member with the
    /// lowest id (deterministic across runs). When the last member leaves
    /// the room marks itself for teardown.
    pub fn remove_user(&mut self, id: UserId) {
        self.users.remove(&id);

        if self.owner == Some(id) {
            if self.users.is_empty() {
                self.owner = None;
                self.destroying = true;
            } else {
                self.owner = self.users.keys().min().copied();
            }
        }
    }

    /// Serializes `payload` once and sends it to every member.
    ///
    /// Serialization failures are logged and dropped; per-member send
    /// failures mean that member's connection is already closing and its
    /// departure will arrive through the normal leave path.
    pub async fn broadcast<T: Serialize>(&self, msg_type: MessageType, payload: &T) {
        self.broadcast_filtered(msg_type, payload, None).await;
    }

    /// Like [`broadcast`](Self::broadcast), skipping one member.
    pub async fn broadcast_excluded<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: &T,
        excluded: UserId,
    ) {
        self.broadcast_filtered(msg_type, payload, Some(excluded)).await;
    }

    async fn broadcast_filtered<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: &T,
        excluded: Option<UserId>,
    ) {
        let bytes = match JsonCodec.encode(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(room = %self.id, error = %e, "broadcast payload failed to encode");
                return;
            }
        };

        for user in self.users.values() {
            if excluded == Some(user.id()) {
                continue;
            }
            user.send_raw(msg_type, &bytes).await;
        }
    }
}
