//! The lobby: the registry of live rooms.
//!
//! Maps room ids to fronts plus a lobby-local member count, all under one
//! lock. The count is deliberately independent of the actor's own member
//! set — it exists only to decide destruction, so it is kept in lock-step
//! with every successful join and leave here, synchronously, while the
//! actor applies the matching events asynchronously.
//!
//! Room volume is expected to be small enough that the single lock is not
//! a bottleneck.

use std::collections::HashMap;

use hearth_protocol::RoomId;
use hearth_transport::UserBase;
use tokio::sync::RwLock;

use crate::actor::spawn_room;
use crate::{Room, RoomError, RoomFront};

struct RoomEntry<R: Room> {
    front: RoomFront<R>,
    user_count: usize,
}

/// Registry of live rooms of one application room type.
///
/// Explicitly constructed and owned by the embedding server — there is no
/// process-global lobby.
pub struct Lobby<R: Room> {
    rooms: RwLock<HashMap<RoomId, RoomEntry<R>>>,
}

impl<R: Room> Lobby<R> {
    /// Creates an empty lobby.
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a room and starts its actor.
    ///
    /// # Errors
    /// Returns [`RoomError::Duplicate`] if `id` is already registered; the
    /// existing room is left untouched and no actor is started.
    pub async fn new_room<F>(&self, id: RoomId, constructor: F) -> Result<RoomFront<R>, RoomError>
    where
        F: FnOnce(RoomId) -> R,
    {
        let mut rooms = self.rooms.write().await;

        if rooms.contains_key(&id) {
            tracing::warn!(room = %id, "attempted to create an existing room");
            return Err(RoomError::Duplicate(id));
        }

        let front = spawn_room(constructor(id));
        rooms.insert(
            id,
            RoomEntry {
                front: front.clone(),
                user_count: 0,
            },
        );
        tracing::info!(room = %id, "room created");
        Ok(front)
    }

    /// Adds a user to a room: bumps the member count and forwards the join
    /// to the room's actor.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] for an unregistered id, or
    /// [`RoomError::Unavailable`] if the actor is gone — in which case the
    /// count bump is rolled back.
    pub async fn join_room(&self, id: RoomId, user: UserBase) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&id).ok_or(RoomError::NotFound(id))?;

        entry.user_count += 1;
        if let Err(e) = entry.front.add_user(user).await {
            entry.user_count -= 1;
            return Err(e);
        }
        Ok(())
    }

    /// Removes a user from a room, destroying the room if it emptied.
    ///
    /// The registry entry is removed before the actor finishes tearing
    /// down, so no further join can target the room; the actor drains and
    /// exits on its own time.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] for an unregistered id.
    pub async fn leave_room(&self, id: RoomId, user: &UserBase) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&id).ok_or(RoomError::NotFound(id))?;

        entry.user_count = entry.user_count.saturating_sub(1);
        let empty = entry.user_count == 0;
        let front = entry.front.clone();

        let forwarded = front.remove_user(user.clone()).await;

        if empty {
            rooms.remove(&id);
            tracing::info!(room = %id, "room emptied; destroying");
            let _ = front.queue_action(|room| room.base_mut().destroy()).await;
        }

        forwarded
    }

    /// Looks up a room's front.
    pub async fn room(&self, id: RoomId) -> Option<RoomFront<R>> {
        self.rooms.read().await.get(&id).map(|entry| entry.front.clone())
    }

    /// The lobby's member count for a room.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] for an unregistered id.
    pub async fn member_count(&self, id: RoomId) -> Result<usize, RoomError> {
        self.rooms
            .read()
            .await
            .get(&id)
            .map(|entry| entry.user_count)
            .ok_or(RoomError::NotFound(id))
    }

    /// Number of registered rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl<R: Room> Default for Lobby<R> {
    fn default() -> Self {
        Self::new()
    }
}
