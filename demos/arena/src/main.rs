//! Chat arena: a single shared room every connection joins.
//!
//! Connect with any websocket client on `ws://127.0.0.1:8080/arena` and
//! send frames of type 1 carrying a UTF-8 line. Lines are relayed to every
//! other member; the room ticks a presence summary to everyone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth::prelude::*;
use serde::Serialize;

/// A chat line, relayed to the other members.
const MSG_CHAT: MessageType = MessageType(1);
/// Periodic presence summary, sent to everyone.
const MSG_PRESENCE: MessageType = MessageType(2);

/// The one shared room.
const ARENA: RoomId = RoomId(1);
const ARENA_TICK: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct Presence {
    members: usize,
    owner: Option<UserId>,
}

struct ChatRoom {
    base: RoomBase,
}

#[async_trait]
impl Room for ChatRoom {
    fn base(&self) -> &RoomBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut RoomBase {
        &mut self.base
    }

    async fn tick(&mut self) {
        let presence = Presence {
            members: self.base.user_count(),
            owner: self.base.owner(),
        };
        self.base.broadcast(MSG_PRESENCE, &presence).await;
    }

    async fn handle_message(&mut self, user: UserBase, msg_type: MessageType, payload: Vec<u8>) {
        if msg_type != MSG_CHAT {
            tracing::debug!(user = %user.id(), %msg_type, "ignoring unknown message type");
            return;
        }
        let line = String::from_utf8_lossy(&payload).into_owned();
        tracing::info!(user = %user.id(), %line, "chat");
        self.base.broadcast_excluded(MSG_CHAT, &line, user.id()).await;
    }
}

struct ArenaUser {
    base: UserBase,
    lobby: Arc<Lobby<ChatRoom>>,
}

#[async_trait]
impl User for ArenaUser {
    fn base(&self) -> &UserBase {
        &self.base
    }

    async fn on_connect(&mut self) {
        tracing::info!(user = %self.base.id(), "connected");
        join_arena(&self.lobby, &self.base).await;
    }

    async fn on_disconnect(&mut self, error: Option<TransportError>) {
        match error {
            Some(e) => tracing::info!(user = %self.base.id(), error = %e, "disconnected"),
            None => tracing::info!(user = %self.base.id(), "disconnected"),
        }
        let _ = self.lobby.leave_room(ARENA, &self.base).await;
    }

    async fn handle_packet(&mut self, msg_type: MessageType, payload: &[u8]) {
        if let Some(front) = self.lobby.room(ARENA).await {
            let _ = front
                .push_message(self.base.clone(), msg_type, payload.to_vec())
                .await;
        }
    }
}

/// Joins the arena, recreating it if the previous incarnation emptied out
/// and destroyed itself. A lost creation race just means another
/// connection recreated it first.
async fn join_arena(lobby: &Lobby<ChatRoom>, user: &UserBase) {
    loop {
        match lobby.join_room(ARENA, user.clone()).await {
            Ok(()) => return,
            Err(RoomError::NotFound(_)) => {
                let _ = lobby
                    .new_room(ARENA, |id| ChatRoom {
                        base: RoomBase::new(id, ARENA_TICK),
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(user = %user.id(), error = %e, "arena join failed");
                user.disconnect().await;
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), HearthError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let lobby = Arc::new(Lobby::new());
    lobby
        .new_room(ARENA, |id| ChatRoom {
            base: RoomBase::new(id, ARENA_TICK),
        })
        .await?;

    let server = Server::bind(&addr).await?.route("/arena", move |pump| ArenaUser {
        base: UserBase::new(pump),
        lobby: Arc::clone(&lobby),
    });

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
