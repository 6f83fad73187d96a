//! End-to-end tests: a real server, real client connections, and traffic
//! routed through a room.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth::prelude::*;
use hearth::connect;
use tokio::sync::mpsc;
use tokio::time::timeout;

// =========================================================================
// Server-side application types
// =========================================================================

/// Echoes every packet straight back on its own connection.
struct EchoUser {
    base: UserBase,
}

#[async_trait]
impl User for EchoUser {
    fn base(&self) -> &UserBase {
        &self.base
    }

    async fn handle_packet(&mut self, msg_type: MessageType, payload: &[u8]) {
        self.base.send_raw(msg_type, payload).await;
    }
}

/// Joins a fixed room on connect and relays every packet into it.
struct ArenaUser {
    base: UserBase,
    lobby: Arc<Lobby<RelayRoom>>,
    room: RoomId,
}

#[async_trait]
impl User for ArenaUser {
    fn base(&self) -> &UserBase {
        &self.base
    }

    async fn on_connect(&mut self) {
        let _ = self.lobby.join_room(self.room, self.base.clone()).await;
    }

    async fn on_disconnect(&mut self, _error: Option<TransportError>) {
        let _ = self.lobby.leave_room(self.room, &self.base).await;
    }

    async fn handle_packet(&mut self, msg_type: MessageType, payload: &[u8]) {
        if let Some(front) = self.lobby.room(self.room).await {
            let _ = front
                .push_message(self.base.clone(), msg_type, payload.to_vec())
                .await;
        }
    }
}

/// Broadcasts every message to all members.
struct RelayRoom {
    base: RoomBase,
}

#[async_trait]
impl Room for RelayRoom {
    fn base(&self) -> &RoomBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut RoomBase {
        &mut self.base
    }

    async fn handle_message(&mut self, _user: UserBase, msg_type: MessageType, payload: Vec<u8>) {
        let text = String::from_utf8_lossy(&payload).into_owned();
        self.base().broadcast(msg_type, &text).await;
    }
}

// =========================================================================
// Client-side application type
// =========================================================================

/// Forwards every received packet to the test.
struct ClientUser {
    base: UserBase,
    inbox: mpsc::UnboundedSender<(MessageType, Vec<u8>)>,
}

#[async_trait]
impl User for ClientUser {
    fn base(&self) -> &UserBase {
        &self.base
    }

    async fn handle_packet(&mut self, msg_type: MessageType, payload: &[u8]) {
        let _ = self.inbox.send((msg_type, payload.to_vec()));
    }
}

// =========================================================================
// Helpers
// =========================================================================

async fn connect_client(
    url: &str,
) -> (
    UserBase,
    mpsc::UnboundedReceiver<(MessageType, Vec<u8>)>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let base = connect(url, PumpConfig::default(), |pump| ClientUser {
        base: UserBase::new(pump),
        inbox: tx,
    })
    .await
    .expect("client connect");
    (base, rx)
}

async fn wait_for_member_count(lobby: &Lobby<RelayRoom>, id: RoomId, want: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if lobby.member_count(id).await.ok() == Some(want) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "room {id} never reached {want} members"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn echo_round_trip_through_a_running_server() {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let server = server.route("/echo", |pump| EchoUser {
        base: UserBase::new(pump),
    });
    tokio::spawn(server.run());

    let (user, mut inbox) = connect_client(&format!("ws://{addr}/echo")).await;

    user.send_raw(MessageType(9), b"ping").await;

    let (msg_type, payload) = timeout(Duration::from_secs(2), inbox.recv())
        .await
        .expect("echo should arrive")
        .expect("inbox open");
    assert_eq!(msg_type, MessageType(9));
    assert_eq!(payload, b"ping");
}

#[tokio::test]
async fn unknown_upgrade_path_is_rejected() {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let server = server.route("/echo", |pump| EchoUser {
        base: UserBase::new(pump),
    });
    tokio::spawn(server.run());

    let result = connect(
        &format!("ws://{addr}/nope"),
        PumpConfig::default(),
        |pump| EchoUser {
            base: UserBase::new(pump),
        },
    )
    .await;
    assert!(matches!(result, Err(HearthError::Connect(_))));
}

#[tokio::test]
async fn messages_flow_through_a_room_to_every_member() {
    let room_id = RoomId(1);
    let lobby = Arc::new(Lobby::new());
    lobby
        .new_room(room_id, |id| RelayRoom {
            base: RoomBase::new(id, Duration::from_secs(3600)),
        })
        .await
        .unwrap();

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let route_lobby = Arc::clone(&lobby);
    let server = server.route("/arena", move |pump| ArenaUser {
        base: UserBase::new(pump),
        lobby: Arc::clone(&route_lobby),
        room: room_id,
    });
    tokio::spawn(server.run());

    let url = format!("ws://{addr}/arena");
    let (alice, mut alice_inbox) = connect_client(&url).await;
    let (_bob, mut bob_inbox) = connect_client(&url).await;
    wait_for_member_count(&lobby, room_id, 2).await;

    alice.send_raw(MessageType(5), b"hello rooms").await;

    for inbox in [&mut alice_inbox, &mut bob_inbox] {
        let (msg_type, payload) = timeout(Duration::from_secs(2), inbox.recv())
            .await
            .expect("broadcast should arrive")
            .expect("inbox open");
        assert_eq!(msg_type, MessageType(5));
        let text: String = serde_json::from_slice(&payload).unwrap();
        assert_eq!(text, "hello rooms");
    }

    // Disconnecting a client walks it back out of the room.
    alice.disconnect().await;
    wait_for_member_count(&lobby, room_id, 1).await;
}
