//! Integration tests for the room actor, front, and lobby.
//!
//! Uses a recorder room that reports everything its actor processes over a
//! channel, and real loopback websocket connections for the member
//! identities so broadcasts go over the wire.

use std::time::Duration;

use async_trait::async_trait;
use hearth_protocol::{MessageType, RoomId, UserId, decode_frame};
use hearth_room::{Lobby, Room, RoomBase, RoomError, RoomFront};
use hearth_transport::{MessagePump, PumpConfig, User, UserBase};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// =========================================================================
// Mock room: records everything its actor processes.
// =========================================================================

#[derive(Debug, PartialEq)]
enum Note {
    Joined(UserId),
    Left(UserId),
    Message(UserId, MessageType, Vec<u8>),
    Ticked,
    CleanedUp,
}

struct RecorderRoom {
    base: RoomBase,
    notes: mpsc::UnboundedSender<Note>,
    panic_on_tick: bool,
}

#[async_trait]
impl Room for RecorderRoom {
    fn base(&self) -> &RoomBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut RoomBase {
        &mut self.base
    }

    async fn tick(&mut self) {
        if self.panic_on_tick {
            panic!("tick exploded");
        }
        let _ = self.notes.send(Note::Ticked);
    }

    async fn add_user(&mut self, user: UserBase) {
        let _ = self.notes.send(Note::Joined(user.id()));
        self.base_mut().add_user(user);
    }

    async fn remove_user(&mut self, user: UserBase) {
        let _ = self.notes.send(Note::Left(user.id()));
        self.base_mut().remove_user(user.id());
    }

    async fn handle_message(&mut self, user: UserBase, msg_type: MessageType, payload: Vec<u8>) {
        let _ = self
            .notes
            .send(Note::Message(user.id(), msg_type, payload.clone()));
        let text = String::from_utf8_lossy(&payload).into_owned();
        self.base().broadcast_excluded(msg_type, &text, user.id()).await;
    }

    fn cleanup(&mut self) {
        let _ = self.notes.send(Note::CleanedUp);
    }
}

/// Builds a constructor for a recorder room with the given cadence.
fn recorder(
    notes: mpsc::UnboundedSender<Note>,
    tick: Duration,
    panic_on_tick: bool,
) -> impl FnOnce(RoomId) -> RecorderRoom {
    move |id| RecorderRoom {
        base: RoomBase::new(id, tick),
        notes,
        panic_on_tick,
    }
}

/// A cadence long enough to never fire during a test.
const NO_TICK: Duration = Duration::from_secs(3600);

// =========================================================================
// Helpers
// =========================================================================

struct SilentUser {
    base: UserBase,
}

#[async_trait]
impl User for SilentUser {
    fn base(&self) -> &UserBase {
        &self.base
    }

    async fn handle_packet(&mut self, _msg_type: MessageType, _payload: &[u8]) {}
}

/// Spins up a real loopback connection and returns the server-side user
/// handle plus the raw client socket (kept alive by the caller).
async fn connected_user() -> (UserBase, WsClient) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("websocket handshake");
        MessagePump::spawn(ws, Some(peer), PumpConfig::default(), |pump| SilentUser {
            base: UserBase::new(pump),
        })
    });

    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("client connect");
    let base = server.await.expect("server task");
    (base, client)
}

/// Snapshots the room's owner from its own task.
async fn owner_of(front: &RoomFront<RecorderRoom>) -> Option<UserId> {
    let (tx, rx) = oneshot::channel();
    front
        .queue_action(move |room| {
            let _ = tx.send(room.base().owner());
        })
        .await
        .expect("room should be running");
    rx.await.expect("snapshot reply")
}

/// Waits for a specific note, failing on timeout. Notes that do not match
/// `want` are skipped.
async fn wait_for(notes: &mut mpsc::UnboundedReceiver<Note>, want: &Note) {
    loop {
        let note = timeout(Duration::from_secs(2), notes.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"))
            .expect("note stream ended");
        if note == *want {
            return;
        }
    }
}

// =========================================================================
// Lobby lifecycle
// =========================================================================

#[tokio::test]
async fn owner_chain_and_destruction_at_zero() {
    let lobby = Lobby::new();
    let (notes_tx, mut notes) = mpsc::unbounded_channel();
    let id = RoomId(1);
    let front = lobby
        .new_room(id, recorder(notes_tx, NO_TICK, false))
        .await
        .unwrap();

    let (u1, _c1) = connected_user().await;
    let (u2, _c2) = connected_user().await;

    lobby.join_room(id, u1.clone()).await.unwrap();
    lobby.join_room(id, u2.clone()).await.unwrap();
    assert_eq!(lobby.member_count(id).await.unwrap(), 2);

    // First joiner claims the room.
    assert_eq!(owner_of(&front).await, Some(u1.id()));

    lobby.leave_room(id, &u1).await.unwrap();
    assert_eq!(lobby.member_count(id).await.unwrap(), 1);
    assert_eq!(owner_of(&front).await, Some(u2.id()));

    lobby.leave_room(id, &u2).await.unwrap();

    // The registry entry is gone the moment the count hit zero.
    let (u3, _c3) = connected_user().await;
    assert!(matches!(
        lobby.join_room(id, u3).await,
        Err(RoomError::NotFound(_))
    ));
    assert!(matches!(
        lobby.member_count(id).await,
        Err(RoomError::NotFound(_))
    ));
    assert_eq!(lobby.room_count().await, 0);

    // The actor finishes its own teardown asynchronously.
    wait_for(&mut notes, &Note::CleanedUp).await;
}

#[tokio::test]
async fn duplicate_room_creation_fails_and_leaves_original_untouched() {
    let lobby = Lobby::new();
    let (notes_tx, _notes) = mpsc::unbounded_channel();
    let id = RoomId(2);

    let front = lobby
        .new_room(id, recorder(notes_tx.clone(), NO_TICK, false))
        .await
        .unwrap();

    assert!(matches!(
        lobby.new_room(id, recorder(notes_tx, NO_TICK, false)).await,
        Err(RoomError::Duplicate(_))
    ));
    assert_eq!(lobby.room_count().await, 1);

    // The original room is still reachable and still serviced.
    let (u1, _c1) = connected_user().await;
    lobby.join_room(id, u1.clone()).await.unwrap();
    assert_eq!(owner_of(&front).await, Some(u1.id()));
}

#[tokio::test]
async fn owner_transfers_to_lowest_remaining_user() {
    let lobby = Lobby::new();
    let (notes_tx, _notes) = mpsc::unbounded_channel();
    let id = RoomId(3);
    let front = lobby
        .new_room(id, recorder(notes_tx, NO_TICK, false))
        .await
        .unwrap();

    // Ids are allocated in ascending order, so u2 < u3.
    let (u1, _c1) = connected_user().await;
    let (u2, _c2) = connected_user().await;
    let (u3, _c3) = connected_user().await;

    lobby.join_room(id, u1.clone()).await.unwrap();
    lobby.join_room(id, u2.clone()).await.unwrap();
    lobby.join_room(id, u3.clone()).await.unwrap();

    lobby.leave_room(id, &u1).await.unwrap();
    assert_eq!(owner_of(&front).await, Some(u2.id()));
}

// =========================================================================
// Event processing
// =========================================================================

#[tokio::test]
async fn messages_from_one_producer_arrive_in_order() {
    let lobby = Lobby::new();
    let (notes_tx, mut notes) = mpsc::unbounded_channel();
    let id = RoomId(4);
    let front = lobby
        .new_room(id, recorder(notes_tx, NO_TICK, false))
        .await
        .unwrap();

    let (u1, _c1) = connected_user().await;
    lobby.join_room(id, u1.clone()).await.unwrap();
    wait_for(&mut notes, &Note::Joined(u1.id())).await;

    for n in 0u8..5 {
        front
            .push_message(u1.clone(), MessageType(10), vec![n])
            .await
            .unwrap();
    }

    for n in 0u8..5 {
        match timeout(Duration::from_secs(2), notes.recv()).await.unwrap() {
            Some(Note::Message(sender, msg_type, payload)) => {
                assert_eq!(sender, u1.id());
                assert_eq!(msg_type, MessageType(10));
                assert_eq!(payload, vec![n]);
            }
            other => panic!("expected message {n}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn room_messages_are_broadcast_to_other_members() {
    let lobby = Lobby::new();
    let (notes_tx, mut notes) = mpsc::unbounded_channel();
    let id = RoomId(5);
    let front = lobby
        .new_room(id, recorder(notes_tx, NO_TICK, false))
        .await
        .unwrap();

    let (u1, _c1) = connected_user().await;
    let (u2, mut c2) = connected_user().await;
    lobby.join_room(id, u1.clone()).await.unwrap();
    lobby.join_room(id, u2.clone()).await.unwrap();
    wait_for(&mut notes, &Note::Joined(u2.id())).await;

    front
        .push_message(u1.clone(), MessageType(42), b"hi all".to_vec())
        .await
        .unwrap();

    // The non-sender receives the relayed message.
    use futures_util::StreamExt;
    let msg = timeout(Duration::from_secs(2), c2.next())
        .await
        .expect("broadcast should arrive")
        .unwrap()
        .unwrap();
    let data = msg.into_data();
    let (msg_type, payload) = decode_frame(&data).unwrap();
    assert_eq!(msg_type, MessageType(42));
    let text: String = serde_json::from_slice(payload).unwrap();
    assert_eq!(text, "hi all");
}

#[tokio::test]
async fn tick_fires_on_the_configured_cadence() {
    let lobby = Lobby::new();
    let (notes_tx, mut notes) = mpsc::unbounded_channel();
    let id = RoomId(6);
    let _front = lobby
        .new_room(id, recorder(notes_tx, Duration::from_millis(25), false))
        .await
        .unwrap();

    for _ in 0..3 {
        wait_for(&mut notes, &Note::Ticked).await;
    }
}

// =========================================================================
// Fault isolation
// =========================================================================

#[tokio::test]
async fn lobby_entry_survives_room_panic_and_joins_fail_fast() {
    let lobby = Lobby::new();
    let (notes_tx, mut notes) = mpsc::unbounded_channel();
    let id = RoomId(7);

    // Connect first: the room's very first tick will kill it, so the join
    // must land inside the first tick interval.
    let (u1, _c1) = connected_user().await;
    let _front = lobby
        .new_room(id, recorder(notes_tx, Duration::from_millis(100), true))
        .await
        .unwrap();
    lobby.join_room(id, u1.clone()).await.unwrap();

    // The first tick panics; the cleanup hook still runs on the way out.
    wait_for(&mut notes, &Note::CleanedUp).await;

    // The registry entry is deliberately left in place, but joins against
    // the dead actor fail fast rather than hang, and the failed join's
    // count bump is rolled back.
    let (u2, _c2) = connected_user().await;
    let result = timeout(Duration::from_secs(1), lobby.join_room(id, u2))
        .await
        .expect("join against a dead room must not hang");
    assert!(matches!(result, Err(RoomError::Unavailable(_))));
    assert_eq!(lobby.room_count().await, 1);
    assert_eq!(lobby.member_count(id).await.unwrap(), 1);
}

#[tokio::test]
async fn panicking_room_does_not_affect_other_rooms() {
    let lobby = Lobby::new();
    let (bad_tx, mut bad_notes) = mpsc::unbounded_channel();
    let (good_tx, mut good_notes) = mpsc::unbounded_channel();

    lobby
        .new_room(RoomId(8), recorder(bad_tx, Duration::from_millis(20), true))
        .await
        .unwrap();
    let good = lobby
        .new_room(RoomId(9), recorder(good_tx, NO_TICK, false))
        .await
        .unwrap();

    wait_for(&mut bad_notes, &Note::CleanedUp).await;

    // The sibling room still processes events.
    let (u1, _c1) = connected_user().await;
    lobby.join_room(RoomId(9), u1.clone()).await.unwrap();
    wait_for(&mut good_notes, &Note::Joined(u1.id())).await;
    assert_eq!(owner_of(&good).await, Some(u1.id()));
}
