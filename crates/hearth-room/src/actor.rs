//! The room actor: an isolated task that owns one room's state, plus the
//! front through which everything else reaches it.
//!
//! All external mutation is expressed as a [`RoomEvent`] queued onto the
//! actor's bounded channel; the actor interleaves those events with its
//! tick cadence and processes one at a time. A panic while processing is
//! caught at the iteration boundary, logged, and terminates the actor —
//! state mutated mid-fault is not trusted, so the room is sacrificed
//! rather than resumed.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use hearth_protocol::{MessageType, RoomId};
use hearth_transport::UserBase;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{Room, RoomError};

/// Events queued for sending before the producer blocks.
pub(crate) const EVENT_QUEUE_SIZE: usize = 20;

/// Random delay (0–max µs) added to a room's first tick so rooms created
/// at the same instant do not tick in lockstep.
const INITIAL_JITTER_US: u64 = 2_000;

/// A closure executed on the room's actor task with exclusive access to
/// the room. The escape hatch for anything the other event kinds don't
/// cover — lobby teardown uses it to set the destroying flag.
pub type Action<R> = Box<dyn FnOnce(&mut R) + Send + 'static>;

/// An operation queued for a room actor.
pub(crate) enum RoomEvent<R> {
    UserJoined(UserBase),
    UserLeft(UserBase),
    Message {
        user: UserBase,
        msg_type: MessageType,
        payload: Vec<u8>,
    },
    Action(Action<R>),
}

/// Handle to a running room actor.
///
/// Cheap to clone — a queue sender plus the room id. Holding one grants
/// queue-send rights only; the room's state stays owned by its actor.
pub struct RoomFront<R: Room> {
    id: RoomId,
    queue: mpsc::Sender<RoomEvent<R>>,
}

impl<R: Room> Clone for RoomFront<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            queue: self.queue.clone(),
        }
    }
}

impl<R: Room> RoomFront<R> {
    /// The room's id.
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Queues a closure to run on the room's task.
    ///
    /// Blocks while the room's queue is full.
    ///
    /// # Errors
    /// Returns [`RoomError::Unavailable`] when the actor is gone.
    pub async fn queue_action<F>(&self, action: F) -> Result<(), RoomError>
    where
        F: FnOnce(&mut R) + Send + 'static,
    {
        self.send(RoomEvent::Action(Box::new(action))).await
    }

    /// Queues an application message for the room's message handler.
    pub async fn push_message(
        &self,
        user: UserBase,
        msg_type: MessageType,
        payload: Vec<u8>,
    ) -> Result<(), RoomError> {
        self.send(RoomEvent::Message {
            user,
            msg_type,
            payload,
        })
        .await
    }

    pub(crate) async fn add_user(&self, user: UserBase) -> Result<(), RoomError> {
        self.send(RoomEvent::UserJoined(user)).await
    }

    pub(crate) async fn remove_user(&self, user: UserBase) -> Result<(), RoomError> {
        self.send(RoomEvent::UserLeft(user)).await
    }

    async fn send(&self, event: RoomEvent<R>) -> Result<(), RoomError> {
        self.queue
            .send(event)
            .await
            .map_err(|_| RoomError::Unavailable(self.id))
    }
}

/// Launches the actor task for `room` and returns its front.
pub(crate) fn spawn_room<R: Room>(room: R) -> RoomFront<R> {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let front = RoomFront {
        id: room.base().id(),
        queue: tx,
    };
    tokio::spawn(run_room(room, rx));
    front
}

/// The actor loop. Runs until teardown, queue closure, or a fault.
async fn run_room<R: Room>(mut room: R, mut events: mpsc::Receiver<RoomEvent<R>>) {
    let room_id = room.base().id();
    let tick = room.base().tick_interval();

    let jitter = Duration::from_micros(rand::rng().random_range(0..INITIAL_JITTER_US));
    let mut ticker = time::interval_at(Instant::now() + tick + jitter, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(room = %room_id, tick_ms = tick.as_millis() as u64, "room actor started");

    while !room.base().is_destroying() {
        let fault = tokio::select! {
            _ = ticker.tick() => {
                let result = AssertUnwindSafe(room.tick()).catch_unwind().await;
                if result.is_ok() {
                    // Give sibling rooms on the same worker a turn between
                    // ticks.
                    tokio::task::yield_now().await;
                }
                result.err()
            }
            event = events.recv() => match event {
                // Every front is gone; nothing can reach the room again.
                None => break,
                Some(event) => {
                    AssertUnwindSafe(dispatch(&mut room, event)).catch_unwind().await.err()
                }
            },
        };

        if let Some(payload) = fault {
            tracing::error!(
                room = %room_id,
                panic = panic_message(payload.as_ref()),
                "room processing panicked; terminating actor"
            );
            break;
        }
    }

    // Refuse further events before running the cleanup hook, so producers
    // see Unavailable rather than queueing into a dead room.
    events.close();
    room.cleanup();

    tracing::info!(room = %room_id, "room actor stopped");
}

async fn dispatch<R: Room>(room: &mut R, event: RoomEvent<R>) {
    match event {
        RoomEvent::UserJoined(user) => room.add_user(user).await,
        RoomEvent::UserLeft(user) => room.remove_user(user).await,
        RoomEvent::Message {
            user,
            msg_type,
            payload,
        } => room.handle_message(user, msg_type, payload).await,
        RoomEvent::Action(action) => action(room),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
