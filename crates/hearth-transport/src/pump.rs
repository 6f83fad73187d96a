//! The message pump: one duplex websocket split into a read loop and a
//! write loop, each its own task.
//!
//! The read loop decodes inbound frames and dispatches them to the user's
//! packet handler. The write loop drains the bounded outbound queue and
//! keeps the connection alive with periodic pings. The two loops share one
//! lock-guarded `connected` flag so that whichever exits first closes the
//! queue exactly once, and the other follows.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hearth_protocol::{MessageType, decode_frame, encode_frame};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{TransportError, User, UserBase};

/// Tuning knobs for one connection's pump.
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Idle deadline: the connection dies if nothing (data or pong) arrives
    /// within this window.
    pub read_timeout: Duration,

    /// Deadline for writing a single frame to the socket.
    pub write_timeout: Duration,

    /// Largest inbound frame accepted, in bytes.
    pub max_frame_bytes: usize,

    /// Outbound queue depth before senders block.
    pub send_queue: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            max_frame_bytes: 4096,
            send_queue: 8,
        }
    }
}

impl PumpConfig {
    /// Keepalive ping period: 9/10 of the idle deadline, so a ping is
    /// always in flight before the peer's read deadline can fire.
    pub fn ping_period(&self) -> Duration {
        self.read_timeout * 9 / 10
    }
}

/// An item on the outbound queue: a ready-to-write frame, or the close
/// sentinel that makes the write loop perform the close handshake.
enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// State shared between the two loops and every sender.
///
/// `connected` transitions true→false exactly once; dropping the queue
/// sender here is what "closes" the queue. Both happen under the one lock
/// so senders can never observe a connected pump with a closed queue.
struct Shared {
    connected: bool,
    queue: Option<mpsc::Sender<Outbound>>,
}

/// One connection's duplex pump.
///
/// Created by [`MessagePump::spawn`]; other components reach it through the
/// [`UserBase`] handed out at spawn time.
pub struct MessagePump {
    remote_addr: Option<SocketAddr>,
    shared: Mutex<Shared>,
}

impl MessagePump {
    /// Builds the pump and its user, then launches both loops.
    ///
    /// The application constructor runs immediately; `on_connect` fires on
    /// the pump task before any packet is dispatched, and `on_disconnect`
    /// fires exactly once when the connection ends. The returned
    /// [`UserBase`] is the caller's handle to the new connection.
    pub fn spawn<S, U, F>(
        ws: WebSocketStream<S>,
        remote_addr: Option<SocketAddr>,
        config: PumpConfig,
        constructor: F,
    ) -> UserBase
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        U: User,
        F: FnOnce(Arc<MessagePump>) -> U,
    {
        let (tx, rx) = mpsc::channel(config.send_queue);
        let pump = Arc::new(MessagePump {
            remote_addr,
            shared: Mutex::new(Shared {
                connected: true,
                queue: Some(tx),
            }),
        });

        let user = constructor(Arc::clone(&pump));
        let base = user.base().clone();
        tokio::spawn(pump_main(pump, ws, user, rx, config));
        base
    }

    /// The peer's address, when the transport knows it.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Whether the connection is still up.
    pub fn is_connected(&self) -> bool {
        self.lock_shared().connected
    }

    /// Encodes a frame and schedules it for sending.
    ///
    /// A no-op that returns immediately once the connection has closed.
    /// While connected, blocks when the outbound queue is full and never
    /// drops or duplicates the frame.
    pub async fn send(&self, msg_type: MessageType, payload: &[u8]) {
        let Some(queue) = self.sender_if_connected() else {
            return;
        };
        let frame = encode_frame(msg_type, payload);
        // An Err means the connection closed while we were queued; the
        // frame dies with it.
        let _ = queue.send(Outbound::Frame(frame)).await;
    }

    /// Requests shutdown by scheduling the close sentinel. Idempotent:
    /// once the connection is closing this does nothing further.
    pub async fn disconnect(&self) {
        let Some(queue) = self.sender_if_connected() else {
            return;
        };
        let _ = queue.send(Outbound::Close).await;
    }

    /// Flips `connected` and closes the queue, atomically with respect to
    /// both loops. Safe to call from either loop in any order.
    fn shutdown(&self) {
        let mut shared = self.lock_shared();
        shared.connected = false;
        shared.queue = None;
    }

    fn sender_if_connected(&self) -> Option<mpsc::Sender<Outbound>> {
        let shared = self.lock_shared();
        if shared.connected { shared.queue.clone() } else { None }
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        // The critical sections never panic, so poisoning is unreachable.
        self.shared.lock().expect("pump state lock poisoned")
    }
}

/// Runs the connection to completion: spawns the write loop, runs the read
/// loop inline, then fires `on_disconnect`.
async fn pump_main<S, U>(
    pump: Arc<MessagePump>,
    ws: WebSocketStream<S>,
    mut user: U,
    outgoing: mpsc::Receiver<Outbound>,
    config: PumpConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    U: User,
{
    user.on_connect().await;

    let (sink, stream) = ws.split();
    let writer = tokio::spawn(write_loop(Arc::clone(&pump), sink, outgoing, config));

    let error = read_loop(&pump, stream, &mut user, &config).await;
    match &error {
        Some(e) => tracing::debug!(
            user = %user.base().id(),
            error = %e,
            "connection closed"
        ),
        None => tracing::debug!(user = %user.base().id(), "connection closed by peer"),
    }
    user.on_disconnect(error).await;

    // Let the write loop finish its close handshake before the task ends.
    let _ = writer.await;
}

/// Reads frames until the connection dies, dispatching each to the user.
///
/// Returns the error that ended the loop, or `None` on a clean peer close.
async fn read_loop<S, U>(
    pump: &Arc<MessagePump>,
    mut stream: SplitStream<WebSocketStream<S>>,
    user: &mut U,
    config: &PumpConfig,
) -> Option<TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    U: User,
{
    let error = loop {
        // The timeout restarts on every inbound message, so any read
        // activity (pongs included) refreshes the idle deadline.
        let message = match time::timeout(config.read_timeout, stream.next()).await {
            Err(_) => break Some(TransportError::ReadTimeout),
            Ok(None) => break None,
            Ok(Some(Err(e))) => {
                break Some(TransportError::ReceiveFailed(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    e,
                )));
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Binary(data) => {
                if data.len() > config.max_frame_bytes {
                    break Some(TransportError::FrameTooLarge {
                        size: data.len(),
                        limit: config.max_frame_bytes,
                    });
                }
                match decode_frame(&data) {
                    Ok((msg_type, payload)) => {
                        user.handle_packet(msg_type, payload).await;
                    }
                    Err(e) => break Some(TransportError::Protocol(e)),
                }
            }
            Message::Close(_) => break None,
            // Pings are answered by the websocket layer; pongs only matter
            // for the deadline refresh above.
            _ => {}
        }
    };

    pump.shutdown();
    error
}

/// Drains the outbound queue and keeps the connection alive, until either
/// the queue closes or a write fails.
async fn write_loop<S>(
    pump: Arc<MessagePump>,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outgoing: mpsc::Receiver<Outbound>,
    config: PumpConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let period = config.ping_period();
    let mut ping = time::interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            item = outgoing.recv() => match item {
                Some(Outbound::Frame(frame)) => {
                    if !write_message(
                        &mut sink,
                        Message::Binary(frame.into()),
                        config.write_timeout,
                    )
                    .await
                    {
                        break;
                    }
                }
                // The close sentinel and a closed queue both mean the
                // connection is going away: run the close handshake.
                Some(Outbound::Close) | None => {
                    let _ = write_message(
                        &mut sink,
                        Message::Close(None),
                        config.write_timeout,
                    )
                    .await;
                    break;
                }
            },
            _ = ping.tick() => {
                if !write_message(
                    &mut sink,
                    Message::Ping(Vec::new().into()),
                    config.write_timeout,
                )
                .await
                {
                    break;
                }
            }
        }
    }

    pump.shutdown();
    let _ = sink.close().await;
}

/// Writes one message under the write deadline. Returns `false` when the
/// write loop should exit.
async fn write_message<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    message: Message,
    deadline: Duration,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match time::timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "write failed");
            false
        }
        Err(_) => {
            tracing::debug!("write deadline exceeded");
            false
        }
    }
}
