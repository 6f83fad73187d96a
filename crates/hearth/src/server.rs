//! The listener layer: accepts websocket connections, routes each upgrade
//! by URL path to a registered user constructor, and hands the stream to a
//! fresh message pump.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use hearth_transport::{MessagePump, PumpConfig, User, UserBase};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::HearthError;

/// A type-erased user constructor registered for one URL path.
type UserFactory = Arc<dyn Fn(Arc<MessagePump>) -> Box<dyn User> + Send + Sync>;

/// A websocket server routing connections to per-path user constructors.
///
/// # Example
///
/// ```rust,no_run
/// use hearth::prelude::*;
///
/// struct EchoUser {
///     base: UserBase,
/// }
///
/// #[async_trait::async_trait]
/// impl User for EchoUser {
///     fn base(&self) -> &UserBase {
///         &self.base
///     }
///
///     async fn handle_packet(&mut self, msg_type: MessageType, payload: &[u8]) {
///         self.base.send_raw(msg_type, payload).await;
///     }
/// }
///
/// # async fn demo() -> Result<(), HearthError> {
/// let server = Server::bind("127.0.0.1:4000")
///     .await?
///     .route("/echo", |pump| EchoUser { base: UserBase::new(pump) });
/// server.run().await
/// # }
/// ```
pub struct Server {
    listener: TcpListener,
    routes: HashMap<String, UserFactory>,
    pump_config: PumpConfig,
}

impl Server {
    /// Binds the listener.
    ///
    /// # Errors
    /// Returns [`HearthError::Bind`] when the address cannot be bound.
    pub async fn bind(addr: &str) -> Result<Self, HearthError> {
        let listener = TcpListener::bind(addr).await.map_err(HearthError::Bind)?;
        tracing::info!(addr, "server listening");
        Ok(Self {
            listener,
            routes: HashMap::new(),
            pump_config: PumpConfig::default(),
        })
    }

    /// Overrides the pump configuration applied to accepted connections.
    pub fn with_pump_config(mut self, config: PumpConfig) -> Self {
        self.pump_config = config;
        self
    }

    /// Registers a user constructor for connections upgrading on `pattern`
    /// (exact path match).
    pub fn route<U, F>(mut self, pattern: &str, constructor: F) -> Self
    where
        U: User,
        F: Fn(Arc<MessagePump>) -> U + Send + Sync + 'static,
    {
        self.routes.insert(
            pattern.to_string(),
            Arc::new(move |pump| Box::new(constructor(pump)) as Box<dyn User>),
        );
        self
    }

    /// The address the listener is bound to. Useful with port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Each accepted connection is upgraded and pumped on its own tasks;
    /// per-connection failures are logged and never affect the loop.
    pub async fn run(self) -> Result<(), HearthError> {
        let routes = Arc::new(self.routes);
        let config = self.pump_config;

        tracing::info!("hearth server running");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let routes = Arc::clone(&routes);
                    tokio::spawn(async move {
                        if let Err(e) = handle_upgrade(stream, peer, routes, config).await {
                            tracing::debug!(%peer, error = %e, "connection ended during upgrade");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Upgrades one TCP stream, resolves its constructor by path, and starts
/// the pump pair.
async fn handle_upgrade(
    stream: TcpStream,
    peer: SocketAddr,
    routes: Arc<HashMap<String, UserFactory>>,
    config: PumpConfig,
) -> Result<(), HearthError> {
    let mut path = String::new();
    let callback = |request: &Request, response: Response| {
        path = request.uri().path().to_string();
        if routes.contains_key(&path) {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("no handler for this path".into()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .map_err(|e| HearthError::Handshake(e.to_string()))?;

    let factory = routes
        .get(&path)
        .cloned()
        .ok_or_else(|| HearthError::Handshake(format!("no route for {path}")))?;

    tracing::debug!(%peer, %path, "connection upgraded");
    MessagePump::spawn(ws, Some(peer), config, |pump| factory(pump));
    Ok(())
}

/// Dials a remote Hearth server and pumps the connection with a
/// locally-constructed user.
///
/// Returns the identity handle of the new user; the user itself lives on
/// the pump's tasks, exactly as on the server side.
///
/// # Errors
/// Returns [`HearthError::Connect`] when the dial or upgrade fails.
pub async fn connect<U, F>(
    url: &str,
    config: PumpConfig,
    constructor: F,
) -> Result<UserBase, HearthError>
where
    U: User,
    F: FnOnce(Arc<MessagePump>) -> U,
{
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| HearthError::Connect(e.to_string()))?;
    tracing::debug!(url, "connected");
    Ok(MessagePump::spawn(ws, None, config, constructor))
}
