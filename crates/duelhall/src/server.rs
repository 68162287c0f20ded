//! `DuelServer` builder and accept loop.
//!
//! This is the entry point for running a Duelhall server. It ties together
//! all the layers: transport → protocol → room, plus the listing service
//! publishing the lobby snapshot.

use std::net::SocketAddr;
use std::sync::Arc;

use duelhall_protocol::ClientVersion;
use duelhall_room::{
    DuelEngine, ListingConfig, ListingService, Lobby, ReplaySink, RoomOptions,
};
use duelhall_transport::{TcpTransport, Transport, WebSocketTransport};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::DuelhallError;
use crate::handler::handle_connection;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Connection-level settings. Room settings live in [`RoomOptions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Client version a `JOIN_GAME` must report. `None` accepts any.
    pub client_version: Option<ClientVersion>,

    /// Handshake value a `CREATE_GAME` must carry. `None` accepts any.
    pub handshake: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7911".to_string(),
            client_version: None,
            handshake: None,
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<E: DuelEngine> {
    pub(crate) lobby: Arc<Lobby<E>>,
    pub(crate) config: ServerConfig,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Duelhall server.
///
/// # Example
///
/// ```rust,ignore
/// use duelhall::prelude::*;
///
/// let server = DuelServer::builder()
///     .bind("0.0.0.0:7911")
///     .build(MyEngine::load()?)
///     .await?;
/// server.run().await
/// ```
pub struct DuelServerBuilder {
    config: ServerConfig,
    room_options: RoomOptions,
    listing: Option<ListingConfig>,
    replay_sink: Option<ReplaySink>,
}

impl DuelServerBuilder {
    /// Creates a new builder with default settings and the listing
    /// service enabled.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            room_options: RoomOptions::default(),
            listing: Some(ListingConfig::default()),
            replay_sink: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn room_options(mut self, options: RoomOptions) -> Self {
        self.room_options = options;
        self
    }

    /// Sets the listing refresh settings.
    pub fn listing(mut self, config: ListingConfig) -> Self {
        self.listing = Some(config);
        self
    }

    /// Runs without a listing service.
    pub fn without_listing(mut self) -> Self {
        self.listing = None;
        self
    }

    /// Finished duels are sent to `sink`.
    pub fn replay_sink(mut self, sink: ReplaySink) -> Self {
        self.replay_sink = Some(sink);
        self
    }

    /// Binds a framed TCP listener and builds the server.
    pub async fn build<E: DuelEngine>(
        self,
        engine: E,
    ) -> Result<DuelServer<E, TcpTransport>, DuelhallError> {
        let transport = TcpTransport::bind(self.config.bind_addr.as_str()).await?;
        Ok(self.build_with(engine, transport))
    }

    /// Binds a WebSocket listener and builds the server.
    pub async fn build_websocket<E: DuelEngine>(
        self,
        engine: E,
    ) -> Result<DuelServer<E, WebSocketTransport>, DuelhallError> {
        let transport = WebSocketTransport::bind(self.config.bind_addr.as_str()).await?;
        Ok(self.build_with(engine, transport))
    }

    /// Builds the server over an already-bound transport.
    ///
    /// Must be called from within a Tokio runtime when the listing service
    /// is enabled.
    pub fn build_with<E: DuelEngine, T: Transport>(self, engine: E, transport: T) -> DuelServer<E, T> {
        let mut lobby = Lobby::new(Arc::new(engine), self.room_options);
        if let Some(sink) = self.replay_sink {
            lobby = lobby.with_replay_sink(sink);
        }
        let lobby = Arc::new(lobby);
        let listing = self
            .listing
            .map(|config| ListingService::spawn(Arc::clone(&lobby), config));
        let (stop_tx, _) = watch::channel(false);

        DuelServer {
            transport,
            state: Arc::new(ServerState {
                lobby,
                config: self.config,
            }),
            listing,
            stop_tx: Arc::new(stop_tx),
        }
    }
}

impl Default for DuelServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// DuelServer
// ---------------------------------------------------------------------------

/// Stops a running [`DuelServer`] from another task.
#[derive(Clone)]
pub struct ServerHandle {
    stop_tx: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Asks the accept loop to exit. Rooms are shut down before
    /// [`DuelServer::run`] returns.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

/// A Duelhall server, ready to accept connections.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuelServer<E: DuelEngine, T: Transport> {
    transport: T,
    state: Arc<ServerState<E>>,
    listing: Option<ListingService>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl<E: DuelEngine, T: Transport> DuelServer<E, T> {
    /// Creates a new builder.
    pub fn builder() -> DuelServerBuilder {
        DuelServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, DuelhallError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn lobby(&self) -> Arc<Lobby<E>> {
        Arc::clone(&self.state.lobby)
    }

    /// The listing service, unless it was disabled.
    pub fn listing(&self) -> Option<&ListingService> {
        self.listing.as_ref()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            stop_tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Runs the accept loop until [`ServerHandle::stop`] is called.
    ///
    /// Each accepted connection gets its own handler task. On stop, the
    /// listing service is stopped and every room is shut down.
    pub async fn run(mut self) -> Result<(), DuelhallError> {
        let mut stop_rx = self.stop_tx.subscribe();
        let stopped = *stop_rx.borrow();
        tracing::info!(addr = ?self.transport.local_addr().ok(), "duel server running");

        if !stopped {
            loop {
                tokio::select! {
                    accepted = self.transport.accept() => match accepted {
                        Ok(conn) => {
                            let state = Arc::clone(&self.state);
                            tokio::spawn(handle_connection(conn, state));
                        }
                        Err(error) => {
                            tracing::error!(%error, "accept failed");
                        }
                    },
                    _ = stop_rx.changed() => break,
                }
            }
        }

        if let Some(listing) = self.listing.take() {
            listing.shutdown().await;
        }
        self.state.lobby.shutdown().await;
        tracing::info!("duel server stopped");
        Ok(())
    }
}
