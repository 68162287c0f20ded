//! # Duelhall
//!
//! Session layer for a multiplayer duel server.
//!
//! Duelhall accepts client connections, groups them into duel rooms, relays
//! the messages an injected rule engine produces (redacted per team), and
//! publishes a JSON listing of open rooms. Game rules live entirely in the
//! engine, which implements [`DuelEngine`](duelhall_room::DuelEngine).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duelhall::prelude::*;
//!
//! // Implement DuelEngine for your engine binding, then:
//! // duelhall::telemetry::init()?;
//! // let server = DuelServer::builder()
//! //     .bind("0.0.0.0:7911")
//! //     .build(MyEngine::load()?)
//! //     .await?;
//! // server.run().await
//! ```

mod error;
mod handler;
mod server;
pub mod telemetry;

pub use error::DuelhallError;
pub use server::{DuelServer, DuelServerBuilder, ServerConfig, ServerHandle};

/// Re-exports of the types most servers need.
pub mod prelude {
    pub use crate::{DuelServer, DuelServerBuilder, DuelhallError, ServerConfig, ServerHandle};
    pub use duelhall_protocol::{
        ClientId, ClientVersion, CtosType, HostInfo, ProtocolError, RoomId, ServerMessage,
    };
    pub use duelhall_room::{
        Duel, DuelEngine, DuelOptions, DuelStatus, EngineError, FinishedReplay, ListingConfig,
        ListingService, Lobby, NewCard, ReplaySink, RoomError, RoomOptions, SpectatorView,
    };
    pub use duelhall_transport::{TcpTransport, Transport, TransportError, WebSocketTransport};
}
