//! Duel rooms for Duelhall.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns a
//! lifecycle state machine, the duelists' and spectators' outbound queues,
//! and, while a duel runs, the engine's duel instance.
//!
//! # Key types
//!
//! - [`Lobby`]: creates rooms, looks them up by id, lists them
//! - [`RoomHandle`]: sends events to a running room actor
//! - [`Event`]: everything a client can do to a room
//! - [`DuelEngine`] / [`Duel`]: the injected rule engine
//! - [`Client`]: a room's handle on one connection's outbound queue
//! - [`ListingService`]: periodically published JSON room listing

mod actor;
mod client;
mod config;
mod deck;
mod distribute;
mod duel;
mod engine;
mod error;
mod listing;
mod lobby;
mod replay;
mod room;
mod state;

pub use actor::{RoomHandle, RoomInfo};
pub use client::{Client, ClientOutbound, ClientSender};
pub use config::{RoomOptions, SpectatorView};
pub use deck::{Deck, DeckError, DeckLimits};
pub use engine::{Duel, DuelEngine, DuelOptions, DuelStatus, NewCard, TeamOptions};
pub use error::{EngineError, RoomError};
pub use listing::{ListingConfig, ListingService, render};
pub use lobby::Lobby;
pub use replay::{FinishedReplay, Replay, ReplaySink};
pub use room::RoomProperties;
pub use state::{Event, Phase, Seat};
