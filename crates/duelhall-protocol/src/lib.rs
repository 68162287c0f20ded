//! Wire protocol for Duelhall.
//!
//! This crate defines the "language" that game clients, the server, and the
//! duel engine speak:
//!
//! - **Framing** ([`Packet`], [`decode`], [`encode`], [`is_header_valid`]):
//!   the 3-byte header that wraps every client-to-server packet, plus the
//!   [`FixedPayload`] accessor for fixed-layout bodies.
//! - **Client packets** ([`CtosType`], [`PlayerInfo`], [`CreateGame`],
//!   [`JoinGame`], [`DeckList`], ...): what clients send us.
//! - **Server packets** ([`ServerMessage`], [`StocType`]): what we send
//!   back, encoded through the same framing.
//! - **Engine messages** ([`engine`]): classification, redaction, and
//!   replay splitting of the raw messages a duel engine produces.
//! - **Errors** ([`ProtocolError`], [`CoreMessageError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and rooms (game
//! lifecycle). It doesn't know about sockets or seats; it only knows how
//! bytes are laid out.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet / ServerMessage) → Room (Event)
//!                                     ↑
//!                   engine::strip_for_team ← raw engine messages
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod ctos;
mod cursor;
pub mod engine;
mod error;
mod framing;
mod stoc;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use ctos::{ChatText, CreateGame, CtosType, DeckList, JoinGame, OneByte, PlayerInfo};
pub use error::{CoreMessageError, OutOfRange, ProtocolError};
pub use framing::{
    FixedPayload, HEADER_LEN, Header, MAX_BODY_LEN, Packet, decode, encode, is_header_valid,
};
pub use stoc::{ErrorKind, PlayerChange, ServerMessage, StocType, join_error, type_change};
pub use types::{ClientId, ClientVersion, HostInfo, RoomId};
