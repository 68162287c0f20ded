//! Server-to-client packets.
//!
//! [`ServerMessage`] is a tagged union over everything the server sends.
//! Each variant knows its wire type and body layout; [`ServerMessage::encode`]
//! runs the body through the same framing as client packets.

use crate::cursor::{put_utf16, put_utf16_fixed};
use crate::error::ProtocolError;
use crate::framing::encode;
use crate::types::HostInfo;

/// Server-to-client message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StocType {
    GameMsg = 0x01,
    ErrorMsg = 0x02,
    SelectHand = 0x03,
    SelectTp = 0x04,
    HandResult = 0x05,
    ChangeSide = 0x07,
    WaitingSide = 0x08,
    JoinGame = 0x12,
    TypeChange = 0x13,
    DuelStart = 0x15,
    DuelEnd = 0x16,
    Chat = 0x19,
    HsPlayerEnter = 0x20,
    HsPlayerChange = 0x21,
    HsWatchChange = 0x22,
}

/// Category of an `ERROR_MSG` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    Join = 1,
    Deck = 2,
    Side = 3,
    Version = 4,
}

/// Codes carried by [`ErrorKind::Join`].
pub mod join_error {
    /// Room doesn't exist or is closing.
    pub const UNAVAILABLE: u32 = 0;
    pub const WRONG_PASSWORD: u32 = 1;
    /// Client was kicked earlier, or the duel already started.
    pub const REFUSED: u32 = 2;
}

/// Seat state changes announced with `HS_PLAYER_CHANGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayerChange {
    Observe = 0x8,
    Ready = 0x9,
    NotReady = 0xA,
    Leave = 0xB,
}

/// Builds the `TYPE_CHANGE` byte: host flag in the high nibble, position
/// in the low one.
pub mod type_change {
    /// Position value for spectators.
    pub const OBSERVER: u8 = 7;

    pub fn byte(is_host: bool, position: u8) -> u8 {
        (u8::from(is_host) << 4) | (position & 0x0F)
    }
}

/// A message the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// One engine message, already redacted for its recipient.
    GameMsg(Vec<u8>),
    ErrorMsg { kind: ErrorKind, code: u32 },
    SelectHand,
    SelectTp,
    HandResult { first: u8, second: u8 },
    ChangeSide,
    WaitingSide,
    JoinGame(HostInfo),
    TypeChange(u8),
    DuelStart,
    DuelEnd,
    Chat { sender: u16, text: String },
    HsPlayerEnter { name: String, position: u8 },
    /// `(position << 4) | change`.
    HsPlayerChange { position: u8, change: PlayerChange },
    HsWatchChange { spectators: u16 },
}

impl ServerMessage {
    pub fn msg_type(&self) -> StocType {
        match self {
            Self::GameMsg(_) => StocType::GameMsg,
            Self::ErrorMsg { .. } => StocType::ErrorMsg,
            Self::SelectHand => StocType::SelectHand,
            Self::SelectTp => StocType::SelectTp,
            Self::HandResult { .. } => StocType::HandResult,
            Self::ChangeSide => StocType::ChangeSide,
            Self::WaitingSide => StocType::WaitingSide,
            Self::JoinGame(_) => StocType::JoinGame,
            Self::TypeChange(_) => StocType::TypeChange,
            Self::DuelStart => StocType::DuelStart,
            Self::DuelEnd => StocType::DuelEnd,
            Self::Chat { .. } => StocType::Chat,
            Self::HsPlayerEnter { .. } => StocType::HsPlayerEnter,
            Self::HsPlayerChange { .. } => StocType::HsPlayerChange,
            Self::HsWatchChange { .. } => StocType::HsWatchChange,
        }
    }

    fn body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::GameMsg(msg) => out.extend_from_slice(msg),
            Self::ErrorMsg { kind, code } => {
                out.push(*kind as u8);
                out.extend_from_slice(&[0; 3]);
                out.extend_from_slice(&code.to_le_bytes());
            }
            Self::SelectHand
            | Self::SelectTp
            | Self::ChangeSide
            | Self::WaitingSide
            | Self::DuelStart
            | Self::DuelEnd => {}
            Self::HandResult { first, second } => out.extend_from_slice(&[*first, *second]),
            Self::JoinGame(info) => info.write(&mut out),
            Self::TypeChange(byte) => out.push(*byte),
            Self::Chat { sender, text } => {
                out.extend_from_slice(&sender.to_le_bytes());
                put_utf16(&mut out, text);
            }
            Self::HsPlayerEnter { name, position } => {
                put_utf16_fixed(&mut out, name, 20);
                out.push(*position);
                out.push(0);
            }
            Self::HsPlayerChange { position, change } => {
                out.push((position << 4) | *change as u8);
            }
            Self::HsWatchChange { spectators } => {
                out.extend_from_slice(&spectators.to_le_bytes());
            }
        }
        out
    }

    /// Encodes the message with its 3-byte header.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self.msg_type() as u8, &self.body())
    }
}
