//! Client-to-server packet types and their payload layouts.
//!
//! Fixed-size payloads implement [`FixedPayload`] and are read with
//! [`Packet::read_fixed`](crate::Packet::read_fixed). Variable-size ones
//! ([`DeckList`], [`ChatText`]) have their own `decode` that validates the
//! body's internal consistency.

use crate::cursor::{Reader, put_utf16, put_utf16_fixed, utf16_until_nul};
use crate::error::ProtocolError;
use crate::framing::FixedPayload;
use crate::types::{ClientVersion, HostInfo};

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Every message type a client may send.
///
/// Gaps in the numbering are intentional: codes not listed here are
/// rejected at the header check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CtosType {
    Response = 0x01,
    UpdateDeck = 0x02,
    HandResult = 0x03,
    TpResult = 0x04,
    PlayerInfo = 0x10,
    CreateGame = 0x11,
    JoinGame = 0x12,
    LeaveGame = 0x13,
    Surrender = 0x14,
    TimeConfirm = 0x15,
    Chat = 0x16,
    HsToDuelist = 0x20,
    HsToObserver = 0x21,
    HsReady = 0x22,
    HsNotReady = 0x23,
    HsKick = 0x24,
    HsStart = 0x25,
}

impl CtosType {
    pub const ALL: [CtosType; 17] = [
        Self::Response,
        Self::UpdateDeck,
        Self::HandResult,
        Self::TpResult,
        Self::PlayerInfo,
        Self::CreateGame,
        Self::JoinGame,
        Self::LeaveGame,
        Self::Surrender,
        Self::TimeConfirm,
        Self::Chat,
        Self::HsToDuelist,
        Self::HsToObserver,
        Self::HsReady,
        Self::HsNotReady,
        Self::HsKick,
        Self::HsStart,
    ];
}

impl TryFrom<u8> for CtosType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|ty| *ty as u8 == value)
            .ok_or(value)
    }
}

// ---------------------------------------------------------------------------
// Fixed-layout payloads
// ---------------------------------------------------------------------------

const NAME_UNITS: usize = 20;
const PASS_UNITS: usize = 20;
const NOTES_BYTES: usize = 200;

/// `PLAYER_INFO`: the display name, sent once before create/join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub name: String,
}

impl FixedPayload for PlayerInfo {
    const SIZE: usize = NAME_UNITS * 2;

    fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        let name = Reader::new(body).utf16_fixed(NAME_UNITS)?;
        Ok(Self { name })
    }
}

impl PlayerInfo {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        put_utf16_fixed(&mut out, &self.name, NAME_UNITS);
        out
    }
}

/// `CREATE_GAME`: host configuration plus room name, password and notes.
///
/// Notes are a 200-byte NUL-terminated UTF-8 field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateGame {
    pub host_info: HostInfo,
    pub name: String,
    pub password: String,
    pub notes: String,
}

impl FixedPayload for CreateGame {
    const SIZE: usize = HostInfo::SIZE + NAME_UNITS * 2 + PASS_UNITS * 2 + NOTES_BYTES;

    fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(body);
        let host_info = HostInfo::read(&mut reader)?;
        let name = reader.utf16_fixed(NAME_UNITS)?;
        let password = reader.utf16_fixed(PASS_UNITS)?;
        let notes = reader.take(NOTES_BYTES)?;
        let end = notes.iter().position(|&b| b == 0).unwrap_or(notes.len());
        let notes = String::from_utf8_lossy(&notes[..end]).into_owned();
        Ok(Self {
            host_info,
            name,
            password,
            notes,
        })
    }
}

impl CreateGame {
    /// Encodes the payload as a client would send it. Notes longer than the
    /// field are cut at a character boundary.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.host_info.write(&mut out);
        put_utf16_fixed(&mut out, &self.name, NAME_UNITS);
        put_utf16_fixed(&mut out, &self.password, PASS_UNITS);
        let mut end = self.notes.len().min(NOTES_BYTES - 1);
        while !self.notes.is_char_boundary(end) {
            end -= 1;
        }
        let notes_start = out.len();
        out.extend_from_slice(&self.notes.as_bytes()[..end]);
        out.resize(notes_start + NOTES_BYTES, 0);
        out
    }
}

/// `JOIN_GAME`: protocol version, room number, password, client version.
///
/// ```text
/// 0 version u16 | 2 pad | 4 room_id u32 | 8 password [u16; 20] | 48 client version (4)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    pub version: u16,
    pub room_id: u32,
    pub password: String,
    pub client_version: ClientVersion,
}

impl FixedPayload for JoinGame {
    const SIZE: usize = 8 + PASS_UNITS * 2 + ClientVersion::SIZE;

    fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(body);
        let version = reader.u16()?;
        reader.skip(2)?;
        let room_id = reader.u32()?;
        let password = reader.utf16_fixed(PASS_UNITS)?;
        let client_version = ClientVersion::read(&mut reader)?;
        Ok(Self {
            version,
            room_id,
            password,
            client_version,
        })
    }
}

impl JoinGame {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.room_id.to_le_bytes());
        put_utf16_fixed(&mut out, &self.password, PASS_UNITS);
        self.client_version.write(&mut out);
        out
    }
}

/// A single-byte payload (`HAND_RESULT`, `TP_RESULT`, `HS_KICK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneByte(pub u8);

impl FixedPayload for OneByte {
    const SIZE: usize = 1;

    fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self(Reader::new(body).u8()?))
    }
}

// ---------------------------------------------------------------------------
// Variable-length payloads
// ---------------------------------------------------------------------------

/// `UPDATE_DECK`: main/extra codes followed by side codes.
///
/// ```text
/// main_count u32 | side_count u32 | (main_count + side_count) × code u32
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeckList {
    pub main: Vec<u32>,
    pub side: Vec<u32>,
}

impl DeckList {
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(body);
        let main_count = reader.u32()? as usize;
        let side_count = reader.u32()? as usize;
        let expected = main_count
            .checked_add(side_count)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| ProtocolError::InvalidPayload("deck counts overflow".into()))?;
        if reader.remaining().len() != expected {
            return Err(ProtocolError::InvalidPayload(format!(
                "deck declares {main_count} + {side_count} cards but carries {} bytes of codes",
                reader.remaining().len()
            )));
        }
        let main = (0..main_count)
            .map(|_| reader.u32())
            .collect::<Result<_, _>>()?;
        let side = (0..side_count)
            .map(|_| reader.u32())
            .collect::<Result<_, _>>()?;
        Ok(Self { main, side })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 4 * (self.main.len() + self.side.len()));
        out.extend_from_slice(&(self.main.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.side.len() as u32).to_le_bytes());
        for code in self.main.iter().chain(&self.side) {
            out.extend_from_slice(&code.to_le_bytes());
        }
        out
    }
}

/// `CHAT`: UTF-16LE text, optionally NUL-terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatText(pub String);

impl ChatText {
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        if body.len() % 2 != 0 {
            return Err(ProtocolError::InvalidPayload(
                "chat text has an odd number of bytes".into(),
            ));
        }
        Ok(Self(utf16_until_nul(body)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.0.len() + 1) * 2);
        put_utf16(&mut out, &self.0);
        out
    }
}
