//! Shared protocol types: identifiers and the host configuration block.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cursor::Reader;
use crate::error::ProtocolError;
use crate::framing::FixedPayload;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A room's number, as shown in the lobby listing and typed by clients
/// into the join dialog. Clients address rooms with a `u32`, so that's
/// the width here too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u32);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Server-assigned identity of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Client version
// ---------------------------------------------------------------------------

/// Client and engine-core versions a client reports when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientVersion {
    pub client_major: u8,
    pub client_minor: u8,
    pub core_major: u8,
    pub core_minor: u8,
}

impl ClientVersion {
    pub const SIZE: usize = 4;

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            client_major: reader.u8()?,
            client_minor: reader.u8()?,
            core_major: reader.u8()?,
            core_minor: reader.u8()?,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[
            self.client_major,
            self.client_minor,
            self.core_major,
            self.core_minor,
        ]);
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} (core {}.{})",
            self.client_major, self.client_minor, self.core_major, self.core_minor
        )
    }
}

// ---------------------------------------------------------------------------
// HostInfo
// ---------------------------------------------------------------------------

/// Room configuration chosen by the host when creating a game.
///
/// On the wire this is a 56-byte C struct, padding included:
///
/// ```text
/// off  field              off  field
///   0  banlist_hash u32    24  handshake u64
///   4  allowed u8          32  team1_count i32
///   5  mode u8             36  team2_count i32
///   6  duel_rule u8        40  best_of i32
///   7  no_check_deck u8    44  duel_flags u32
///   8  no_shuffle_deck u8  48  forbidden_types i32
///  12  starting_lp u32     52  extra_rules u16
///  16  starting_hand u8
///  17  draw_count u8
///  18  time_limit u16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostInfo {
    pub banlist_hash: u32,
    pub allowed: u8,
    pub mode: u8,
    pub duel_rule: u8,
    pub no_check_deck: bool,
    pub no_shuffle_deck: bool,
    pub starting_lp: u32,
    pub starting_hand: u8,
    pub draw_count: u8,
    pub time_limit: u16,
    pub handshake: u64,
    pub team1_count: i32,
    pub team2_count: i32,
    pub best_of: i32,
    pub duel_flags: u32,
    pub forbidden_types: i32,
    pub extra_rules: u16,
}

impl HostInfo {
    /// Number of seats on `team` (0 or 1), clamped to at least one.
    pub fn team_size(&self, team: u8) -> u8 {
        let count = if team == 0 {
            self.team1_count
        } else {
            self.team2_count
        };
        count.clamp(1, 3) as u8
    }

    /// Number of duels needed to win the match (best-of 3 → 2).
    pub fn wins_needed(&self) -> u8 {
        let best_of = self.best_of.clamp(1, 9) as u8;
        best_of / 2 + 1
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let banlist_hash = reader.u32()?;
        let allowed = reader.u8()?;
        let mode = reader.u8()?;
        let duel_rule = reader.u8()?;
        let no_check_deck = reader.u8()? != 0;
        let no_shuffle_deck = reader.u8()? != 0;
        reader.skip(3)?;
        let starting_lp = reader.u32()?;
        let starting_hand = reader.u8()?;
        let draw_count = reader.u8()?;
        let time_limit = reader.u16()?;
        reader.skip(4)?;
        let handshake = reader.u64()?;
        let team1_count = reader.i32()?;
        let team2_count = reader.i32()?;
        let best_of = reader.i32()?;
        let duel_flags = reader.u32()?;
        let forbidden_types = reader.i32()?;
        let extra_rules = reader.u16()?;
        reader.skip(2)?;
        Ok(Self {
            banlist_hash,
            allowed,
            mode,
            duel_rule,
            no_check_deck,
            no_shuffle_deck,
            starting_lp,
            starting_hand,
            draw_count,
            time_limit,
            handshake,
            team1_count,
            team2_count,
            best_of,
            duel_flags,
            forbidden_types,
            extra_rules,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.banlist_hash.to_le_bytes());
        out.push(self.allowed);
        out.push(self.mode);
        out.push(self.duel_rule);
        out.push(u8::from(self.no_check_deck));
        out.push(u8::from(self.no_shuffle_deck));
        out.extend_from_slice(&[0; 3]);
        out.extend_from_slice(&self.starting_lp.to_le_bytes());
        out.push(self.starting_hand);
        out.push(self.draw_count);
        out.extend_from_slice(&self.time_limit.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&self.handshake.to_le_bytes());
        out.extend_from_slice(&self.team1_count.to_le_bytes());
        out.extend_from_slice(&self.team2_count.to_le_bytes());
        out.extend_from_slice(&self.best_of.to_le_bytes());
        out.extend_from_slice(&self.duel_flags.to_le_bytes());
        out.extend_from_slice(&self.forbidden_types.to_le_bytes());
        out.extend_from_slice(&self.extra_rules.to_le_bytes());
        out.extend_from_slice(&[0; 2]);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.write(&mut out);
        out
    }
}

impl FixedPayload for HostInfo {
    const SIZE: usize = 56;

    fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        Self::read(&mut Reader::new(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host_info() -> HostInfo {
        HostInfo {
            banlist_hash: 0xDEAD_BEEF,
            allowed: 3,
            mode: 0,
            duel_rule: 5,
            no_check_deck: false,
            no_shuffle_deck: true,
            starting_lp: 8000,
            starting_hand: 5,
            draw_count: 1,
            time_limit: 180,
            handshake: 0x0123_4567_89AB_CDEF,
            team1_count: 1,
            team2_count: 1,
            best_of: 3,
            duel_flags: 0x2_0000,
            forbidden_types: 0x4000,
            extra_rules: 0,
        }
    }

    #[test]
    fn test_host_info_layout_size_and_offsets() {
        let bytes = sample_host_info().to_bytes();
        assert_eq!(bytes.len(), HostInfo::SIZE);
        assert_eq!(&bytes[0..4], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(bytes[6], 5);
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[12..16], &8000u32.to_le_bytes());
        assert_eq!(&bytes[18..20], &180u16.to_le_bytes());
        assert_eq!(&bytes[24..32], &0x0123_4567_89AB_CDEFu64.to_le_bytes());
        assert_eq!(&bytes[40..44], &3i32.to_le_bytes());
    }

    #[test]
    fn test_host_info_decode_matches_fields() {
        let info = sample_host_info();
        let decoded = HostInfo::decode_body(&info.to_bytes()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_host_info_team_size_clamped() {
        let mut info = sample_host_info();
        info.team1_count = 0;
        info.team2_count = 7;
        assert_eq!(info.team_size(0), 1);
        assert_eq!(info.team_size(1), 3);
    }

    #[test]
    fn test_host_info_wins_needed() {
        let mut info = sample_host_info();
        assert_eq!(info.wins_needed(), 2);
        info.best_of = 1;
        assert_eq!(info.wins_needed(), 1);
        info.best_of = 0;
        assert_eq!(info.wins_needed(), 1);
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(RoomId(7).to_string(), "R-7");
        assert_eq!(ClientId(42).to_string(), "C-42");
        assert_eq!(serde_json::to_string(&RoomId(7)).unwrap(), "7");
    }
}
