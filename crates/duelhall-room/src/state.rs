//! Room lifecycle states and the events that drive them.
//!
//! ```text
//!                 ┌──────── seat freed ────────┐
//!                 ▼                            │
//! AcceptingPlayers ── all seats filled ──► TeamDeckCheck
//!                                              │ host starts, all ready
//!                                              ▼
//!                                      RockPaperScissor ◄─┐ tie
//!                                              │ winner ──┘
//!                                              ▼
//!              ┌───────────────────────► ChoosingTurn
//!              │ all sided                     │ turn chosen
//!              │                               ▼
//!         Sidedecking ◄── duel over, ──── Dueling
//!                         match goes on        │ match over / failure
//!                                              ▼
//!                         (any state) ──►  Closing
//! ```
//!
//! `Closing` is terminal. The data each state needs lives inside its
//! variant, so a room can't be "dueling" without a duel.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use duelhall_protocol::{ClientId, DeckList, HostInfo};
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::replay::Replay;

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// A duelist seat: room team (0 or 1) and slot within the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Seat {
    pub team: u8,
    pub slot: u8,
}

impl Seat {
    pub fn new(team: u8, slot: u8) -> Self {
        Self { team, slot }
    }

    /// Every seat the host configuration provides, team 0 first.
    pub fn all(host_info: &HostInfo) -> impl Iterator<Item = Seat> + '_ {
        (0..2).flat_map(move |team| (0..host_info.team_size(team)).map(move |slot| Seat::new(team, slot)))
    }

    /// Flat position clients use to address seats: team 0's slots come
    /// first, then team 1's.
    pub fn position(self, host_info: &HostInfo) -> u8 {
        if self.team == 0 {
            self.slot
        } else {
            host_info.team_size(0) + self.slot
        }
    }

    pub fn from_position(position: u8, host_info: &HostInfo) -> Option<Seat> {
        let first = host_info.team_size(0);
        let seat = if position < first {
            Seat::new(0, position)
        } else {
            Seat::new(1, position - first)
        };
        (seat.slot < host_info.team_size(seat.team)).then_some(seat)
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.team, self.slot)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Everything that can happen to a room, one variant per client action.
///
/// Every event except `Join` names its originating client by id; the room
/// looks the client up among its duelists and spectators and ignores
/// events from strangers.
#[derive(Debug, Clone)]
pub enum Event {
    Join { client: Client, password: String },
    Leave { from: ClientId },
    Chat { from: ClientId, text: String },
    ToDuelist { from: ClientId },
    ToObserver { from: ClientId },
    Ready { from: ClientId },
    NotReady { from: ClientId },
    Kick { from: ClientId, position: u8 },
    Start { from: ClientId },
    UpdateDeck { from: ClientId, deck: DeckList },
    HandResult { from: ClientId, hand: u8 },
    TpResult { from: ClientId, go_first: bool },
    Response { from: ClientId, data: Vec<u8> },
    Surrender { from: ClientId },
    TimeConfirm { from: ClientId },
}

impl Event {
    /// The client that caused the event.
    pub fn origin(&self) -> ClientId {
        match self {
            Self::Join { client, .. } => client.id(),
            Self::Leave { from }
            | Self::Chat { from, .. }
            | Self::ToDuelist { from }
            | Self::ToObserver { from }
            | Self::Ready { from }
            | Self::NotReady { from }
            | Self::Kick { from, .. }
            | Self::Start { from }
            | Self::UpdateDeck { from, .. }
            | Self::HandResult { from, .. }
            | Self::TpResult { from, .. }
            | Self::Response { from, .. }
            | Self::Surrender { from }
            | Self::TimeConfirm { from } => *from,
        }
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Lifecycle state of a room, carrying the data that state needs.
pub(crate) enum State<D> {
    AcceptingPlayers,
    TeamDeckCheck,
    RockPaperScissor(RpsState),
    ChoosingTurn(ChoosingTurnState),
    Dueling(Box<DuelState<D>>),
    Sidedecking(SidedeckState),
    Closing,
}

impl<D> State<D> {
    pub(crate) fn phase(&self) -> Phase {
        match self {
            Self::AcceptingPlayers => Phase::AcceptingPlayers,
            Self::TeamDeckCheck => Phase::TeamDeckCheck,
            Self::RockPaperScissor(_) => Phase::RockPaperScissor,
            Self::ChoosingTurn(_) => Phase::ChoosingTurn,
            Self::Dueling(_) => Phase::Dueling,
            Self::Sidedecking(_) => Phase::Sidedecking,
            Self::Closing => Phase::Closing,
        }
    }
}

/// Hands picked so far, indexed by room team.
#[derive(Debug, Default)]
pub(crate) struct RpsState {
    pub(crate) picks: [Option<u8>; 2],
}

#[derive(Debug)]
pub(crate) struct ChoosingTurnState {
    /// Room team whose leader picks who goes first.
    pub(crate) chooser: u8,
}

pub(crate) struct DuelState<D> {
    pub(crate) duel: D,
    /// Room team playing as engine team 0.
    pub(crate) first_team: u8,
    /// Slot of each room team's active duelist; rotates on tag swaps.
    pub(crate) current: [u8; 2],
    /// Seat the engine is waiting on, if any.
    pub(crate) awaiting: Option<Seat>,
    /// Seat that received the latest prompt. `RETRY` goes back to it.
    pub(crate) last_prompted: Option<Seat>,
    /// Room team that won, `None` for a draw. Set once `WIN` is seen.
    pub(crate) outcome: Option<Option<u8>>,
    pub(crate) seed: [u64; 4],
    pub(crate) replay: Option<Replay>,
    /// Spectator copies of everything public so far, start message first.
    pub(crate) spectator_cache: Vec<Arc<[u8]>>,
}

#[derive(Debug)]
pub(crate) struct SidedeckState {
    pub(crate) chooser: u8,
    pub(crate) done: BTreeSet<Seat>,
}

/// Field-less mirror of the lifecycle state, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    AcceptingPlayers,
    TeamDeckCheck,
    RockPaperScissor,
    ChoosingTurn,
    Dueling,
    Sidedecking,
    Closing,
}

impl Phase {
    /// Whether the match has started (hands are being picked or later).
    pub fn is_started(self) -> bool {
        !matches!(self, Self::AcceptingPlayers | Self::TeamDeckCheck)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_host_info() -> HostInfo {
        HostInfo {
            team1_count: 2,
            team2_count: 2,
            ..HostInfo::default()
        }
    }

    #[test]
    fn test_seat_all_orders_team_zero_first() {
        let seats: Vec<Seat> = Seat::all(&tag_host_info()).collect();
        assert_eq!(
            seats,
            vec![Seat::new(0, 0), Seat::new(0, 1), Seat::new(1, 0), Seat::new(1, 1)]
        );
    }

    #[test]
    fn test_seat_position_round_trip() {
        let info = tag_host_info();
        for seat in Seat::all(&info) {
            assert_eq!(Seat::from_position(seat.position(&info), &info), Some(seat));
        }
        assert_eq!(Seat::from_position(4, &info), None);
    }

    #[test]
    fn test_seat_single_duel_positions() {
        let info = HostInfo {
            team1_count: 1,
            team2_count: 1,
            ..HostInfo::default()
        };
        assert_eq!(Seat::new(1, 0).position(&info), 1);
        assert_eq!(Seat::from_position(1, &info), Some(Seat::new(1, 0)));
        assert_eq!(Seat::from_position(2, &info), None);
    }

    #[test]
    fn test_phase_is_started() {
        assert!(!Phase::AcceptingPlayers.is_started());
        assert!(!Phase::TeamDeckCheck.is_started());
        assert!(Phase::RockPaperScissor.is_started());
        assert!(Phase::Closing.is_started());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::TeamDeckCheck.to_string(), "TeamDeckCheck");
    }
}
