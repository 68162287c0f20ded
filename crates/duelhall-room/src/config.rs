//! Room configuration.

use serde::{Deserialize, Serialize};

use crate::deck::DeckLimits;

// ---------------------------------------------------------------------------
// SpectatorView
// ---------------------------------------------------------------------------

/// How much hidden information spectators get to see.
///
/// Only affects messages that are redacted per team (draws, moves, sets,
/// shuffles). Prompts never reach spectators, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpectatorView {
    /// Spectators see unredacted messages, including both hands.
    Omniscient,
    /// Spectators see what the given room team (0 or 1) sees.
    Team(u8),
    /// Spectators see only public information: copies are redacted for
    /// both teams.
    #[default]
    Neutral,
}

// ---------------------------------------------------------------------------
// RoomOptions
// ---------------------------------------------------------------------------

/// Server-side settings shared by every room a [`Lobby`](crate::Lobby)
/// creates. The per-room settings chosen by the host live in
/// [`HostInfo`](duelhall_protocol::HostInfo).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomOptions {
    pub spectator_view: SpectatorView,

    /// Maximum number of spectators per room.
    pub max_spectators: usize,

    /// How many `process` calls the engine gets to reach a prompt or the
    /// end of the duel before the room gives up on it.
    pub max_engine_steps: usize,

    /// Capacity of each room's command channel.
    pub command_buffer: usize,

    /// Whether finished duels are recorded and handed to the replay sink.
    pub record_replays: bool,

    pub deck_limits: DeckLimits,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            spectator_view: SpectatorView::default(),
            max_spectators: 64,
            max_engine_steps: 10_000,
            command_buffer: 64,
            record_replays: true,
            deck_limits: DeckLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectator_view_defaults_to_neutral() {
        assert_eq!(SpectatorView::default(), SpectatorView::Neutral);
        assert_eq!(RoomOptions::default().spectator_view, SpectatorView::Neutral);
    }

    #[test]
    fn test_room_options_serde_shape() {
        let options = RoomOptions {
            spectator_view: SpectatorView::Team(1),
            ..RoomOptions::default()
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["spectator_view"]["Team"], 1);
        let back: RoomOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back.spectator_view, SpectatorView::Team(1));
    }
}
