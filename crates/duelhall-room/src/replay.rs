//! Replay recording.
//!
//! A replay is every message the duel distributed, in its unredacted form,
//! written back to back. Each message is prefixed with its `u32`
//! little-endian length and the spectator start message comes first. [`duelhall_protocol::engine::split_to_msgs`] turns it back into
//! messages.

use duelhall_protocol::engine::{append_msg, split_to_msgs};
use duelhall_protocol::{CoreMessageError, RoomId};
use tokio::sync::mpsc;

/// Append-only replay buffer for one duel.
#[derive(Debug, Clone, Default)]
pub struct Replay {
    stream: Vec<u8>,
}

impl Replay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, msg: &[u8]) {
        append_msg(&mut self.stream, msg);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.stream
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.stream
    }

    pub fn messages(&self) -> Result<Vec<Vec<u8>>, CoreMessageError> {
        split_to_msgs(&self.stream)
    }
}

/// A finished duel's replay, handed to the [`ReplaySink`].
#[derive(Debug, Clone)]
pub struct FinishedReplay {
    pub room_id: RoomId,
    /// Zero-based index of the duel within the match.
    pub duel_index: u32,
    pub seed: [u64; 4],
    /// Duelist names, team 0 first, in seat order.
    pub duelists: Vec<String>,
    pub stream: Vec<u8>,
}

/// Where rooms deliver finished replays.
pub type ReplaySink = mpsc::UnboundedSender<FinishedReplay>;
