//! The duel engine interface.
//!
//! The room doesn't know the rules of the game. It drives an external
//! engine through two traits:
//!
//! - [`DuelEngine`] is the long-lived engine instance shared by every room
//!   (card database, scripts). It creates duels and answers card
//!   questions.
//! - [`Duel`] is one running duel. The room feeds it decks, asks it to
//!   `process`, collects the messages it produced, and hands it player
//!   responses.
//!
//! Calls are synchronous: the room actor owns its duel and calls straight
//! into it. Every call can fail with an [`EngineError`].

use crate::error::EngineError;

/// Per-team starting conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamOptions {
    pub starting_lp: u32,
    pub starting_hand: u32,
    pub draw_count: u32,
}

/// Everything an engine needs to create a duel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuelOptions {
    pub seed: [u64; 4],
    pub flags: u64,
    /// Indexed by engine team: 0 moves first.
    pub teams: [TeamOptions; 2],
}

/// A card to place before the duel starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewCard {
    /// Engine team.
    pub team: u8,
    /// Index of the duelist within the team (tag duels).
    pub duelist: u8,
    pub code: u32,
    pub controller: u8,
    pub location: u8,
    pub sequence: u32,
    pub position: u32,
}

/// What a `process` call left the duel waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelStatus {
    /// The duel is over.
    End,
    /// The engine is waiting for a player's response.
    Awaiting,
    /// More processing is needed before anyone has to answer.
    Continue,
}

/// A long-lived engine instance that creates duels.
pub trait DuelEngine: Send + Sync + 'static {
    type Duel: Duel;

    fn create_duel(&self, options: &DuelOptions) -> Result<Self::Duel, EngineError>;

    /// Whether `code` belongs in the extra deck. Clients send main and
    /// extra deck cards in one list, so the room asks the engine's card
    /// data to split them.
    fn is_extra_deck_card(&self, code: u32) -> bool;
}

/// One running duel.
pub trait Duel: Send + 'static {
    fn add_card(&mut self, card: &NewCard) -> Result<(), EngineError>;

    fn start(&mut self) -> Result<(), EngineError>;

    fn process(&mut self) -> Result<DuelStatus, EngineError>;

    /// Messages produced since the last call, as one `u32`
    /// length-prefixed buffer.
    fn get_messages(&mut self) -> Result<Vec<u8>, EngineError>;

    fn set_response(&mut self, response: &[u8]) -> Result<(), EngineError>;

    /// Number of cards `team` has in `location`.
    fn query_count(&mut self, team: u8, location: u8) -> Result<u32, EngineError>;
}
