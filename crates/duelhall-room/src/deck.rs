//! Deck bookkeeping and validation.

use duelhall_protocol::DeckList;
use serde::{Deserialize, Serialize};

/// Size limits applied when a duelist readies up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckLimits {
    pub main_min: usize,
    pub main_max: usize,
    pub extra_max: usize,
    pub side_max: usize,
}

impl Default for DeckLimits {
    fn default() -> Self {
        Self {
            main_min: 40,
            main_max: 60,
            extra_max: 15,
            side_max: 15,
        }
    }
}

/// Why a deck was refused. The numeric code goes out in the `ERROR_MSG`
/// packet so clients can show a specific message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeckError {
    #[error("main deck has {0} cards")]
    MainCount(usize),
    #[error("extra deck has {0} cards")]
    ExtraCount(usize),
    #[error("side deck has {0} cards")]
    SideCount(usize),
    /// A side-decked list isn't a rearrangement of the registered deck.
    #[error("side deck swap changes the deck's contents or shape")]
    SideMismatch,
}

impl DeckError {
    pub fn code(&self) -> u32 {
        match self {
            Self::MainCount(_) => 1,
            Self::ExtraCount(_) => 2,
            Self::SideCount(_) => 3,
            Self::SideMismatch => 4,
        }
    }
}

/// A duelist's deck, split into main, extra and side.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Deck {
    pub main: Vec<u32>,
    pub extra: Vec<u32>,
    pub side: Vec<u32>,
}

impl Deck {
    /// Splits the combined main list a client sends into main and extra.
    pub fn from_list(list: DeckList, is_extra: impl Fn(u32) -> bool) -> Self {
        let (extra, main) = list.main.into_iter().partition(|&code| is_extra(code));
        Self {
            main,
            extra,
            side: list.side,
        }
    }

    pub fn validate(&self, limits: &DeckLimits) -> Result<(), DeckError> {
        let main = self.main.len();
        if main < limits.main_min || main > limits.main_max {
            return Err(DeckError::MainCount(main));
        }
        if self.extra.len() > limits.extra_max {
            return Err(DeckError::ExtraCount(self.extra.len()));
        }
        if self.side.len() > limits.side_max {
            return Err(DeckError::SideCount(self.side.len()));
        }
        Ok(())
    }

    /// Whether `self` is a legal side-decking of `original`: every section
    /// keeps its size and the cards overall are the same multiset.
    pub fn is_side_of(&self, original: &Deck) -> bool {
        if self.main.len() != original.main.len()
            || self.extra.len() != original.extra.len()
            || self.side.len() != original.side.len()
        {
            return false;
        }
        let mut mine = self.all_codes();
        let mut theirs = original.all_codes();
        mine.sort_unstable();
        theirs.sort_unstable();
        mine == theirs
    }

    fn all_codes(&self) -> Vec<u32> {
        self.main
            .iter()
            .chain(&self.extra)
            .chain(&self.side)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck(main: usize, extra: usize, side: usize) -> Deck {
        Deck {
            main: (0..main as u32).collect(),
            extra: (1000..1000 + extra as u32).collect(),
            side: (2000..2000 + side as u32).collect(),
        }
    }

    #[test]
    fn test_from_list_splits_extra() {
        let list = DeckList {
            main: vec![1, 1001, 2, 1002],
            side: vec![7],
        };
        let deck = Deck::from_list(list, |code| code >= 1000);
        assert_eq!(deck.main, vec![1, 2]);
        assert_eq!(deck.extra, vec![1001, 1002]);
        assert_eq!(deck.side, vec![7]);
    }

    #[test]
    fn test_validate_limits() {
        let limits = DeckLimits::default();
        assert_eq!(deck(40, 15, 15).validate(&limits), Ok(()));
        assert_eq!(deck(39, 0, 0).validate(&limits), Err(DeckError::MainCount(39)));
        assert_eq!(deck(61, 0, 0).validate(&limits), Err(DeckError::MainCount(61)));
        assert_eq!(deck(40, 16, 0).validate(&limits), Err(DeckError::ExtraCount(16)));
        assert_eq!(deck(40, 0, 16).validate(&limits), Err(DeckError::SideCount(16)));
    }

    #[test]
    fn test_is_side_of_allows_swaps() {
        let original = deck(40, 2, 2);
        let mut sided = original.clone();
        std::mem::swap(&mut sided.main[0], &mut sided.side[0]);
        assert!(sided.is_side_of(&original));
    }

    #[test]
    fn test_is_side_of_rejects_new_cards_and_shape_changes() {
        let original = deck(40, 2, 2);
        let mut foreign = original.clone();
        foreign.main[0] = 9999;
        assert!(!foreign.is_side_of(&original));

        let mut reshaped = original.clone();
        let card = reshaped.side.pop().unwrap();
        reshaped.main.push(card);
        assert!(!reshaped.is_side_of(&original));
    }
}
