//! Classification and redaction of duel engine messages.
//!
//! A duel engine emits a stream of messages, each a byte buffer whose first
//! byte is its type. The engine sees the whole game, so many messages carry
//! card codes that some recipients must not learn (the opponent's hand,
//! face-down cards, the deck order). This module answers three questions
//! about every message:
//!
//! 1. **Who receives it?** [`distribution_scope`] maps the message type to a
//!    [`DistributionScope`], and [`receiving_team`] reads the addressed team
//!    for team-scoped messages.
//! 2. **What must be hidden?** [`strip_for_team`] produces a copy with the
//!    other team's hidden card codes replaced by `0`, the "unknown card"
//!    sentinel clients render as a card back.
//! 3. **How is it wrapped?** [`game_msg`] frames it as a server packet.
//!
//! The classifier is total over [`EngineMessageType`]: unknown types are an
//! error, never "send to everyone", because leaking a hidden card can't be
//! undone.
//!
//! It also owns the replay stream helpers ([`append_msg`],
//! [`split_to_msgs`]) since replays store engine messages verbatim.

use crate::cursor::{Reader, zero_u32};
use crate::error::{CoreMessageError, OutOfRange, ProtocolError};
use crate::framing::encode;
use crate::stoc::StocType;

// ---------------------------------------------------------------------------
// Card location / position constants
// ---------------------------------------------------------------------------

pub const LOCATION_DECK: u8 = 0x01;
pub const LOCATION_HAND: u8 = 0x02;
pub const LOCATION_MZONE: u8 = 0x04;
pub const LOCATION_SZONE: u8 = 0x08;
pub const LOCATION_GRAVE: u8 = 0x10;
pub const LOCATION_REMOVED: u8 = 0x20;
pub const LOCATION_EXTRA: u8 = 0x40;
pub const LOCATION_OVERLAY: u8 = 0x80;

pub const POS_FACEUP: u32 = 0x5;
pub const POS_FACEDOWN: u32 = 0xA;

/// Team byte of the start message sent to spectators.
pub const OBSERVER_FLAG: u8 = 0xF0;

/// Hint sub-types (second byte of a `HINT` message).
pub mod hint {
    pub const EVENT: u8 = 1;
    pub const MESSAGE: u8 = 2;
    pub const SELECTMSG: u8 = 3;
    pub const OPSELECTED: u8 = 4;
    pub const EFFECT: u8 = 5;
    pub const RACE: u8 = 6;
    pub const ATTRIB: u8 = 7;
    pub const CODE: u8 = 8;
    pub const NUMBER: u8 = 9;
    pub const CARD: u8 = 10;
    pub const ZONE: u8 = 11;
}

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Declares [`EngineMessageType`] together with its `ALL` table and byte
/// conversion, so the three can't drift apart.
macro_rules! engine_message_types {
    ($($name:ident = $value:literal,)*) => {
        /// Every engine message type the room knows how to route.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum EngineMessageType {
            $($name = $value,)*
        }

        impl EngineMessageType {
            pub const ALL: &'static [EngineMessageType] = &[$(Self::$name,)*];
        }

        impl TryFrom<u8> for EngineMessageType {
            type Error = CoreMessageError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$name),)*
                    other => Err(CoreMessageError::UnknownMessageType(other)),
                }
            }
        }
    };
}

engine_message_types! {
    Retry = 1,
    Hint = 2,
    Start = 4,
    Win = 5,
    SelectBattleCmd = 10,
    SelectIdleCmd = 11,
    SelectEffectYn = 12,
    SelectYesNo = 13,
    SelectOption = 14,
    SelectCard = 15,
    SelectChain = 16,
    SelectPlace = 18,
    SelectPosition = 19,
    SelectTribute = 20,
    SortChain = 21,
    SelectCounter = 22,
    SelectSum = 23,
    SelectDisfield = 24,
    SortCard = 25,
    SelectUnselectCard = 26,
    ConfirmDecktop = 30,
    ConfirmCards = 31,
    ShuffleDeck = 32,
    ShuffleHand = 33,
    RefreshDeck = 34,
    SwapGraveDeck = 35,
    ShuffleSetCard = 36,
    ReverseDeck = 37,
    DeckTop = 38,
    ShuffleExtra = 39,
    NewTurn = 40,
    NewPhase = 41,
    ConfirmExtratop = 42,
    Move = 50,
    PosChange = 53,
    Set = 54,
    Swap = 55,
    FieldDisabled = 56,
    Summoning = 60,
    Summoned = 61,
    SpSummoning = 62,
    SpSummoned = 63,
    FlipSummoning = 64,
    FlipSummoned = 65,
    Chaining = 70,
    Chained = 71,
    ChainSolving = 72,
    ChainSolved = 73,
    ChainEnd = 74,
    ChainNegated = 75,
    ChainDisabled = 76,
    CardSelected = 80,
    RandomSelected = 81,
    BecomeTarget = 83,
    Draw = 90,
    Damage = 91,
    Recover = 92,
    Equip = 93,
    LpUpdate = 94,
    Unequip = 95,
    CardTarget = 96,
    CancelTarget = 97,
    PayLpCost = 100,
    AddCounter = 101,
    RemoveCounter = 102,
    Attack = 110,
    Battle = 111,
    AttackDisabled = 112,
    DamageStepStart = 113,
    DamageStepEnd = 114,
    MissedEffect = 120,
    BeChainTarget = 121,
    CreateRelation = 122,
    ReleaseRelation = 123,
    TossCoin = 130,
    TossDice = 131,
    RockPaperScissors = 132,
    HandRes = 133,
    AnnounceRace = 140,
    AnnounceAttrib = 141,
    AnnounceCard = 142,
    AnnounceNumber = 143,
    CardHint = 160,
    TagSwap = 161,
    ShowHint = 164,
    PlayerHint = 165,
    MatchKill = 170,
    RemoveCards = 190,
}

impl EngineMessageType {
    /// Offset of the byte naming the addressed player, for message types
    /// that have one.
    fn player_offset(self) -> Option<usize> {
        use EngineMessageType::*;
        match self {
            Hint => Some(2),
            SelectBattleCmd | SelectIdleCmd | SelectEffectYn | SelectYesNo | SelectOption
            | SelectCard | SelectChain | SelectPlace | SelectPosition | SelectTribute
            | SortChain | SelectCounter | SelectSum | SelectDisfield | SortCard
            | SelectUnselectCard | RockPaperScissors | AnnounceRace | AnnounceAttrib
            | AnnounceCard | AnnounceNumber | MissedEffect => Some(1),
            Retry | Start | Win | ConfirmDecktop | ConfirmCards | ShuffleDeck | ShuffleHand
            | RefreshDeck | SwapGraveDeck | ShuffleSetCard | ReverseDeck | DeckTop
            | ShuffleExtra | NewTurn | NewPhase | ConfirmExtratop | Move | PosChange | Set
            | Swap | FieldDisabled | Summoning | Summoned | SpSummoning | SpSummoned
            | FlipSummoning | FlipSummoned | Chaining | Chained | ChainSolving | ChainSolved
            | ChainEnd | ChainNegated | ChainDisabled | CardSelected | RandomSelected
            | BecomeTarget | Draw | Damage | Recover | Equip | LpUpdate | Unequip
            | CardTarget | CancelTarget | PayLpCost | AddCounter | RemoveCounter | Attack
            | Battle | AttackDisabled | DamageStepStart | DamageStepEnd | BeChainTarget
            | CreateRelation | ReleaseRelation | TossCoin | TossDice | HandRes | CardHint
            | TagSwap | ShowHint | PlayerHint | MatchKill | RemoveCards => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Who an engine message is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionScope {
    /// Only the receiving team's current duelist, stripped for that team.
    TeamDuelistStripped,
    /// Only the receiving team's current duelist.
    TeamDuelist,
    /// Every duelist of the receiving team.
    Team,
    /// Everyone except the receiving team's current duelist.
    EveryoneExceptTeamDuelist,
    /// Everyone, each copy stripped for the recipient's team.
    EveryoneStripped,
    /// Everyone, unmodified.
    Everyone,
}

impl DistributionScope {
    /// Whether [`receiving_team`] is meaningful for this scope.
    pub fn is_team_scoped(self) -> bool {
        !matches!(self, Self::EveryoneStripped | Self::Everyone)
    }
}

/// The message's type byte.
pub fn message_type(msg: &[u8]) -> Result<u8, CoreMessageError> {
    msg.first()
        .copied()
        .ok_or(CoreMessageError::TruncatedMessage)
}

/// The message's type, as a known [`EngineMessageType`].
pub fn engine_message_type(msg: &[u8]) -> Result<EngineMessageType, CoreMessageError> {
    EngineMessageType::try_from(message_type(msg)?)
}

/// Scope of a message type. Total over [`EngineMessageType`]; `hint_type`
/// is only consulted for [`EngineMessageType::Hint`].
pub fn scope_of(
    ty: EngineMessageType,
    hint_type: impl FnOnce() -> Result<u8, CoreMessageError>,
) -> Result<DistributionScope, CoreMessageError> {
    use DistributionScope as D;
    use EngineMessageType::*;
    let scope = match ty {
        SelectCard | SelectTribute | SelectUnselectCard => D::TeamDuelistStripped,
        Retry | SelectBattleCmd | SelectIdleCmd | SelectEffectYn | SelectYesNo | SelectOption
        | SelectChain | SelectPlace | SelectPosition | SortChain | SelectCounter | SelectSum
        | SelectDisfield | SortCard | RockPaperScissors | AnnounceRace | AnnounceAttrib
        | AnnounceCard | AnnounceNumber => D::TeamDuelist,
        MissedEffect => D::Team,
        Hint => match hint_type()? {
            hint::EVENT | hint::MESSAGE | hint::SELECTMSG => D::TeamDuelist,
            hint::OPSELECTED..=hint::ZONE => D::EveryoneExceptTeamDuelist,
            other => return Err(CoreMessageError::UnknownHintType(other)),
        },
        Draw | Move | Set | ShuffleHand | ShuffleExtra | TagSwap => D::EveryoneStripped,
        Start | Win | ConfirmDecktop | ConfirmCards | ShuffleDeck | RefreshDeck
        | SwapGraveDeck | ShuffleSetCard | ReverseDeck | DeckTop | NewTurn | NewPhase
        | ConfirmExtratop | PosChange | Swap | FieldDisabled | Summoning | Summoned
        | SpSummoning | SpSummoned | FlipSummoning | FlipSummoned | Chaining | Chained
        | ChainSolving | ChainSolved | ChainEnd | ChainNegated | ChainDisabled
        | CardSelected | RandomSelected | BecomeTarget | Damage | Recover | Equip
        | LpUpdate | Unequip | CardTarget | CancelTarget | PayLpCost | AddCounter
        | RemoveCounter | Attack | Battle | AttackDisabled | DamageStepStart
        | DamageStepEnd | BeChainTarget | CreateRelation | ReleaseRelation | TossCoin
        | TossDice | HandRes | CardHint | ShowHint | PlayerHint | MatchKill
        | RemoveCards => D::Everyone,
    };
    Ok(scope)
}

/// Scope of an engine message.
pub fn distribution_scope(msg: &[u8]) -> Result<DistributionScope, CoreMessageError> {
    let ty = engine_message_type(msg)?;
    scope_of(ty, || {
        msg.get(1)
            .copied()
            .ok_or(CoreMessageError::OutOfRange(OutOfRange {
                offset: 1,
                needed: 1,
                len: msg.len(),
            }))
    })
}

/// Engine team (0 or 1) a team-scoped message is addressed to.
///
/// `RETRY` has no player field; the room routes it to whoever it last
/// prompted, so asking for its team is [`CoreMessageError::NoReceivingTeam`].
pub fn receiving_team(msg: &[u8]) -> Result<u8, CoreMessageError> {
    let ty = engine_message_type(msg)?;
    debug_assert!(
        distribution_scope(msg).is_ok_and(DistributionScope::is_team_scoped),
        "receiving_team called on a message that is not team scoped"
    );
    let offset = ty
        .player_offset()
        .ok_or(CoreMessageError::NoReceivingTeam(ty as u8))?;
    let mut reader = Reader::new(msg);
    reader.skip(offset)?;
    match reader.u8()? {
        team @ (0 | 1) => Ok(team),
        other => Err(CoreMessageError::InvalidTeam(other)),
    }
}

// ---------------------------------------------------------------------------
// Stripping
// ---------------------------------------------------------------------------

/// Location record: `controller u8, location u8, sequence u32, position u32`.
#[derive(Debug, Clone, Copy)]
struct LocInfo {
    controller: u8,
    location: u8,
    position: u32,
}

impl LocInfo {
    fn read(reader: &mut Reader<'_>) -> Result<Self, OutOfRange> {
        let controller = reader.u8()?;
        let location = reader.u8()?;
        let _sequence = reader.u32()?;
        let position = reader.u32()?;
        Ok(Self {
            controller,
            location,
            position,
        })
    }

    /// A card at this location is secret from its controller's opponent.
    fn is_hidden(&self) -> bool {
        if self.location & LOCATION_OVERLAY != 0 {
            return false;
        }
        self.location & (LOCATION_DECK | LOCATION_HAND) != 0 || self.position & POS_FACEDOWN != 0
    }
}

/// Returns a copy of `msg` with every card code that `team` may not see
/// replaced by `0`.
///
/// The copy has the same length as `msg`, and stripping an already
/// stripped message changes nothing. Message types without hidden card
/// codes come back unchanged.
pub fn strip_for_team(team: u8, msg: &[u8]) -> Result<Vec<u8>, CoreMessageError> {
    let ty = engine_message_type(msg)?;
    let mut out = msg.to_vec();
    let mut reader = Reader::new(msg);
    reader.skip(1)?;

    match ty {
        EngineMessageType::Draw => {
            let player = reader.u8()?;
            let count = reader.u32()?;
            for _ in 0..count {
                let at = reader.position();
                reader.skip(4)?;
                let position = reader.u32()?;
                if player != team && position & POS_FACEUP == 0 {
                    zero_u32(&mut out, at);
                }
            }
        }
        EngineMessageType::ShuffleHand | EngineMessageType::ShuffleExtra => {
            let player = reader.u8()?;
            let count = reader.u32()?;
            for _ in 0..count {
                let at = reader.position();
                reader.skip(4)?;
                if player != team {
                    zero_u32(&mut out, at);
                }
            }
        }
        EngineMessageType::Move => {
            let at = reader.position();
            reader.skip(4)?;
            let _previous = LocInfo::read(&mut reader)?;
            let current = LocInfo::read(&mut reader)?;
            if current.controller != team && current.is_hidden() {
                zero_u32(&mut out, at);
            }
        }
        EngineMessageType::Set => {
            let at = reader.position();
            reader.skip(4)?;
            let loc = LocInfo::read(&mut reader)?;
            if loc.controller != team {
                zero_u32(&mut out, at);
            }
        }
        EngineMessageType::TagSwap => {
            let player = reader.u8()?;
            let _main = reader.u32()?;
            let extra = reader.u32()?;
            let _extra_faceup = reader.u32()?;
            let hand = reader.u32()?;
            let _top_code = reader.u32()?;
            for _ in 0..hand.saturating_add(extra) {
                let at = reader.position();
                reader.skip(4)?;
                let position = reader.u32()?;
                if player != team && position & POS_FACEUP == 0 {
                    zero_u32(&mut out, at);
                }
            }
        }
        EngineMessageType::SelectCard => {
            // player, cancelable, min, max
            reader.skip(2 + 4 + 4)?;
            strip_card_list(team, &mut reader, &mut out)?;
        }
        EngineMessageType::SelectUnselectCard => {
            // player, finishable, cancelable, min, max
            reader.skip(3 + 4 + 4)?;
            strip_card_list(team, &mut reader, &mut out)?;
            strip_card_list(team, &mut reader, &mut out)?;
        }
        EngineMessageType::SelectTribute => {
            reader.skip(2 + 4 + 4)?;
            let count = reader.u32()?;
            for _ in 0..count {
                let at = reader.position();
                reader.skip(4)?;
                let controller = reader.u8()?;
                let location = reader.u8()?;
                let _sequence = reader.u32()?;
                let _release_param = reader.u8()?;
                if controller != team && location & (LOCATION_DECK | LOCATION_HAND) != 0 {
                    zero_u32(&mut out, at);
                }
            }
        }
        _ => {}
    }
    Ok(out)
}

/// `count u32, count × (code u32, loc record)`.
fn strip_card_list(team: u8, reader: &mut Reader<'_>, out: &mut [u8]) -> Result<(), OutOfRange> {
    let count = reader.u32()?;
    for _ in 0..count {
        let at = reader.position();
        reader.skip(4)?;
        let loc = LocInfo::read(reader)?;
        if loc.controller != team && loc.is_hidden() {
            zero_u32(out, at);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Start message / wrapping
// ---------------------------------------------------------------------------

/// Inputs for the synthetic `START` message that opens every duel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartInfo {
    /// Engine team of the recipient, or [`OBSERVER_FLAG`] for spectators.
    pub team: u8,
    pub duel_rule: u8,
    pub lp: [u32; 2],
    pub deck_size: [u16; 2],
    pub extra_size: [u16; 2],
}

/// Builds the `START` message:
///
/// ```text
/// START | team u8 | duel_rule u8 | lp0 u32 | lp1 u32 | deck0 u16 | extra0 u16 | deck1 u16 | extra1 u16
/// ```
pub fn make_start_msg(info: &StartInfo) -> Vec<u8> {
    let mut out = Vec::with_capacity(19);
    out.push(EngineMessageType::Start as u8);
    out.push(info.team);
    out.push(info.duel_rule);
    out.extend_from_slice(&info.lp[0].to_le_bytes());
    out.extend_from_slice(&info.lp[1].to_le_bytes());
    for team in 0..2 {
        out.extend_from_slice(&info.deck_size[team].to_le_bytes());
        out.extend_from_slice(&info.extra_size[team].to_le_bytes());
    }
    out
}

/// Wraps an engine message into a `GAME_MSG` server packet.
pub fn game_msg(msg: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    encode(StocType::GameMsg as u8, msg)
}

// ---------------------------------------------------------------------------
// Length-prefixed streams
// ---------------------------------------------------------------------------

/// Appends `msg` to a length-prefixed stream (`u32` LE length, then bytes).
pub fn append_msg(stream: &mut Vec<u8>, msg: &[u8]) {
    stream.extend_from_slice(&(msg.len() as u32).to_le_bytes());
    stream.extend_from_slice(msg);
}

/// Splits a length-prefixed stream back into messages.
///
/// A length prefix that runs past the end of the buffer, or a partial
/// prefix at the end, is [`CoreMessageError::OutOfRange`].
pub fn split_to_msgs(buffer: &[u8]) -> Result<Vec<Vec<u8>>, CoreMessageError> {
    let mut reader = Reader::new(buffer);
    let mut msgs = Vec::new();
    while !reader.remaining().is_empty() {
        let len = reader.u32()? as usize;
        msgs.push(reader.take(len)?.to_vec());
    }
    Ok(msgs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(controller: u8, location: u8, sequence: u32, position: u32) -> Vec<u8> {
        let mut out = vec![controller, location];
        out.extend(sequence.to_le_bytes());
        out.extend(position.to_le_bytes());
        out
    }

    fn draw(player: u8, cards: &[(u32, u32)]) -> Vec<u8> {
        let mut msg = vec![EngineMessageType::Draw as u8, player];
        msg.extend((cards.len() as u32).to_le_bytes());
        for (code, position) in cards {
            msg.extend(code.to_le_bytes());
            msg.extend(position.to_le_bytes());
        }
        msg
    }

    /// `TAG_SWAP` for `player`: hand cards then extra deck cards.
    fn tag_swap(player: u8, hand: &[(u32, u32)], extra: &[(u32, u32)]) -> Vec<u8> {
        let mut msg = vec![EngineMessageType::TagSwap as u8, player];
        msg.extend(30u32.to_le_bytes());
        msg.extend((extra.len() as u32).to_le_bytes());
        msg.extend(0u32.to_le_bytes());
        msg.extend((hand.len() as u32).to_le_bytes());
        msg.extend(0u32.to_le_bytes());
        for (code, position) in hand.iter().chain(extra) {
            msg.extend(code.to_le_bytes());
            msg.extend(position.to_le_bytes());
        }
        msg
    }

    fn code_at(msg: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(msg[offset..offset + 4].try_into().unwrap())
    }

    /// One representative, well-formed message for every type with a
    /// stripped layout, plus trivial bodies for the rest.
    fn sample_messages() -> Vec<Vec<u8>> {
        let mut msgs = vec![
            draw(0, &[(1111, POS_FACEDOWN), (2222, POS_FACEUP)]),
            {
                let mut m = vec![EngineMessageType::ShuffleHand as u8, 1];
                m.extend(2u32.to_le_bytes());
                m.extend(10u32.to_le_bytes());
                m.extend(20u32.to_le_bytes());
                m
            },
            {
                let mut m = vec![EngineMessageType::Move as u8];
                m.extend(3333u32.to_le_bytes());
                m.extend(loc(1, LOCATION_DECK, 0, POS_FACEDOWN));
                m.extend(loc(1, LOCATION_HAND, 0, POS_FACEDOWN));
                m.extend(0u32.to_le_bytes());
                m
            },
            {
                let mut m = vec![EngineMessageType::Set as u8];
                m.extend(4444u32.to_le_bytes());
                m.extend(loc(0, LOCATION_SZONE, 2, POS_FACEDOWN));
                m
            },
            {
                let mut m = vec![EngineMessageType::SelectCard as u8, 0, 1];
                m.extend(1u32.to_le_bytes());
                m.extend(1u32.to_le_bytes());
                m.extend(2u32.to_le_bytes());
                m.extend(5555u32.to_le_bytes());
                m.extend(loc(1, LOCATION_MZONE, 0, POS_FACEDOWN));
                m.extend(6666u32.to_le_bytes());
                m.extend(loc(0, LOCATION_HAND, 1, POS_FACEUP));
                m
            },
            tag_swap(1, &[(7777, POS_FACEDOWN)], &[(8888, POS_FACEDOWN)]),
            {
                let mut m = vec![EngineMessageType::SelectUnselectCard as u8, 0, 1, 0];
                m.extend(1u32.to_le_bytes());
                m.extend(1u32.to_le_bytes());
                // Selectable: the opponent's face-down monster.
                m.extend(1u32.to_le_bytes());
                m.extend(9991u32.to_le_bytes());
                m.extend(loc(1, LOCATION_MZONE, 0, POS_FACEDOWN));
                // Already selected: a card from the receiver's own hand.
                m.extend(1u32.to_le_bytes());
                m.extend(9992u32.to_le_bytes());
                m.extend(loc(0, LOCATION_HAND, 0, POS_FACEDOWN));
                m
            },
            {
                let mut m = vec![EngineMessageType::SelectTribute as u8, 0, 0];
                m.extend(1u32.to_le_bytes());
                m.extend(2u32.to_le_bytes());
                m.extend(2u32.to_le_bytes());
                for (code, controller, location) in
                    [(1212u32, 1, LOCATION_HAND), (3434, 0, LOCATION_MZONE)]
                {
                    m.extend(code.to_le_bytes());
                    m.extend([controller, location]);
                    m.extend(0u32.to_le_bytes());
                    m.push(1);
                }
                m
            },
        ];
        msgs.push(vec![EngineMessageType::NewTurn as u8, 0]);
        msgs.push(vec![EngineMessageType::Hint as u8, hint::EFFECT, 1, 0, 0, 0, 0]);
        msgs
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn test_message_type_empty_is_truncated() {
        assert_eq!(message_type(&[]), Err(CoreMessageError::TruncatedMessage));
        assert_eq!(distribution_scope(&[]), Err(CoreMessageError::TruncatedMessage));
    }

    #[test]
    fn test_distribution_scope_total_over_all_types() {
        for &ty in EngineMessageType::ALL {
            let msg = [ty as u8, hint::EVENT, 0, 0];
            assert!(distribution_scope(&msg).is_ok(), "{ty:?} has no scope");
        }
    }

    #[test]
    fn test_distribution_scope_unknown_type_is_error() {
        let known: Vec<u8> = EngineMessageType::ALL.iter().map(|&t| t as u8).collect();
        for byte in 0..=u8::MAX {
            if !known.contains(&byte) {
                assert_eq!(
                    distribution_scope(&[byte, 0, 0]),
                    Err(CoreMessageError::UnknownMessageType(byte))
                );
            }
        }
    }

    #[test]
    fn test_distribution_scope_hint_by_subtype() {
        let scope = |sub| distribution_scope(&[EngineMessageType::Hint as u8, sub, 0]);
        assert_eq!(scope(hint::SELECTMSG), Ok(DistributionScope::TeamDuelist));
        assert_eq!(
            scope(hint::CARD),
            Ok(DistributionScope::EveryoneExceptTeamDuelist)
        );
        assert_eq!(scope(0), Err(CoreMessageError::UnknownHintType(0)));
        assert_eq!(scope(200), Err(CoreMessageError::UnknownHintType(200)));
    }

    #[test]
    fn test_distribution_scope_known_assignments() {
        let scope = |ty: EngineMessageType| distribution_scope(&[ty as u8, 0]).unwrap();
        assert_eq!(
            scope(EngineMessageType::SelectCard),
            DistributionScope::TeamDuelistStripped
        );
        assert_eq!(
            scope(EngineMessageType::SelectIdleCmd),
            DistributionScope::TeamDuelist
        );
        assert_eq!(scope(EngineMessageType::MissedEffect), DistributionScope::Team);
        assert_eq!(scope(EngineMessageType::Draw), DistributionScope::EveryoneStripped);
        assert_eq!(scope(EngineMessageType::NewPhase), DistributionScope::Everyone);
    }

    #[test]
    fn test_receiving_team_reads_player_byte() {
        let msg = [EngineMessageType::SelectIdleCmd as u8, 1, 0, 0];
        assert_eq!(receiving_team(&msg), Ok(1));
        let hint_msg = [EngineMessageType::Hint as u8, hint::SELECTMSG, 0, 0];
        assert_eq!(receiving_team(&hint_msg), Ok(0));
    }

    #[test]
    fn test_receiving_team_invalid_team_rejected() {
        let msg = [EngineMessageType::SelectYesNo as u8, 4];
        assert_eq!(receiving_team(&msg), Err(CoreMessageError::InvalidTeam(4)));
    }

    #[test]
    fn test_receiving_team_truncated_is_out_of_range() {
        let msg = [EngineMessageType::SelectYesNo as u8];
        assert!(matches!(
            receiving_team(&msg),
            Err(CoreMessageError::OutOfRange(_))
        ));
    }

    // =========================================================================
    // Stripping
    // =========================================================================

    #[test]
    fn test_strip_draw_hides_opponent_facedown_cards() {
        let msg = draw(0, &[(1111, POS_FACEDOWN), (2222, POS_FACEUP)]);
        let own = strip_for_team(0, &msg).unwrap();
        let other = strip_for_team(1, &msg).unwrap();
        assert_eq!(own, msg);
        assert_eq!(code_at(&other, 6), 0);
        assert_eq!(code_at(&other, 14), 2222);
    }

    #[test]
    fn test_strip_move_into_opponent_hand_hidden() {
        let msgs = sample_messages();
        let move_msg = &msgs[2];
        assert_eq!(code_at(&strip_for_team(0, move_msg).unwrap(), 1), 0);
        assert_eq!(code_at(&strip_for_team(1, move_msg).unwrap(), 1), 3333);
    }

    #[test]
    fn test_strip_move_to_faceup_grave_visible() {
        let mut m = vec![EngineMessageType::Move as u8];
        m.extend(3333u32.to_le_bytes());
        m.extend(loc(1, LOCATION_HAND, 0, POS_FACEDOWN));
        m.extend(loc(1, LOCATION_GRAVE, 0, POS_FACEUP));
        m.extend(0u32.to_le_bytes());
        assert_eq!(strip_for_team(0, &m).unwrap(), m);
    }

    #[test]
    fn test_strip_select_card_hides_only_hidden_opponent_cards() {
        let msgs = sample_messages();
        let select = &msgs[4];
        let for_zero = strip_for_team(0, select).unwrap();
        // First entry: opponent's face-down monster → hidden.
        assert_eq!(code_at(&for_zero, 15), 0);
        // Second entry: own hand card → visible.
        assert_eq!(code_at(&for_zero, 29), 6666);
    }

    #[test]
    fn test_strip_preserves_length_and_is_idempotent() {
        for msg in sample_messages() {
            for team in 0..2 {
                let once = strip_for_team(team, &msg).unwrap();
                assert_eq!(once.len(), msg.len());
                assert_eq!(strip_for_team(team, &once).unwrap(), once);
            }
        }
    }

    #[test]
    fn test_strip_tag_swap_hides_facedown_cards_from_opponent() {
        let msg = tag_swap(1, &[(7777, POS_FACEDOWN)], &[(8888, POS_FACEDOWN), (9999, POS_FACEUP)]);
        let own = strip_for_team(1, &msg).unwrap();
        let other = strip_for_team(0, &msg).unwrap();
        assert_eq!(own, msg);
        assert_eq!(code_at(&other, 22), 0);
        assert_eq!(code_at(&other, 30), 0);
        // Face-up extra deck cards are public.
        assert_eq!(code_at(&other, 38), 9999);
    }

    #[test]
    fn test_strip_select_unselect_card_covers_both_lists() {
        let msgs = sample_messages();
        let select = &msgs[6];
        let for_zero = strip_for_team(0, select).unwrap();
        assert_eq!(code_at(&for_zero, 16), 0);
        assert_eq!(code_at(&for_zero, 34), 9992);
        let for_one = strip_for_team(1, select).unwrap();
        assert_eq!(code_at(&for_one, 16), 9991);
        assert_eq!(code_at(&for_one, 34), 0);
    }

    #[test]
    fn test_strip_select_tribute_hides_opponent_hand_only() {
        let msgs = sample_messages();
        let tribute = &msgs[7];
        let for_zero = strip_for_team(0, tribute).unwrap();
        assert_eq!(code_at(&for_zero, 15), 0);
        assert_eq!(code_at(&for_zero, 26), 3434);
        // A monster on the field is never hidden.
        assert_eq!(strip_for_team(1, tribute).unwrap(), *tribute);
    }

    #[test]
    fn test_strip_differs_between_teams_for_one_sided_secrets() {
        let msgs = sample_messages();
        for msg in msgs[..4].iter().chain(&msgs[5..8]) {
            assert_ne!(
                strip_for_team(0, msg).unwrap(),
                strip_for_team(1, msg).unwrap(),
                "{msg:?}"
            );
        }
    }

    #[test]
    fn test_strip_truncated_message_errors() {
        let mut msg = draw(1, &[(1, POS_FACEDOWN)]);
        msg.truncate(msg.len() - 2);
        assert!(matches!(
            strip_for_team(0, &msg),
            Err(CoreMessageError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_strip_does_not_modify_original() {
        let msg = draw(0, &[(1111, POS_FACEDOWN)]);
        let before = msg.clone();
        let _ = strip_for_team(1, &msg).unwrap();
        assert_eq!(msg, before);
    }

    // =========================================================================
    // Start message / streams
    // =========================================================================

    #[test]
    fn test_make_start_msg_layout() {
        let msg = make_start_msg(&StartInfo {
            team: OBSERVER_FLAG,
            duel_rule: 5,
            lp: [8000, 4000],
            deck_size: [40, 41],
            extra_size: [15, 0],
        });
        assert_eq!(msg.len(), 19);
        assert_eq!(msg[0], EngineMessageType::Start as u8);
        assert_eq!(msg[1], OBSERVER_FLAG);
        assert_eq!(code_at(&msg, 3), 8000);
        assert_eq!(code_at(&msg, 7), 4000);
        assert_eq!(&msg[11..19], &[40, 0, 15, 0, 41, 0, 0, 0]);
    }

    #[test]
    fn test_game_msg_wraps_with_header() {
        let packet = game_msg(&[40, 0]).unwrap();
        assert_eq!(packet, vec![3, 0, StocType::GameMsg as u8, 40, 0]);
    }

    #[test]
    fn test_split_to_msgs_recovers_appended() {
        let mut stream = Vec::new();
        append_msg(&mut stream, &[1, 2, 3]);
        append_msg(&mut stream, &[]);
        append_msg(&mut stream, &[9]);
        let msgs = split_to_msgs(&stream).unwrap();
        assert_eq!(msgs, vec![vec![1, 2, 3], vec![], vec![9]]);
    }

    #[test]
    fn test_split_to_msgs_overrun_is_error() {
        let mut stream = Vec::new();
        stream.extend(10u32.to_le_bytes());
        stream.extend([1, 2, 3]);
        assert!(matches!(
            split_to_msgs(&stream),
            Err(CoreMessageError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_split_to_msgs_partial_prefix_is_error() {
        assert!(split_to_msgs(&[1, 0]).is_err());
        assert_eq!(split_to_msgs(&[]).unwrap(), Vec::<Vec<u8>>::new());
    }
}
