//! Error types for the protocol layer.
//!
//! Two enums live here because two very different inputs are parsed:
//!
//! - [`ProtocolError`] covers packets coming from *clients*. Clients are
//!   untrusted, so every one of these errors is a normal, expected outcome
//!   that the connection handler reacts to (close the socket, or drop a
//!   single command).
//! - [`CoreMessageError`] covers messages coming from the *duel engine*.
//!   The engine is trusted, so one of these means the room and the engine
//!   disagree about the message format. Rooms treat it as fatal.

/// A read ran past the end of a buffer.
///
/// Shared by both error enums: the same cursor reads client payloads and
/// engine messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("read of {needed} bytes at offset {offset} overruns buffer of {len} bytes")]
pub struct OutOfRange {
    pub offset: usize,
    pub needed: usize,
    pub len: usize,
}

/// Errors produced while framing or parsing client packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The 3-byte header is unusable: the implied body length is negative
    /// or above the maximum, or the type code is not a known client
    /// message. The connection that sent it must be closed.
    #[error("malformed header: length {length}, type {msg_type:#04x}")]
    MalformedHeader { length: i16, msg_type: u8 },

    /// The header was fine but the buffer doesn't hold exactly the number
    /// of body bytes it declared.
    #[error("frame declares {declared} body bytes but {actual} were supplied")]
    FrameLengthMismatch { declared: usize, actual: usize },

    /// A fixed-layout accessor was used on a body of the wrong size.
    /// Only that one command is rejected.
    #[error("payload for {msg_type:#04x} is {actual} bytes, expected {expected}")]
    PayloadSizeMismatch {
        msg_type: u8,
        expected: usize,
        actual: usize,
    },

    /// An outgoing payload doesn't fit in one frame.
    #[error("payload of {size} bytes exceeds the {max}-byte frame limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// A variable-length payload is internally inconsistent (e.g. deck
    /// counts that don't match the number of card codes).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),
}

/// Errors produced while classifying or rewriting duel engine messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreMessageError {
    /// The message is empty, so it has no type byte.
    #[error("engine message is empty")]
    TruncatedMessage,

    /// The type byte isn't one the classifier knows how to route.
    #[error("unknown engine message type {0}")]
    UnknownMessageType(u8),

    /// A hint message carries a hint sub-type with no known routing.
    #[error("unknown hint type {0}")]
    UnknownHintType(u8),

    /// A team-scoped message names a player that isn't team 0 or 1.
    #[error("engine message addressed to invalid team {0}")]
    InvalidTeam(u8),

    /// A receiving team was requested for a message that has none.
    #[error("engine message type {0} has no receiving team")]
    NoReceivingTeam(u8),

    /// A length prefix or a field read ran past the end of the buffer.
    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),
}
