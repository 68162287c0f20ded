//! Error types for the room layer.

use duelhall_protocol::{CoreMessageError, ProtocolError, RoomId};

/// Errors raised by a duel engine implementation.
///
/// Engines are external code; the room never tries to recover from one of
/// these mid-duel. The duel ends and the room closes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("duel creation failed: {0}")]
    CreateFailed(String),

    #[error("engine call failed: {0}")]
    CallFailed(String),

    /// The engine kept asking to be processed without ever waiting for a
    /// response or ending the duel.
    #[error("engine did not yield after {0} processing steps")]
    Stalled(usize),
}

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist (or was already pruned from the lobby).
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// The room turned a join down: wrong password, kicked earlier, no
    /// spectator slot left, or the room is closing.
    #[error("room {0} refused the join")]
    JoinRefused(RoomId),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The engine produced a message the classifier couldn't route. The
    /// room and engine disagree about the format, so the duel can't go on.
    #[error("engine message desync: {0}")]
    Desync(#[from] CoreMessageError),

    /// A server packet couldn't be framed (e.g. an oversized game message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
