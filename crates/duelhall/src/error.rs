//! Unified error type for Duelhall.

use duelhall_protocol::ProtocolError;
use duelhall_room::RoomError;
use duelhall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `duelhall` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuelhallError {
    /// A transport-level error (bind, accept, send, recv, bad frame).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A client packet couldn't be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, unavailable, engine failure).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The client broke the connection sequence, e.g. created a room
    /// before sending its name.
    #[error("unexpected packet: {0}")]
    UnexpectedPacket(String),
}

impl DuelhallError {
    /// Whether the connection survives this error. Only a fixed-size
    /// payload of the wrong size is forgiven; the command is dropped.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Protocol(ProtocolError::PayloadSizeMismatch { .. })
        )
    }
}
