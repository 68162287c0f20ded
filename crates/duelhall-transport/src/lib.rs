//! Transport abstraction layer for Duelhall.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the byte streams clients connect with. Every transport delivers whole
//! packets (3-byte header plus body); callers never see partial frames.
//!
//! A connection is split into a [`FrameReader`] and a [`FrameWriter`] so the
//! server can read client packets and flush outgoing ones from two
//! independent tasks.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`,
//!   one binary message per packet. The framed TCP transport is always
//!   available.

mod error;
mod tcp;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use tcp::{TcpConnection, TcpFrameReader, TcpFrameWriter, TcpTransport};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketFrameReader, WebSocketFrameWriter, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs across all transports.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide connection id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
///
/// The futures are declared `Send` so a server generic over the transport
/// can drive them from spawned tasks. Implementations are free to write
/// plain `async fn`.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// The address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// One accepted client connection, not yet split.
pub trait Connection: Send + 'static {
    type Reader: FrameReader;
    type Writer: FrameWriter;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The remote peer's address.
    fn peer_addr(&self) -> SocketAddr;

    /// Splits into independently owned read and write halves.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}

/// The receiving half of a connection.
pub trait FrameReader: Send + 'static {
    /// Receives the next complete packet (header included).
    ///
    /// Returns `Ok(None)` when the peer closes the connection cleanly.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;
}

/// The sending half of a connection.
pub trait FrameWriter: Send + 'static {
    /// Sends one already-framed packet.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Flushes and closes the sending side.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
