//! Framed TCP transport.
//!
//! Clients speak raw TCP: a byte stream of back-to-back packets, each a
//! 3-byte header followed by its body. The reader pulls the header first
//! and validates it with [`Header::validate`] *before* touching the body,
//! so a hostile length can never make us allocate or wait for more than
//! [`MAX_BODY_LEN`](duelhall_protocol::MAX_BODY_LEN) bytes.

use std::io::ErrorKind;
use std::net::SocketAddr;

use duelhall_protocol::{HEADER_LEN, Header};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::{Connection, ConnectionId, FrameReader, FrameWriter, Transport, TransportError};

/// A TCP [`Transport`] that yields framed connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        if let Ok(local) = listener.local_addr() {
            tracing::info!(%local, "TCP transport listening");
        }
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        // Packets are small and latency-sensitive.
        let _ = stream.set_nodelay(true);

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted TCP connection");
        Ok(TcpConnection { id, addr, stream })
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// A single accepted TCP connection.
pub struct TcpConnection {
    id: ConnectionId,
    addr: SocketAddr,
    stream: TcpStream,
}

impl Connection for TcpConnection {
    type Reader = TcpFrameReader;
    type Writer = TcpFrameWriter;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        let (read, write) = self.stream.into_split();
        (
            TcpFrameReader { id: self.id, read },
            TcpFrameWriter { write },
        )
    }
}

/// Reads one validated packet at a time.
pub struct TcpFrameReader {
    id: ConnectionId,
    read: OwnedReadHalf,
}

impl FrameReader for TcpFrameReader {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut header = [0u8; HEADER_LEN];
        match self.read.read_exact(&mut header).await {
            Ok(_) => {}
            // EOF between packets is a clean close.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(TransportError::ReceiveFailed(e)),
        }

        let (body_len, _) = Header::parse(&header).validate().inspect_err(|e| {
            tracing::warn!(id = %self.id, error = %e, "rejecting malformed header");
        })?;

        let mut packet = Vec::with_capacity(HEADER_LEN + body_len);
        packet.extend_from_slice(&header);
        packet.resize(HEADER_LEN + body_len, 0);
        self.read
            .read_exact(&mut packet[HEADER_LEN..])
            .await
            .map_err(TransportError::ReceiveFailed)?;
        Ok(Some(packet))
    }
}

/// Writes packets to the socket.
pub struct TcpFrameWriter {
    write: OwnedWriteHalf,
}

impl FrameWriter for TcpFrameWriter {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.write
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.write
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }
}
