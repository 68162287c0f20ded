//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Browser clients can't open raw TCP sockets, so they tunnel the same
//! packets through WebSocket: each binary message carries exactly one
//! framed packet. The header is validated the same way as on TCP.

use std::net::SocketAddr;

use duelhall_protocol::{HEADER_LEN, Header, ProtocolError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, FrameReader, FrameWriter, Transport, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

fn ws_io_error(kind: std::io::ErrorKind, e: tokio_tungstenite::tungstenite::Error) -> std::io::Error {
    std::io::Error::new(kind, e)
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        if let Ok(local) = listener.local_addr() {
            tracing::info!(%local, "WebSocket transport listening");
        }
        Ok(Self { listener })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::AcceptFailed(ws_io_error(std::io::ErrorKind::ConnectionRefused, e)))?;

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        Ok(WebSocketConnection { id, addr, ws })
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// A single WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    addr: SocketAddr,
    ws: WsStream,
}

impl Connection for WebSocketConnection {
    type Reader = WebSocketFrameReader;
    type Writer = WebSocketFrameWriter;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.ws.split();
        (
            WebSocketFrameReader { id: self.id, stream },
            WebSocketFrameWriter { sink },
        )
    }
}

/// Receiving half: one binary message per packet.
pub struct WebSocketFrameReader {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
}

impl WebSocketFrameReader {
    fn check_frame(&self, data: &[u8]) -> Result<(), TransportError> {
        let Some(header) = data.first_chunk::<HEADER_LEN>() else {
            return Err(ProtocolError::FrameLengthMismatch {
                declared: HEADER_LEN,
                actual: data.len(),
            }
            .into());
        };
        let (body_len, _) = Header::parse(header).validate()?;
        if data.len() - HEADER_LEN != body_len {
            return Err(ProtocolError::FrameLengthMismatch {
                declared: body_len,
                actual: data.len() - HEADER_LEN,
            }
            .into());
        }
        Ok(())
    }
}

impl FrameReader for WebSocketFrameReader {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    let data: Vec<u8> = data.into();
                    if let Err(e) = self.check_frame(&data) {
                        tracing::warn!(id = %self.id, error = %e, "rejecting malformed frame");
                        return Err(e);
                    }
                    return Ok(Some(data));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip text/ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(ws_io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }
}

/// Sending half.
pub struct WebSocketFrameWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter for WebSocketFrameWriter {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let msg = Message::Binary(data.to_vec().into());
        self.sink
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(ws_io_error(std::io::ErrorKind::BrokenPipe, e)))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(ws_io_error(std::io::ErrorKind::BrokenPipe, e)))
    }
}
