//! The room's view of a connected client.
//!
//! A room never touches sockets. Each client is represented by a cheap,
//! cloneable [`Client`] handle over an unbounded channel; the connection's
//! writer task drains that channel onto the wire. Sending therefore never
//! blocks the room, and a client that has gone away simply drops what it's
//! sent.

use std::sync::Arc;

use duelhall_protocol::{ClientId, ServerMessage};
use tokio::sync::mpsc;

/// Something the room wants a connection's writer task to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutbound {
    /// Write this already-framed packet.
    Packet(Arc<[u8]>),
    /// Flush and close the connection.
    Disconnect,
}

/// Channel sender for delivering outbound packets to a client.
pub type ClientSender = mpsc::UnboundedSender<ClientOutbound>;

/// Identity plus outbound queue of one client.
#[derive(Debug, Clone)]
pub struct Client {
    id: ClientId,
    name: Arc<str>,
    sender: ClientSender,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<Arc<str>>, sender: ClientSender) -> Self {
        Self {
            id,
            name: name.into(),
            sender,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a framed packet. Silently drops it if the connection is gone.
    pub fn send(&self, packet: Arc<[u8]>) {
        let _ = self.sender.send(ClientOutbound::Packet(packet));
    }

    /// Encodes and queues a server message.
    pub fn send_msg(&self, msg: &ServerMessage) {
        match msg.encode() {
            Ok(bytes) => self.send(bytes.into()),
            Err(error) => {
                tracing::error!(client_id = %self.id, %error, "failed to encode server message");
            }
        }
    }

    /// Asks the connection to close after flushing what's queued.
    pub fn disconnect(&self) {
        let _ = self.sender.send(ClientOutbound::Disconnect);
    }
}
