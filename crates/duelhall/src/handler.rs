//! Per-connection handler: greeting, create/join, and packet routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The connection is split in two:
//!   - a writer task drains the client's outbound queue onto the wire
//!   - the handler itself reads packets and turns them into room events
//!
//! The flow on the read side is:
//!   1. Receive `PLAYER_INFO` → remember the display name
//!   2. Receive `CREATE_GAME` or `JOIN_GAME` → attach to a room
//!   3. Loop: receive packets → forward as [`Event`]s to the room
//!
//! Whichever side finishes first ends the connection. When the reader goes,
//! the room is told the client left; when the room disconnects the client,
//! the writer closes and the reader is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use duelhall_protocol::{
    ChatText, ClientId, CreateGame, CtosType, DeckList, ErrorKind, JoinGame, OneByte, Packet,
    PlayerInfo, RoomId, ServerMessage, join_error,
};
use duelhall_room::{Client, ClientOutbound, ClientSender, DuelEngine, Event, RoomError, RoomHandle};
use duelhall_transport::{Connection, FrameReader, FrameWriter};
use tokio::sync::mpsc;

use crate::DuelhallError;
use crate::server::ServerState;

/// Counter for client ids, unique for the life of the process.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<E, C>(conn: C, state: Arc<ServerState<E>>)
where
    E: DuelEngine,
    C: Connection,
{
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    let client_id = ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(%conn_id, %client_id, %peer, "handling new connection");

    let (mut reader, writer) = conn.into_split();
    let (sender, outbound) = mpsc::unbounded_channel();
    let mut writer_task = tokio::spawn(write_loop(writer, outbound, client_id));

    let mut session = Session {
        client_id,
        sender,
        state: &state,
        name: None,
        room: None,
    };

    let writer_done = tokio::select! {
        result = session.read_loop(&mut reader) => {
            match result {
                Ok(()) => tracing::debug!(%client_id, "connection closed by peer"),
                Err(error) => tracing::debug!(%client_id, %error, "connection ended with error"),
            }
            false
        }
        _ = &mut writer_task => true,
    };

    session.leave_room().await;
    if !writer_done {
        let _ = session.sender.send(ClientOutbound::Disconnect);
        let _ = writer_task.await;
    }
    tracing::debug!(%client_id, "connection closed");
}

/// Drains the outbound queue onto the wire until the room (or the read
/// side) asks for a disconnect.
async fn write_loop<W: FrameWriter>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<ClientOutbound>,
    client_id: ClientId,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            ClientOutbound::Packet(bytes) => {
                if let Err(error) = writer.send(&bytes).await {
                    tracing::debug!(%client_id, %error, "send failed");
                    break;
                }
            }
            ClientOutbound::Disconnect => break,
        }
    }
    if let Err(error) = writer.close().await {
        tracing::debug!(%client_id, %error, "close failed");
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// What to do with the connection after one packet.
enum Flow {
    Continue,
    Close,
}

/// Read-side state of one connection.
struct Session<'a, E: DuelEngine> {
    client_id: ClientId,
    sender: ClientSender,
    state: &'a ServerState<E>,
    name: Option<String>,
    room: Option<RoomHandle>,
}

impl<E: DuelEngine> Session<'_, E> {
    async fn read_loop<R: FrameReader>(&mut self, reader: &mut R) -> Result<(), DuelhallError> {
        while let Some(frame) = reader.recv().await? {
            let packet = duelhall_protocol::decode(&frame)?;
            tracing::debug!(client_id = %self.client_id, msg_type = ?packet.msg_type, "packet");
            match self.handle_packet(packet).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => return Ok(()),
                Err(error) if error.is_recoverable() => {
                    tracing::warn!(client_id = %self.client_id, %error, "rejected packet");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<Flow, DuelhallError> {
        let Some(room) = self.room.clone() else {
            return self.handle_greeting(packet).await;
        };
        let Some(event) = self.to_event(&packet)? else {
            return Ok(Flow::Continue);
        };
        let leaving = matches!(event, Event::Leave { .. });
        match room.send(event).await {
            Ok(()) if leaving => {
                self.room = None;
                Ok(Flow::Close)
            }
            Ok(()) => Ok(Flow::Continue),
            Err(RoomError::Unavailable(room_id)) => {
                tracing::debug!(client_id = %self.client_id, %room_id, "room is gone");
                self.room = None;
                Ok(Flow::Close)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Packets accepted before the client is in a room.
    async fn handle_greeting(&mut self, packet: Packet) -> Result<Flow, DuelhallError> {
        match packet.msg_type {
            CtosType::PlayerInfo => {
                let info = packet.read_fixed::<PlayerInfo>()?;
                self.name = Some(info.name);
                Ok(Flow::Continue)
            }
            CtosType::CreateGame => {
                let create = packet.read_fixed::<CreateGame>()?;
                let client = self.client()?;
                let handshake = create.host_info.handshake;
                if self.state.config.handshake.is_some_and(|expected| expected != handshake) {
                    tracing::warn!(
                        client_id = %self.client_id,
                        handshake,
                        "handshake mismatch"
                    );
                    self.send_error(ErrorKind::Version, 0);
                    return Ok(Flow::Close);
                }
                self.room = Some(self.state.lobby.create_room(client, create));
                Ok(Flow::Continue)
            }
            CtosType::JoinGame => {
                let join = packet.read_fixed::<JoinGame>()?;
                let client = self.client()?;
                if self
                    .state
                    .config
                    .client_version
                    .is_some_and(|expected| expected != join.client_version)
                {
                    tracing::warn!(
                        client_id = %self.client_id,
                        version = %join.client_version,
                        "client version mismatch"
                    );
                    self.send_error(ErrorKind::Version, 0);
                    return Ok(Flow::Close);
                }
                self.join(client, join).await;
                Ok(Flow::Continue)
            }
            CtosType::LeaveGame => Ok(Flow::Close),
            other => {
                tracing::debug!(client_id = %self.client_id, msg_type = ?other, "ignored before joining a room");
                Ok(Flow::Continue)
            }
        }
    }

    async fn join(&mut self, client: Client, join: JoinGame) {
        let room_id = RoomId(join.room_id);
        let Some(room) = self.state.lobby.get(room_id) else {
            tracing::debug!(client_id = %self.client_id, %room_id, "join for unknown room");
            self.send_error(ErrorKind::Join, join_error::UNAVAILABLE);
            return;
        };
        match room.join(client, join.password).await {
            Ok(()) => self.room = Some(room),
            // The room already told the client why; it may try again.
            Err(RoomError::JoinRefused(_)) => {
                tracing::debug!(client_id = %self.client_id, %room_id, "join refused");
            }
            Err(error) => {
                tracing::debug!(client_id = %self.client_id, %room_id, %error, "join failed");
                self.send_error(ErrorKind::Join, join_error::UNAVAILABLE);
            }
        }
    }

    /// Maps an in-room packet to a room event. `None` means the packet has
    /// no meaning once the client is in a room.
    fn to_event(&self, packet: &Packet) -> Result<Option<Event>, DuelhallError> {
        let from = self.client_id;
        let event = match packet.msg_type {
            CtosType::Response => Event::Response {
                from,
                data: packet.body.clone(),
            },
            CtosType::UpdateDeck => Event::UpdateDeck {
                from,
                deck: DeckList::decode(&packet.body)?,
            },
            CtosType::HandResult => Event::HandResult {
                from,
                hand: packet.read_fixed::<OneByte>()?.0,
            },
            CtosType::TpResult => Event::TpResult {
                from,
                go_first: packet.read_fixed::<OneByte>()?.0 != 0,
            },
            CtosType::LeaveGame => Event::Leave { from },
            CtosType::Surrender => Event::Surrender { from },
            CtosType::TimeConfirm => Event::TimeConfirm { from },
            CtosType::Chat => Event::Chat {
                from,
                text: ChatText::decode(&packet.body)?.0,
            },
            CtosType::HsToDuelist => Event::ToDuelist { from },
            CtosType::HsToObserver => Event::ToObserver { from },
            CtosType::HsReady => Event::Ready { from },
            CtosType::HsNotReady => Event::NotReady { from },
            CtosType::HsKick => Event::Kick {
                from,
                position: packet.read_fixed::<OneByte>()?.0,
            },
            CtosType::HsStart => Event::Start { from },
            CtosType::PlayerInfo | CtosType::CreateGame | CtosType::JoinGame => {
                tracing::debug!(client_id = %from, msg_type = ?packet.msg_type, "ignored inside a room");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    /// The room-side handle for this connection. Requires `PLAYER_INFO`
    /// to have arrived first.
    fn client(&self) -> Result<Client, DuelhallError> {
        let name = self
            .name
            .as_deref()
            .ok_or_else(|| DuelhallError::UnexpectedPacket("create or join before PLAYER_INFO".into()))?;
        Ok(Client::new(self.client_id, name, self.sender.clone()))
    }

    fn send_error(&self, kind: ErrorKind, code: u32) {
        match (ServerMessage::ErrorMsg { kind, code }).encode() {
            Ok(bytes) => {
                let _ = self.sender.send(ClientOutbound::Packet(bytes.into()));
            }
            Err(error) => tracing::error!(client_id = %self.client_id, %error, "failed to encode error"),
        }
    }

    /// Tells the current room, if any, that this client is gone.
    async fn leave_room(&mut self) {
        if let Some(room) = self.room.take() {
            // The room may already be closing; nothing to do then.
            let _ = room.leave(self.client_id).await;
        }
    }
}
