//! Room actor: the Tokio task that owns a [`Room`] state machine.
//!
//! Each room runs in its own task and is only reachable through its
//! command channel, so events for one room are applied strictly one at a
//! time and in arrival order. [`RoomHandle`] is the outside world's end of
//! that channel.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use duelhall_protocol::{ClientId, RoomId};
use tokio::sync::{mpsc, oneshot};

use crate::client::Client;
use crate::config::RoomOptions;
use crate::engine::DuelEngine;
use crate::error::RoomError;
use crate::replay::ReplaySink;
use crate::room::{Room, RoomProperties, RoomShared};
use crate::state::{Event, Phase};

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    /// Apply a client event.
    Event(Event),

    /// Admit a client, replying whether it is now a member.
    Join {
        client: Client,
        password: String,
        reply: oneshot::Sender<bool>,
    },

    /// Request a snapshot of the room's bookkeeping.
    Info { reply: oneshot::Sender<RoomInfo> },

    /// Stop the actor. The room closes first, disconnecting everyone.
    Shutdown,
}

/// A snapshot of room bookkeeping (not the duel itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub phase: Phase,
    pub duelists: usize,
    pub spectators: usize,
}

/// Handle to a running room actor.
///
/// Cheap to clone: a channel sender plus the room's shared data. The
/// lobby keeps one per room and each connection in the room holds another.
#[derive(Clone)]
pub struct RoomHandle {
    shared: Arc<RoomShared>,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn id(&self) -> RoomId {
        self.shared.id
    }

    /// Delivers an event to the room.
    pub async fn send(&self, event: Event) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Event(event))
            .await
            .map_err(|_| RoomError::Unavailable(self.id()))
    }

    /// Asks the room to admit `client` and waits for the verdict.
    ///
    /// The client also hears the outcome as packets: the room state on
    /// success, an `ERROR_MSG` or a disconnect on refusal.
    pub async fn join(&self, client: Client, password: impl Into<String>) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
                client,
                password: password.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.id()))?;
        match reply_rx.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RoomError::JoinRefused(self.id())),
            Err(_) => Err(RoomError::Unavailable(self.id())),
        }
    }

    pub async fn leave(&self, client_id: ClientId) -> Result<(), RoomError> {
        self.send(Event::Leave { from: client_id }).await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Info { reply: reply_tx })
            .await
            .map_err(|_| RoomError::Unavailable(self.id()))?;
        reply_rx.await.map_err(|_| RoomError::Unavailable(self.id()))
    }

    /// Tells the room to close and its actor to stop.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.id()))
    }

    /// Whether the room is closing or its actor is gone.
    pub fn is_closed(&self) -> bool {
        self.shared.closing.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Reads the listing view without going through the actor.
    pub fn properties(&self) -> RoomProperties {
        self.shared.properties()
    }
}

struct RoomActor<E: DuelEngine> {
    room: Room<E>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<E: DuelEngine> RoomActor<E> {
    async fn run(mut self, host: Client, password: String) {
        let room_id = self.room.id();
        tracing::info!(%room_id, host = %host.id(), "room actor started");
        self.room.handle(Event::Join {
            client: host,
            password,
        });

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Event(event) => self.room.handle(event),
                RoomCommand::Join {
                    client,
                    password,
                    reply,
                } => {
                    let client_id = client.id();
                    self.room.handle(Event::Join { client, password });
                    let _ = reply.send(self.room.is_member(client_id));
                }
                RoomCommand::Info { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::Shutdown => {
                    tracing::info!(%room_id, "room shutting down");
                    self.room.shutdown();
                    break;
                }
            }
        }

        tracing::info!(%room_id, "room actor stopped");
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room.id(),
            phase: self.room.phase(),
            duelists: self.room.duelist_clients().len(),
            spectators: self.room.spectators.len(),
        }
    }
}

/// Spawns a room actor with `host` as its first member.
pub(crate) fn spawn_room<E: DuelEngine>(
    shared: Arc<RoomShared>,
    engine: Arc<E>,
    options: Arc<RoomOptions>,
    replay_sink: Option<ReplaySink>,
    host: Client,
    password: String,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(options.command_buffer.max(1));
    let room = Room::new(
        Arc::clone(&shared),
        engine,
        options,
        replay_sink,
        host.id(),
        password.clone(),
    );
    let actor = RoomActor { room, receiver: rx };
    tokio::spawn(actor.run(host, password));
    RoomHandle { shared, sender: tx }
}
