//! Lobby: the registry of live rooms.
//!
//! The lobby creates rooms, hands out their handles to connections that
//! want to join, and drops rooms once they have closed. It is shared
//! between connection tasks and the listing service, so the room map sits
//! behind a `std::sync::Mutex`; nothing awaits while holding it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use duelhall_protocol::{CreateGame, RoomId};

use crate::actor::{RoomHandle, spawn_room};
use crate::client::Client;
use crate::config::RoomOptions;
use crate::engine::DuelEngine;
use crate::replay::ReplaySink;
use crate::room::{RoomProperties, RoomShared};

pub struct Lobby<E: DuelEngine> {
    engine: Arc<E>,
    options: Arc<RoomOptions>,
    replay_sink: Option<ReplaySink>,
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
    next_id: AtomicU32,
}

impl<E: DuelEngine> Lobby<E> {
    pub fn new(engine: Arc<E>, options: RoomOptions) -> Self {
        Self {
            engine,
            options: Arc::new(options),
            replay_sink: None,
            rooms: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Rooms created from now on deliver finished replays to `sink`.
    pub fn with_replay_sink(mut self, sink: ReplaySink) -> Self {
        self.replay_sink = Some(sink);
        self
    }

    pub fn options(&self) -> &RoomOptions {
        &self.options
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<RoomId, RoomHandle>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a room with `host` as its first member and starts its actor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create_room(&self, host: Client, create: CreateGame) -> RoomHandle {
        let id = RoomId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(RoomShared::new(id, &create));
        let handle = spawn_room(
            shared,
            Arc::clone(&self.engine),
            Arc::clone(&self.options),
            self.replay_sink.clone(),
            host,
            create.password,
        );
        self.rooms().insert(id, handle.clone());
        tracing::info!(room_id = %id, notes = %create.notes, "room created");
        handle
    }

    /// Looks up a live room. Closed rooms are dropped on the way.
    pub fn get(&self, id: RoomId) -> Option<RoomHandle> {
        let mut rooms = self.rooms();
        match rooms.get(&id) {
            Some(handle) if handle.is_closed() => {
                rooms.remove(&id);
                tracing::debug!(room_id = %id, "pruned closed room");
                None
            }
            Some(handle) => Some(handle.clone()),
            None => None,
        }
    }

    /// Drops every room that has closed. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut rooms = self.rooms();
        let before = rooms.len();
        rooms.retain(|_, handle| !handle.is_closed());
        let removed = before - rooms.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = rooms.len(), "pruned closed rooms");
        }
        removed
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    /// Listing view of every live room, ordered by id.
    pub fn snapshot(&self) -> Vec<RoomProperties> {
        let handles: Vec<RoomHandle> = self
            .rooms()
            .values()
            .filter(|handle| !handle.is_closed())
            .cloned()
            .collect();
        let mut rooms: Vec<RoomProperties> = handles.iter().map(RoomHandle::properties).collect();
        rooms.sort_by_key(|room| room.id);
        rooms
    }

    /// Closes every room. Used on server shutdown.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = self.rooms().drain().map(|(_, handle)| handle).collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }
}
