//! The room state machine.
//!
//! [`Room`] is synchronous: it applies one [`Event`] at a time and never
//! awaits. The actor in `actor.rs` owns it inside a Tokio task and feeds it
//! events in arrival order, so nothing here needs locking except the
//! duelist map, which the lobby listing also reads.
//!
//! Dispatch is an exhaustive `match` over [`State`]; each per-state handler
//! is an exhaustive `match` over [`Event`] that returns the next state, if
//! any. Pre-duel handlers live here; the match handlers (hands, turn
//! order, dueling, sidedecking) live in `duel.rs`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use duelhall_protocol::{
    ClientId, CreateGame, DeckList, ErrorKind, HostInfo, PlayerChange, RoomId, ServerMessage,
    join_error, type_change,
};
use serde::Serialize;

use crate::client::Client;
use crate::config::RoomOptions;
use crate::deck::{Deck, DeckError};
use crate::engine::DuelEngine;
use crate::replay::ReplaySink;
use crate::state::{Event, Phase, Seat, State};

/// Chat sender value used for spectators.
const SPECTATOR_CHAT_SENDER: u16 = 10;

// ---------------------------------------------------------------------------
// Shared room data
// ---------------------------------------------------------------------------

/// A seated duelist.
#[derive(Debug, Clone)]
pub(crate) struct Duelist {
    pub(crate) client: Client,
    /// Latest deck submitted.
    pub(crate) deck: Option<Deck>,
    /// Deck locked in when the match started; side decks must match it.
    pub(crate) registered: Option<Deck>,
    pub(crate) ready: bool,
}

impl Duelist {
    fn new(client: Client) -> Self {
        Self {
            client,
            deck: None,
            registered: None,
            ready: false,
        }
    }
}

/// The part of a room other tasks may read while the actor runs.
pub(crate) struct RoomShared {
    pub(crate) id: RoomId,
    pub(crate) host_info: HostInfo,
    pub(crate) notes: String,
    pub(crate) passworded: bool,
    pub(crate) started: AtomicBool,
    pub(crate) closing: AtomicBool,
    duelists: Mutex<BTreeMap<Seat, Duelist>>,
}

impl RoomShared {
    pub(crate) fn new(id: RoomId, create: &CreateGame) -> Self {
        Self {
            id,
            host_info: create.host_info.clone(),
            notes: create.notes.clone(),
            passworded: !create.password.is_empty(),
            started: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            duelists: Mutex::new(BTreeMap::new()),
        }
    }

    /// Locks the duelist map. A panic while holding the lock leaves plain
    /// data behind, so a poisoned lock is still usable.
    pub(crate) fn duelists(&self) -> MutexGuard<'_, BTreeMap<Seat, Duelist>> {
        self.duelists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn properties(&self) -> RoomProperties {
        let duelists = self
            .duelists()
            .iter()
            .map(|(seat, d)| (*seat, d.client.name().to_owned()))
            .collect();
        RoomProperties {
            id: self.id,
            notes: self.notes.clone(),
            host_info: self.host_info.clone(),
            started: self.started.load(Ordering::Acquire),
            passworded: self.passworded,
            duelists,
        }
    }
}

/// Point-in-time view of a room for the lobby listing.
#[derive(Debug, Clone, Serialize)]
pub struct RoomProperties {
    pub id: RoomId,
    pub notes: String,
    pub host_info: HostInfo,
    pub started: bool,
    pub passworded: bool,
    pub duelists: Vec<(Seat, String)>,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

pub(crate) struct Room<E: DuelEngine> {
    pub(crate) shared: Arc<RoomShared>,
    pub(crate) engine: Arc<E>,
    pub(crate) options: Arc<RoomOptions>,
    pub(crate) replay_sink: Option<ReplaySink>,
    password: String,
    pub(crate) host: ClientId,
    pub(crate) state: State<E::Duel>,
    pub(crate) spectators: Vec<Client>,
    kicked: HashSet<ClientId>,
    /// Members dropped when the room closed. Late events from them are
    /// answered with another disconnect.
    departed: HashMap<ClientId, Client>,
    /// Duels won per room team in this match.
    pub(crate) wins: [u8; 2],
    pub(crate) duels_played: u32,
    /// Room team that chose turn order most recently.
    pub(crate) last_chooser: u8,
}

impl<E: DuelEngine> Room<E> {
    pub(crate) fn new(
        shared: Arc<RoomShared>,
        engine: Arc<E>,
        options: Arc<RoomOptions>,
        replay_sink: Option<ReplaySink>,
        host: ClientId,
        password: String,
    ) -> Self {
        Self {
            shared,
            engine,
            options,
            replay_sink,
            password,
            host,
            state: State::AcceptingPlayers,
            spectators: Vec::new(),
            kicked: HashSet::new(),
            departed: HashMap::new(),
            wins: [0, 0],
            duels_played: 0,
            last_chooser: 0,
        }
    }

    pub(crate) fn id(&self) -> RoomId {
        self.shared.id
    }

    pub(crate) fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub(crate) fn host_info(&self) -> &HostInfo {
        &self.shared.host_info
    }

    /// Applies one event.
    pub(crate) fn handle(&mut self, event: Event) {
        // The state is moved out for the duration of the handler so the
        // handler can borrow both it and the rest of the room.
        let mut state = std::mem::replace(&mut self.state, State::Closing);
        let phase = state.phase();
        let next = match &mut state {
            State::AcceptingPlayers | State::TeamDeckCheck => self.lobby_event(phase, event),
            State::RockPaperScissor(rps) => self.rps_event(rps, event),
            State::ChoosingTurn(choosing) => self.choosing_turn_event(choosing, event),
            State::Dueling(duel) => self.dueling_event(duel, event),
            State::Sidedecking(siding) => self.sidedecking_event(siding, event),
            State::Closing => self.closing_event(event),
        };
        self.state = state;
        if let Some(next) = next {
            self.transition(next);
        }
    }

    fn transition(&mut self, next: State<E::Duel>) {
        let from = self.state.phase();
        let to = next.phase();
        tracing::info!(room_id = %self.id(), %from, %to, "room state changed");
        self.state = next;
        if to.is_started() {
            self.shared.started.store(true, Ordering::Release);
        }
        if to == Phase::Closing && from != Phase::Closing {
            self.close();
        }
    }

    /// Entry action of `Closing`: drop every client.
    fn close(&mut self) {
        self.shared.closing.store(true, Ordering::Release);
        // Disconnect outside the lock.
        let duelists: Vec<Client> = std::mem::take(&mut *self.shared.duelists())
            .into_values()
            .map(|d| d.client)
            .collect();
        let spectators = std::mem::take(&mut self.spectators);
        for client in duelists.into_iter().chain(spectators) {
            client.disconnect();
            self.departed.insert(client.id(), client);
        }
        tracing::info!(room_id = %self.id(), "room closed");
    }

    /// Closes the room from outside, e.g. on server shutdown.
    pub(crate) fn shutdown(&mut self) {
        if self.phase() == Phase::Closing {
            return;
        }
        if self.phase().is_started() {
            self.broadcast(&ServerMessage::DuelEnd);
        }
        self.transition(State::Closing);
    }

    pub(crate) fn closing_event(&mut self, event: Event) -> Option<State<E::Duel>> {
        let origin = event.origin();
        match event {
            Event::Join { client, .. } => {
                tracing::debug!(room_id = %self.id(), client_id = %origin, "join refused, room closing");
                client.disconnect();
            }
            Event::Leave { .. } => {
                if let Some(client) = self.departed.remove(&origin) {
                    client.disconnect();
                }
            }
            Event::Chat { .. }
            | Event::ToDuelist { .. }
            | Event::ToObserver { .. }
            | Event::Ready { .. }
            | Event::NotReady { .. }
            | Event::Kick { .. }
            | Event::Start { .. }
            | Event::UpdateDeck { .. }
            | Event::HandResult { .. }
            | Event::TpResult { .. }
            | Event::Response { .. }
            | Event::Surrender { .. }
            | Event::TimeConfirm { .. } => {
                if let Some(client) = self.departed.get(&origin) {
                    tracing::debug!(room_id = %self.id(), client_id = %origin, "event after close");
                    client.disconnect();
                }
            }
        }
        None
    }

    // -----------------------------------------------------------------------
    // Membership helpers
    // -----------------------------------------------------------------------

    pub(crate) fn seat_of(&self, id: ClientId) -> Option<Seat> {
        self.shared
            .duelists()
            .iter()
            .find(|(_, d)| d.client.id() == id)
            .map(|(seat, _)| *seat)
    }

    pub(crate) fn client_at(&self, seat: Seat) -> Option<Client> {
        self.shared.duelists().get(&seat).map(|d| d.client.clone())
    }

    /// Whether `id` is seated or watching.
    pub(crate) fn is_member(&self, id: ClientId) -> bool {
        self.seat_of(id).is_some() || self.is_spectator(id)
    }

    fn is_spectator(&self, id: ClientId) -> bool {
        self.spectators.iter().any(|c| c.id() == id)
    }

    fn remove_spectator(&mut self, id: ClientId) -> Option<Client> {
        let index = self.spectators.iter().position(|c| c.id() == id)?;
        Some(self.spectators.remove(index))
    }

    fn free_seat(&self) -> Option<Seat> {
        let duelists = self.shared.duelists();
        Seat::all(self.host_info()).find(|seat| !duelists.contains_key(seat))
    }

    fn all_seats_filled(&self) -> bool {
        self.free_seat().is_none()
    }

    /// Snapshot of seated clients, so sends happen outside the lock.
    pub(crate) fn duelist_clients(&self) -> Vec<(Seat, Client)> {
        self.shared
            .duelists()
            .iter()
            .map(|(seat, d)| (*seat, d.client.clone()))
            .collect()
    }

    pub(crate) fn position(&self, seat: Seat) -> u8 {
        seat.position(self.host_info())
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    pub(crate) fn broadcast(&self, msg: &ServerMessage) {
        self.broadcast_except(None, msg);
    }

    fn broadcast_except(&self, skip: Option<ClientId>, msg: &ServerMessage) {
        let packet: Arc<[u8]> = match msg.encode() {
            Ok(bytes) => bytes.into(),
            Err(error) => {
                tracing::error!(room_id = %self.id(), %error, "failed to encode broadcast");
                return;
            }
        };
        let duelists = self.duelist_clients();
        let everyone = duelists.iter().map(|(_, c)| c).chain(&self.spectators);
        for client in everyone.filter(|c| Some(c.id()) != skip) {
            client.send(Arc::clone(&packet));
        }
    }

    pub(crate) fn send_spectators(&self, msg: &ServerMessage) {
        for client in &self.spectators {
            client.send_msg(msg);
        }
    }

    fn watch_change(&self) -> ServerMessage {
        ServerMessage::HsWatchChange {
            spectators: u16::try_from(self.spectators.len()).unwrap_or(u16::MAX),
        }
    }

    // -----------------------------------------------------------------------
    // Joining / leaving
    // -----------------------------------------------------------------------

    /// Checks a join request and adds the client, seated if `allow_seat`
    /// and a seat is free, otherwise as a spectator.
    ///
    /// Returns `None` if the client was refused, else the seat taken.
    fn admit(&mut self, client: Client, password: &str, allow_seat: bool) -> Option<Option<Seat>> {
        let id = client.id();
        let refuse = |code| {
            client.send_msg(&ServerMessage::ErrorMsg {
                kind: ErrorKind::Join,
                code,
            });
        };
        if self.kicked.contains(&id) {
            refuse(join_error::REFUSED);
            return None;
        }
        if self.shared.passworded && password != self.password {
            tracing::debug!(room_id = %self.id(), client_id = %id, "wrong room password");
            refuse(join_error::WRONG_PASSWORD);
            return None;
        }
        if self.seat_of(id).is_some() || self.is_spectator(id) {
            return None;
        }

        let seat = if allow_seat { self.free_seat() } else { None };
        match seat {
            Some(seat) => {
                self.shared.duelists().insert(seat, Duelist::new(client.clone()));
            }
            None if self.spectators.len() >= self.options.max_spectators => {
                refuse(join_error::REFUSED);
                return None;
            }
            None => self.spectators.push(client.clone()),
        }
        tracing::info!(
            room_id = %self.id(),
            client_id = %id,
            name = client.name(),
            seat = ?seat,
            "client joined"
        );

        // The joiner's view of the room.
        client.send_msg(&ServerMessage::JoinGame(self.host_info().clone()));
        let position = seat.map_or(type_change::OBSERVER, |s| self.position(s));
        client.send_msg(&ServerMessage::TypeChange(type_change::byte(id == self.host, position)));
        let seated: Vec<(Seat, String, bool)> = self
            .shared
            .duelists()
            .iter()
            .map(|(seat, d)| (*seat, d.client.name().to_owned(), d.ready))
            .collect();
        for (other, name, ready) in seated {
            let position = self.position(other);
            client.send_msg(&ServerMessage::HsPlayerEnter { name, position });
            if ready {
                client.send_msg(&ServerMessage::HsPlayerChange {
                    position,
                    change: PlayerChange::Ready,
                });
            }
        }
        if !self.spectators.is_empty() {
            client.send_msg(&self.watch_change());
        }

        // Everyone else's view of the joiner.
        let announcement = match seat {
            Some(seat) => ServerMessage::HsPlayerEnter {
                name: client.name().to_owned(),
                position: self.position(seat),
            },
            None => self.watch_change(),
        };
        self.broadcast_except(Some(id), &announcement);
        Some(seat)
    }

    /// Joins after the match has started: spectators only, caught up on
    /// everything public so far.
    pub(crate) fn join_spectator(&mut self, client: Client, password: &str, catch_up: &[Arc<[u8]>]) {
        if self.admit(client.clone(), password, false).is_none() {
            return;
        }
        client.send_msg(&ServerMessage::DuelStart);
        for packet in catch_up {
            client.send(Arc::clone(packet));
        }
    }

    /// Removes a leaving client. Returns the room team of a departing
    /// duelist; spectators and strangers yield `None`.
    pub(crate) fn remove_member(&mut self, id: ClientId) -> Option<u8> {
        if let Some(seat) = self.seat_of(id) {
            let duelist = self.shared.duelists().remove(&seat);
            self.broadcast(&ServerMessage::HsPlayerChange {
                position: self.position(seat),
                change: PlayerChange::Leave,
            });
            if let Some(duelist) = duelist {
                duelist.client.disconnect();
            }
            tracing::info!(room_id = %self.id(), client_id = %id, %seat, "duelist left");
            return Some(seat.team);
        }
        if let Some(client) = self.remove_spectator(id) {
            self.broadcast(&self.watch_change());
            client.disconnect();
            tracing::info!(room_id = %self.id(), client_id = %id, "spectator left");
        }
        None
    }

    pub(crate) fn chat(&self, from: ClientId, text: String) {
        let sender = match self.seat_of(from) {
            Some(seat) => u16::from(self.position(seat)),
            None if self.is_spectator(from) => SPECTATOR_CHAT_SENDER,
            None => return,
        };
        self.broadcast(&ServerMessage::Chat { sender, text });
    }

    // -----------------------------------------------------------------------
    // AcceptingPlayers / TeamDeckCheck
    // -----------------------------------------------------------------------

    fn lobby_event(&mut self, phase: Phase, event: Event) -> Option<State<E::Duel>> {
        match event {
            Event::Join { client, password } => {
                self.admit(client, &password, true);
            }
            Event::Leave { from } => {
                self.remove_member(from);
                if from == self.host {
                    tracing::info!(room_id = %self.id(), "host left before the duel");
                    return Some(State::Closing);
                }
            }
            Event::Chat { from, text } => self.chat(from, text),
            Event::ToDuelist { from } => self.move_to_duelist(from),
            Event::ToObserver { from } => self.move_to_observer(from),
            Event::Ready { from } => self.set_ready(from, true),
            Event::NotReady { from } => self.set_ready(from, false),
            Event::Kick { from, position } => self.kick(from, position),
            Event::UpdateDeck { from, deck } => self.update_deck(from, deck),
            Event::Start { from } => {
                if phase == Phase::TeamDeckCheck && from == self.host && self.all_ready() {
                    return Some(self.begin_rps());
                }
                tracing::debug!(room_id = %self.id(), client_id = %from, %phase, "start refused");
            }
            Event::HandResult { .. }
            | Event::TpResult { .. }
            | Event::Response { .. }
            | Event::Surrender { .. }
            | Event::TimeConfirm { .. } => {}
        }

        let full = self.all_seats_filled();
        match phase {
            Phase::AcceptingPlayers if full => Some(State::TeamDeckCheck),
            Phase::TeamDeckCheck if !full => Some(State::AcceptingPlayers),
            _ => None,
        }
    }

    fn move_to_duelist(&mut self, from: ClientId) {
        if self.is_spectator(from) {
            let Some(seat) = self.free_seat() else {
                return;
            };
            let Some(client) = self.remove_spectator(from) else {
                return;
            };
            self.seat_client(client, seat);
            self.broadcast(&self.watch_change());
            return;
        }

        // A seated, unready duelist moves to the next free seat.
        let Some(current) = self.seat_of(from) else {
            return;
        };
        let seats: Vec<Seat> = Seat::all(self.host_info()).collect();
        let start = seats.iter().position(|s| *s == current).unwrap_or(0);
        let next = {
            let duelists = self.shared.duelists();
            if duelists.get(&current).is_some_and(|d| d.ready) {
                return;
            }
            seats
                .iter()
                .cycle()
                .skip(start + 1)
                .take(seats.len() - 1)
                .find(|s| !duelists.contains_key(s))
                .copied()
        };
        let Some(next) = next else {
            return;
        };
        let Some(duelist) = self.shared.duelists().remove(&current) else {
            return;
        };
        self.broadcast(&ServerMessage::HsPlayerChange {
            position: self.position(current),
            change: PlayerChange::Leave,
        });
        let client = duelist.client.clone();
        self.shared.duelists().insert(next, duelist);
        self.announce_seat(&client, next);
    }

    fn seat_client(&mut self, client: Client, seat: Seat) {
        self.shared.duelists().insert(seat, Duelist::new(client.clone()));
        self.announce_seat(&client, seat);
    }

    fn announce_seat(&self, client: &Client, seat: Seat) {
        let position = self.position(seat);
        client.send_msg(&ServerMessage::TypeChange(type_change::byte(
            client.id() == self.host,
            position,
        )));
        self.broadcast(&ServerMessage::HsPlayerEnter {
            name: client.name().to_owned(),
            position,
        });
        tracing::debug!(room_id = %self.id(), client_id = %client.id(), %seat, "took seat");
    }

    fn move_to_observer(&mut self, from: ClientId) {
        let Some(seat) = self.seat_of(from) else {
            return;
        };
        let Some(duelist) = self.shared.duelists().remove(&seat) else {
            return;
        };
        let client = duelist.client;
        self.spectators.push(client.clone());
        self.broadcast(&ServerMessage::HsPlayerChange {
            position: self.position(seat),
            change: PlayerChange::Observe,
        });
        self.broadcast(&self.watch_change());
        client.send_msg(&ServerMessage::TypeChange(type_change::byte(
            from == self.host,
            type_change::OBSERVER,
        )));
    }

    fn update_deck(&mut self, from: ClientId, list: DeckList) {
        let Some(seat) = self.seat_of(from) else {
            return;
        };
        let engine = Arc::clone(&self.engine);
        let deck = Deck::from_list(list, |code| engine.is_extra_deck_card(code));
        if let Some(duelist) = self.shared.duelists().get_mut(&seat) {
            if !duelist.ready {
                duelist.deck = Some(deck);
            }
        }
    }

    fn set_ready(&mut self, from: ClientId, ready: bool) {
        let Some(seat) = self.seat_of(from) else {
            return;
        };
        let checked = {
            let mut duelists = self.shared.duelists();
            let Some(duelist) = duelists.get_mut(&seat) else {
                return;
            };
            if duelist.ready == ready {
                return;
            }
            let verdict = match (&duelist.deck, ready) {
                (_, false) => Ok(()),
                (None, true) => Err(DeckError::MainCount(0)),
                (Some(_), true) if self.shared.host_info.no_check_deck => Ok(()),
                (Some(deck), true) => deck.validate(&self.options.deck_limits),
            };
            if verdict.is_ok() {
                duelist.ready = ready;
            }
            verdict.map_err(|error| (error, duelist.client.clone()))
        };
        match checked {
            Ok(()) => self.broadcast(&ServerMessage::HsPlayerChange {
                position: self.position(seat),
                change: if ready {
                    PlayerChange::Ready
                } else {
                    PlayerChange::NotReady
                },
            }),
            Err((error, client)) => {
                tracing::warn!(room_id = %self.id(), client_id = %from, %error, "deck refused");
                client.send_msg(&ServerMessage::ErrorMsg {
                    kind: ErrorKind::Deck,
                    code: error.code(),
                });
            }
        }
    }

    fn kick(&mut self, from: ClientId, position: u8) {
        if from != self.host {
            return;
        }
        let Some(seat) = Seat::from_position(position, self.host_info()) else {
            return;
        };
        let target = match self.client_at(seat) {
            Some(target) if target.id() != self.host => target,
            _ => return,
        };
        self.kicked.insert(target.id());
        tracing::info!(room_id = %self.id(), client_id = %target.id(), %seat, "duelist kicked");
        self.remove_member(target.id());
    }

    fn all_ready(&self) -> bool {
        let duelists = self.shared.duelists();
        Seat::all(self.host_info()).all(|seat| {
            duelists
                .get(&seat)
                .is_some_and(|d| d.ready && d.deck.is_some())
        })
    }
}
