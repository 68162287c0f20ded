//! Match phases: picking hands, choosing turn order, dueling and
//! sidedecking, plus driving the engine while a duel runs.

use std::collections::BTreeSet;
use std::sync::Arc;

use duelhall_protocol::engine::{
    EngineMessageType, LOCATION_DECK, LOCATION_EXTRA, OBSERVER_FLAG, StartInfo, engine_message_type,
    game_msg, make_start_msg, split_to_msgs,
};
use duelhall_protocol::{CoreMessageError, ErrorKind, OutOfRange, ServerMessage};

use crate::client::Client;
use crate::deck::{Deck, DeckError};
use crate::distribute::Audience;
use crate::engine::{Duel, DuelEngine, DuelOptions, DuelStatus, NewCard, TeamOptions};
use crate::error::{EngineError, RoomError};
use crate::replay::{FinishedReplay, Replay};
use crate::room::Room;
use crate::state::{ChoosingTurnState, DuelState, Event, RpsState, Seat, SidedeckState, State};

/// Face-down defense, the position deck cards start in.
const POS_FACEDOWN_DEFENSE: u32 = 0x8;

/// `WIN` player value meaning the duel was drawn.
const WIN_DRAW: u8 = 2;

/// `WIN` reason sent when a duelist surrenders.
const WIN_REASON_SURRENDER: u8 = 0;

/// Whether hand `a` beats hand `b` (1 scissors, 2 rock, 3 paper).
fn hand_beats(a: u8, b: u8) -> bool {
    (a + 3 - b) % 3 == 1
}

fn byte_at(msg: &[u8], offset: usize) -> Result<u8, CoreMessageError> {
    msg.get(offset).copied().ok_or(CoreMessageError::OutOfRange(OutOfRange {
        offset,
        needed: 1,
        len: msg.len(),
    }))
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

impl<E: DuelEngine> Room<E> {
    // -----------------------------------------------------------------------
    // RockPaperScissor
    // -----------------------------------------------------------------------

    /// Locks in every duelist's deck and asks both team leaders for a hand.
    pub(crate) fn begin_rps(&mut self) -> State<E::Duel> {
        for duelist in self.shared.duelists().values_mut() {
            duelist.registered = duelist.deck.clone();
        }
        tracing::info!(room_id = %self.id(), "match started");
        self.broadcast(&ServerMessage::DuelStart);
        self.send_select_hand();
        State::RockPaperScissor(RpsState::default())
    }

    fn send_select_hand(&self) {
        for team in 0..2 {
            if let Some(leader) = self.client_at(Seat::new(team, 0)) {
                leader.send_msg(&ServerMessage::SelectHand);
            }
        }
    }

    pub(crate) fn rps_event(&mut self, rps: &mut RpsState, event: Event) -> Option<State<E::Duel>> {
        match event {
            Event::Join { client, password } => self.join_spectator(client, &password, &[]),
            Event::Leave { from } => {
                if self.remove_member(from).is_some() {
                    return Some(self.end_match());
                }
            }
            Event::Chat { from, text } => self.chat(from, text),
            Event::HandResult { from, hand } => {
                let seat = self.seat_of(from)?;
                let team = usize::from(seat.team);
                if seat.slot != 0 || !(1..=3).contains(&hand) || rps.picks[team].is_some() {
                    return None;
                }
                rps.picks[team] = Some(hand);
                if let [Some(a), Some(b)] = rps.picks {
                    self.send_hand_result(a, b);
                    if a == b {
                        tracing::debug!(room_id = %self.id(), hand = a, "hands tied");
                        rps.picks = [None, None];
                        self.send_select_hand();
                        return None;
                    }
                    let winner = if hand_beats(a, b) { 0 } else { 1 };
                    return Some(self.begin_choosing_turn(winner));
                }
            }
            Event::ToDuelist { .. }
            | Event::ToObserver { .. }
            | Event::Ready { .. }
            | Event::NotReady { .. }
            | Event::Kick { .. }
            | Event::Start { .. }
            | Event::UpdateDeck { .. }
            | Event::TpResult { .. }
            | Event::Response { .. }
            | Event::Surrender { .. }
            | Event::TimeConfirm { .. } => {}
        }
        None
    }

    /// Each team sees its own hand first.
    fn send_hand_result(&self, team0: u8, team1: u8) {
        for (seat, client) in self.duelist_clients() {
            let (first, second) = if seat.team == 0 {
                (team0, team1)
            } else {
                (team1, team0)
            };
            client.send_msg(&ServerMessage::HandResult { first, second });
        }
        self.send_spectators(&ServerMessage::HandResult {
            first: team0,
            second: team1,
        });
    }

    // -----------------------------------------------------------------------
    // ChoosingTurn
    // -----------------------------------------------------------------------

    pub(crate) fn begin_choosing_turn(&mut self, chooser: u8) -> State<E::Duel> {
        self.last_chooser = chooser;
        if let Some(leader) = self.client_at(Seat::new(chooser, 0)) {
            leader.send_msg(&ServerMessage::SelectTp);
        }
        State::ChoosingTurn(ChoosingTurnState { chooser })
    }

    pub(crate) fn choosing_turn_event(
        &mut self,
        choosing: &mut ChoosingTurnState,
        event: Event,
    ) -> Option<State<E::Duel>> {
        match event {
            Event::Join { client, password } => self.join_spectator(client, &password, &[]),
            Event::Leave { from } => {
                if self.remove_member(from).is_some() {
                    return Some(self.end_match());
                }
            }
            Event::Chat { from, text } => self.chat(from, text),
            Event::TpResult { from, go_first } => {
                if self.seat_of(from) != Some(Seat::new(choosing.chooser, 0)) {
                    return None;
                }
                let first_team = if go_first {
                    choosing.chooser
                } else {
                    1 - choosing.chooser
                };
                return Some(self.begin_duel(first_team));
            }
            Event::ToDuelist { .. }
            | Event::ToObserver { .. }
            | Event::Ready { .. }
            | Event::NotReady { .. }
            | Event::Kick { .. }
            | Event::Start { .. }
            | Event::UpdateDeck { .. }
            | Event::HandResult { .. }
            | Event::Response { .. }
            | Event::Surrender { .. }
            | Event::TimeConfirm { .. } => {}
        }
        None
    }

    // -----------------------------------------------------------------------
    // Dueling
    // -----------------------------------------------------------------------

    fn begin_duel(&mut self, first_team: u8) -> State<E::Duel> {
        let mut duel = match self.start_duel(first_team) {
            Ok(duel) => duel,
            Err(error) => return self.fail(error),
        };
        match self.advance(&mut duel) {
            Ok(false) => State::Dueling(Box::new(duel)),
            Ok(true) => self.finish_duel(&mut duel),
            Err(error) => self.fail(error),
        }
    }

    /// Creates the engine duel, loads every deck and sends the start
    /// messages.
    fn start_duel(&mut self, first_team: u8) -> Result<DuelState<E::Duel>, RoomError> {
        let info = self.host_info().clone();
        let seed: [u64; 4] = rand::random();
        let team = TeamOptions {
            starting_lp: info.starting_lp,
            starting_hand: info.starting_hand.into(),
            draw_count: info.draw_count.into(),
        };
        let options = DuelOptions {
            seed,
            flags: info.duel_flags.into(),
            teams: [team; 2],
        };
        let mut duel = self.engine.create_duel(&options)?;

        let decks: Vec<(Seat, Deck)> = self
            .shared
            .duelists()
            .iter()
            .map(|(seat, d)| (*seat, d.deck.clone().unwrap_or_default()))
            .collect();
        for (seat, deck) in &decks {
            let engine_team = seat.team ^ first_team;
            let sections = [(&deck.main, LOCATION_DECK), (&deck.extra, LOCATION_EXTRA)];
            for (codes, location) in sections {
                for &code in codes {
                    duel.add_card(&NewCard {
                        team: engine_team,
                        duelist: seat.slot,
                        code,
                        controller: engine_team,
                        location,
                        sequence: 0,
                        position: POS_FACEDOWN_DEFENSE,
                    })?;
                }
            }
        }
        duel.start()?;

        let mut deck_size = [0; 2];
        let mut extra_size = [0; 2];
        for team in 0..2u8 {
            deck_size[usize::from(team)] = clamp_u16(duel.query_count(team, LOCATION_DECK)?);
            extra_size[usize::from(team)] = clamp_u16(duel.query_count(team, LOCATION_EXTRA)?);
        }
        let start_msg = |team| {
            make_start_msg(&StartInfo {
                team,
                duel_rule: info.duel_rule,
                lp: [info.starting_lp; 2],
                deck_size,
                extra_size,
            })
        };

        for (seat, client) in self.duelist_clients() {
            let packet: Arc<[u8]> = game_msg(&start_msg(seat.team ^ first_team))?.into();
            client.send(packet);
        }
        let spectator_start = start_msg(OBSERVER_FLAG);
        let spectator_packet: Arc<[u8]> = game_msg(&spectator_start)?.into();
        for client in &self.spectators {
            client.send(Arc::clone(&spectator_packet));
        }
        let replay = self.options.record_replays.then(|| {
            let mut replay = Replay::new();
            replay.record(&spectator_start);
            replay
        });

        tracing::info!(room_id = %self.id(), first_team, duel = self.duels_played + 1, "duel started");
        Ok(DuelState {
            duel,
            first_team,
            current: [0, 0],
            awaiting: None,
            last_prompted: None,
            outcome: None,
            seed,
            replay,
            spectator_cache: vec![spectator_packet],
        })
    }

    /// Runs the engine until it waits on a response or ends the duel,
    /// distributing everything it produces along the way.
    ///
    /// Returns `true` once the duel has ended.
    fn advance(&self, duel: &mut DuelState<E::Duel>) -> Result<bool, RoomError> {
        let duelists = self.duelist_clients();
        for _ in 0..self.options.max_engine_steps {
            let status = duel.duel.process()?;
            let buffer = duel.duel.get_messages()?;
            for msg in split_to_msgs(&buffer)? {
                self.dispatch(duel, &duelists, &msg)?;
            }
            match status {
                DuelStatus::End => return Ok(true),
                DuelStatus::Awaiting => {
                    let Some(seat) = duel.last_prompted else {
                        return Err(EngineError::CallFailed(
                            "engine is waiting without having prompted anyone".to_owned(),
                        )
                        .into());
                    };
                    duel.awaiting = Some(seat);
                    return Ok(false);
                }
                DuelStatus::Continue => {}
            }
        }
        Err(EngineError::Stalled(self.options.max_engine_steps).into())
    }

    fn dispatch(
        &self,
        duel: &mut DuelState<E::Duel>,
        duelists: &[(Seat, Client)],
        msg: &[u8],
    ) -> Result<(), RoomError> {
        let ty = engine_message_type(msg)?;
        if let Some(replay) = duel.replay.as_mut() {
            replay.record(msg);
        }
        let audience = Audience {
            duelists,
            spectators: &self.spectators,
            current: duel.current,
            first_team: duel.first_team,
            view: self.options.spectator_view,
        };

        if ty == EngineMessageType::Retry {
            let seat = duel
                .last_prompted
                .ok_or(CoreMessageError::NoReceivingTeam(ty as u8))?;
            tracing::debug!(room_id = %self.id(), %seat, "engine asked for a retry");
            let packet: Arc<[u8]> = game_msg(msg)?.into();
            audience.send_to_seat(seat, &packet);
            return Ok(());
        }

        let delivery = audience.distribute(msg)?;
        match ty {
            EngineMessageType::Win => {
                let player = byte_at(msg, 1)?;
                duel.outcome = Some(match player {
                    WIN_DRAW => None,
                    0 | 1 => Some(audience.room_team(player)),
                    other => return Err(CoreMessageError::InvalidTeam(other).into()),
                });
            }
            EngineMessageType::TagSwap => {
                let room_team = audience.room_team(byte_at(msg, 1)? & 1);
                let size = self.host_info().team_size(room_team).max(1);
                let slot = &mut duel.current[usize::from(room_team)];
                *slot = (*slot + 1) % size;
            }
            _ => {}
        }
        if let Some(seat) = delivery.prompted {
            duel.last_prompted = Some(seat);
        }
        if let Some(packet) = delivery.spectator_packet {
            duel.spectator_cache.push(packet);
        }
        Ok(())
    }

    pub(crate) fn dueling_event(
        &mut self,
        duel: &mut DuelState<E::Duel>,
        event: Event,
    ) -> Option<State<E::Duel>> {
        match event {
            Event::Join { client, password } => {
                self.join_spectator(client, &password, &duel.spectator_cache);
            }
            Event::Leave { from } => {
                if let Some(team) = self.remove_member(from) {
                    tracing::info!(room_id = %self.id(), team, "duelist left mid-duel");
                    return Some(self.end_match());
                }
            }
            Event::Chat { from, text } => self.chat(from, text),
            Event::Response { from, data } => {
                let Some(seat) = duel.awaiting else {
                    tracing::debug!(room_id = %self.id(), client_id = %from, "response while engine busy");
                    return None;
                };
                if self.seat_of(from) != Some(seat) {
                    tracing::warn!(room_id = %self.id(), client_id = %from, "response from a duelist who wasn't asked");
                    return None;
                }
                duel.awaiting = None;
                let result = duel
                    .duel
                    .set_response(&data)
                    .map_err(RoomError::from)
                    .and_then(|()| self.advance(duel));
                return match result {
                    Ok(false) => None,
                    Ok(true) => Some(self.finish_duel(duel)),
                    Err(error) => Some(self.fail(error)),
                };
            }
            Event::Surrender { from } => {
                let seat = self.seat_of(from)?;
                let winner = 1 - seat.team;
                tracing::info!(room_id = %self.id(), client_id = %from, "duelist surrendered");
                let engine_winner = winner ^ duel.first_team;
                let win = [EngineMessageType::Win as u8, engine_winner, WIN_REASON_SURRENDER];
                let duelists = self.duelist_clients();
                if let Err(error) = self.dispatch(duel, &duelists, &win) {
                    return Some(self.fail(error));
                }
                return Some(self.finish_duel(duel));
            }
            Event::TimeConfirm { .. }
            | Event::ToDuelist { .. }
            | Event::ToObserver { .. }
            | Event::Ready { .. }
            | Event::NotReady { .. }
            | Event::Kick { .. }
            | Event::Start { .. }
            | Event::UpdateDeck { .. }
            | Event::HandResult { .. }
            | Event::TpResult { .. } => {}
        }
        None
    }

    /// Books the result of a finished duel and either ends the match or
    /// moves on to sidedecking.
    fn finish_duel(&mut self, duel: &mut DuelState<E::Duel>) -> State<E::Duel> {
        let winner = duel.outcome.flatten();
        self.duels_played += 1;
        if let Some(team) = winner {
            self.wins[usize::from(team)] += 1;
        }
        tracing::info!(
            room_id = %self.id(),
            winner = ?winner,
            wins = ?self.wins,
            "duel finished"
        );

        if let Some(replay) = duel.replay.take() {
            if let Some(sink) = &self.replay_sink {
                let finished = FinishedReplay {
                    room_id: self.id(),
                    duel_index: self.duels_played - 1,
                    seed: duel.seed,
                    duelists: self
                        .duelist_clients()
                        .into_iter()
                        .map(|(_, c)| c.name().to_owned())
                        .collect(),
                    stream: replay.into_bytes(),
                };
                if sink.send(finished).is_err() {
                    tracing::warn!(room_id = %self.id(), "replay sink closed, replay dropped");
                }
            }
        }

        let info = self.host_info();
        let best_of = info.best_of.clamp(1, 9) as u32;
        let needed = info.wins_needed();
        if self.wins.iter().any(|&w| w >= needed) || self.duels_played >= best_of {
            return self.end_match();
        }

        let chooser = match winner {
            Some(team) => 1 - team,
            None => self.last_chooser,
        };
        for (_, client) in self.duelist_clients() {
            client.send_msg(&ServerMessage::ChangeSide);
        }
        self.send_spectators(&ServerMessage::WaitingSide);
        State::Sidedecking(SidedeckState {
            chooser,
            done: BTreeSet::new(),
        })
    }

    pub(crate) fn end_match(&mut self) -> State<E::Duel> {
        tracing::info!(room_id = %self.id(), wins = ?self.wins, played = self.duels_played, "match over");
        self.broadcast(&ServerMessage::DuelEnd);
        State::Closing
    }

    /// The engine or the message stream broke; nothing can be salvaged.
    fn fail(&mut self, error: RoomError) -> State<E::Duel> {
        tracing::error!(room_id = %self.id(), %error, "duel aborted");
        self.broadcast(&ServerMessage::DuelEnd);
        State::Closing
    }

    // -----------------------------------------------------------------------
    // Sidedecking
    // -----------------------------------------------------------------------

    pub(crate) fn sidedecking_event(
        &mut self,
        siding: &mut SidedeckState,
        event: Event,
    ) -> Option<State<E::Duel>> {
        match event {
            Event::Join { client, password } => self.join_spectator(client, &password, &[]),
            Event::Leave { from } => {
                if self.remove_member(from).is_some() {
                    return Some(self.end_match());
                }
            }
            Event::Chat { from, text } => self.chat(from, text),
            Event::UpdateDeck { from, deck } => {
                let seat = self.seat_of(from)?;
                if siding.done.contains(&seat) {
                    return None;
                }
                let engine = Arc::clone(&self.engine);
                let deck = Deck::from_list(deck, |code| engine.is_extra_deck_card(code));
                let (legal, client) = {
                    let mut duelists = self.shared.duelists();
                    let duelist = duelists.get_mut(&seat)?;
                    let legal = duelist
                        .registered
                        .as_ref()
                        .is_some_and(|registered| deck.is_side_of(registered));
                    if legal {
                        duelist.deck = Some(deck);
                    }
                    (legal, duelist.client.clone())
                };
                if !legal {
                    tracing::warn!(room_id = %self.id(), client_id = %from, "illegal side deck");
                    client.send_msg(&ServerMessage::ErrorMsg {
                        kind: ErrorKind::Side,
                        code: DeckError::SideMismatch.code(),
                    });
                    return None;
                }
                client.send_msg(&ServerMessage::DuelStart);
                siding.done.insert(seat);
                let seats = Seat::all(self.host_info()).count();
                if siding.done.len() == seats {
                    self.send_spectators(&ServerMessage::DuelStart);
                    return Some(self.begin_choosing_turn(siding.chooser));
                }
            }
            Event::ToDuelist { .. }
            | Event::ToObserver { .. }
            | Event::Ready { .. }
            | Event::NotReady { .. }
            | Event::Kick { .. }
            | Event::Start { .. }
            | Event::HandResult { .. }
            | Event::TpResult { .. }
            | Event::Response { .. }
            | Event::Surrender { .. }
            | Event::TimeConfirm { .. } => {}
        }
        None
    }
}
