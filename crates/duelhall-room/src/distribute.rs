//! Delivering engine messages to the right clients.
//!
//! Given a message and the room's current audience, [`Audience::distribute`]
//! classifies it, prepares each distinct copy exactly once (full, stripped
//! for engine team 0, stripped for engine team 1), frames it as a `GAME_MSG`
//! packet, and hands the shared packet to every recipient of that copy.
//! Members of one team therefore always receive byte-identical packets.
//!
//! Teams come in two numberings. *Room teams* are the seats' teams.
//! *Engine teams* are the engine's players, where engine team 0 moves
//! first. Whichever room team won the turn choice plays as engine team 0,
//! so every team byte read from a message is mapped through `first_team`.

use std::sync::Arc;

use duelhall_protocol::engine::{
    DistributionScope, EngineMessageType, distribution_scope, engine_message_type, game_msg,
    receiving_team, strip_for_team,
};

use crate::client::Client;
use crate::config::SpectatorView;
use crate::error::RoomError;
use crate::state::Seat;

/// Everyone who may receive a message, plus the routing context.
pub(crate) struct Audience<'a> {
    pub(crate) duelists: &'a [(Seat, Client)],
    pub(crate) spectators: &'a [Client],
    /// Active slot per room team.
    pub(crate) current: [u8; 2],
    /// Room team playing as engine team 0.
    pub(crate) first_team: u8,
    pub(crate) view: SpectatorView,
}

/// What happened to one distributed message.
#[derive(Debug)]
pub(crate) struct Delivery {
    /// Seat that was just asked to respond.
    pub(crate) prompted: Option<Seat>,
    /// The packet spectators received, if they received one.
    pub(crate) spectator_packet: Option<Arc<[u8]>>,
}

fn packet(msg: &[u8]) -> Result<Arc<[u8]>, RoomError> {
    Ok(game_msg(msg)?.into())
}

impl Audience<'_> {
    pub(crate) fn room_team(&self, engine_team: u8) -> u8 {
        engine_team ^ self.first_team
    }

    fn engine_team(&self, room_team: u8) -> u8 {
        room_team ^ self.first_team
    }

    pub(crate) fn current_seat(&self, room_team: u8) -> Seat {
        Seat::new(room_team, self.current[usize::from(room_team & 1)])
    }

    pub(crate) fn send_to_seat(&self, seat: Seat, packet: &Arc<[u8]>) {
        self.send_where(packet, |s| s == seat);
    }

    fn send_where(&self, packet: &Arc<[u8]>, mut include: impl FnMut(Seat) -> bool) {
        for (seat, client) in self.duelists {
            if include(*seat) {
                client.send(Arc::clone(packet));
            }
        }
    }

    fn send_spectators(&self, packet: &Arc<[u8]>) {
        for client in self.spectators {
            client.send(Arc::clone(packet));
        }
    }

    /// The copy spectators get of a message that is stripped for duelists.
    /// `per_engine_team` holds the copies already prepared for duelists.
    fn spectator_copy(
        &self,
        msg: &[u8],
        per_engine_team: [Option<&Arc<[u8]>>; 2],
    ) -> Result<Arc<[u8]>, RoomError> {
        match self.view {
            SpectatorView::Omniscient => packet(msg),
            SpectatorView::Team(team) => {
                let engine_team = self.engine_team(team & 1) & 1;
                match per_engine_team[usize::from(engine_team)] {
                    Some(copy) => Ok(Arc::clone(copy)),
                    None => packet(&strip_for_team(engine_team, msg)?),
                }
            }
            SpectatorView::Neutral => packet(&strip_for_team(1, &strip_for_team(0, msg)?)?),
        }
    }

    /// Sends `msg` to every client entitled to it, redacted as its scope
    /// requires.
    pub(crate) fn distribute(&self, msg: &[u8]) -> Result<Delivery, RoomError> {
        let scope = distribution_scope(msg)?;
        let delivery = match scope {
            DistributionScope::TeamDuelistStripped => {
                let engine_team = receiving_team(msg)? & 1;
                let seat = self.current_seat(self.room_team(engine_team));
                let packet = packet(&strip_for_team(engine_team, msg)?)?;
                self.send_to_seat(seat, &packet);
                let mut prepared = [None, None];
                prepared[usize::from(engine_team)] = Some(&packet);
                let spectator = self.spectator_copy(msg, prepared)?;
                self.send_spectators(&spectator);
                Delivery {
                    prompted: Some(seat),
                    spectator_packet: Some(spectator),
                }
            }
            DistributionScope::TeamDuelist => {
                let engine_team = receiving_team(msg)?;
                let seat = self.current_seat(self.room_team(engine_team));
                self.send_to_seat(seat, &packet(msg)?);
                // Hints precede a prompt but aren't prompts themselves.
                let is_hint = engine_message_type(msg)? == EngineMessageType::Hint;
                Delivery {
                    prompted: (!is_hint).then_some(seat),
                    spectator_packet: None,
                }
            }
            DistributionScope::Team => {
                let room_team = self.room_team(receiving_team(msg)?);
                self.send_where(&packet(msg)?, |s| s.team == room_team);
                Delivery {
                    prompted: None,
                    spectator_packet: None,
                }
            }
            DistributionScope::EveryoneExceptTeamDuelist => {
                let excluded = self.current_seat(self.room_team(receiving_team(msg)?));
                let packet = packet(msg)?;
                self.send_where(&packet, |s| s != excluded);
                self.send_spectators(&packet);
                Delivery {
                    prompted: None,
                    spectator_packet: Some(packet),
                }
            }
            DistributionScope::EveryoneStripped => {
                let per_engine_team = [
                    packet(&strip_for_team(0, msg)?)?,
                    packet(&strip_for_team(1, msg)?)?,
                ];
                for (seat, client) in self.duelists {
                    let copy = &per_engine_team[usize::from(self.engine_team(seat.team) & 1)];
                    client.send(Arc::clone(copy));
                }
                let [zero, one] = &per_engine_team;
                let spectator = self.spectator_copy(msg, [Some(zero), Some(one)])?;
                self.send_spectators(&spectator);
                Delivery {
                    prompted: None,
                    spectator_packet: Some(spectator),
                }
            }
            DistributionScope::Everyone => {
                let packet = packet(msg)?;
                self.send_where(&packet, |_| true);
                self.send_spectators(&packet);
                Delivery {
                    prompted: None,
                    spectator_packet: Some(packet),
                }
            }
        };
        Ok(delivery)
    }
}
