//! Room listing snapshot.
//!
//! [`ListingService`] periodically serialises the lobby's rooms to JSON and
//! publishes the result through a `watch` channel. Each snapshot is an
//! immutable `Arc<str>` that replaces the previous one wholesale, so any
//! number of readers can grab the current snapshot without ever seeing a
//! half-written one. Serving it over HTTP is left to the embedding
//! application.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use duelhall_protocol::RoomId;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::DuelEngine;
use crate::lobby::Lobby;
use crate::room::RoomProperties;

/// Snapshot published before the first tick.
const EMPTY_LISTING: &str = r#"{"rooms":[]}"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// How often the snapshot is regenerated.
    pub interval: Duration,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON shape
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Listing<'a> {
    rooms: Vec<ListedRoom<'a>>,
}

#[derive(Serialize)]
struct ListedRoom<'a> {
    roomid: RoomId,
    roomname: &'a str,
    roomnotes: &'a str,
    roommode: u8,
    needpass: bool,
    team1: i32,
    team2: i32,
    best_of: i32,
    duel_flag: u32,
    forbidden_types: i32,
    extra_rules: u16,
    start_lp: u32,
    start_hand: u8,
    draw_count: u8,
    time_limit: u16,
    rule: u8,
    no_check: bool,
    no_shuffle: bool,
    banlist_hash: u32,
    istart: &'a str,
    users: Vec<ListedUser<'a>>,
}

#[derive(Serialize)]
struct ListedUser<'a> {
    name: &'a str,
    pos: u8,
}

impl<'a> From<&'a RoomProperties> for ListedRoom<'a> {
    fn from(room: &'a RoomProperties) -> Self {
        let info = &room.host_info;
        Self {
            roomid: room.id,
            roomname: "",
            roomnotes: &room.notes,
            roommode: info.mode,
            needpass: room.passworded,
            team1: info.team1_count,
            team2: info.team2_count,
            best_of: info.best_of,
            duel_flag: info.duel_flags,
            forbidden_types: info.forbidden_types,
            extra_rules: info.extra_rules,
            start_lp: info.starting_lp,
            start_hand: info.starting_hand,
            draw_count: info.draw_count,
            time_limit: info.time_limit,
            rule: info.allowed,
            no_check: info.no_check_deck,
            no_shuffle: info.no_shuffle_deck,
            banlist_hash: info.banlist_hash,
            istart: if room.started { "start" } else { "waiting" },
            users: room
                .duelists
                .iter()
                .map(|(seat, name)| ListedUser {
                    name,
                    pos: seat.position(info),
                })
                .collect(),
        }
    }
}

/// Serialises rooms into the listing JSON document.
pub fn render(rooms: &[RoomProperties]) -> Result<String, serde_json::Error> {
    let listing = Listing {
        rooms: rooms.iter().map(ListedRoom::from).collect(),
    };
    serde_json::to_string(&listing)
}

// ---------------------------------------------------------------------------
// ListingService
// ---------------------------------------------------------------------------

/// Background task keeping the listing snapshot fresh.
pub struct ListingService {
    snapshot: watch::Receiver<Arc<str>>,
    stop_tx: watch::Sender<bool>,
    stopped: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ListingService {
    /// Starts regenerating the snapshot every `config.interval`. Closed
    /// rooms are pruned from the lobby on each tick.
    pub fn spawn<E: DuelEngine>(lobby: Arc<Lobby<E>>, config: ListingConfig) -> Self {
        let (snapshot_tx, snapshot) = watch::channel(Arc::<str>::from(EMPTY_LISTING));
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                if flag.load(Ordering::Acquire) {
                    break;
                }
                lobby.prune();
                let json = match render(&lobby.snapshot()) {
                    Ok(json) => json,
                    Err(error) => {
                        tracing::warn!(%error, "failed to render room listing");
                        continue;
                    }
                };
                // A stop that landed mid-tick wins over this tick's result.
                if flag.load(Ordering::Acquire) {
                    break;
                }
                snapshot_tx.send_replace(Arc::from(json));
            }
            tracing::debug!("listing service stopped");
        });

        Self {
            snapshot,
            stop_tx,
            stopped,
            task,
        }
    }

    /// The most recent snapshot.
    pub fn snapshot(&self) -> Arc<str> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// A receiver that observes every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<str>> {
        self.snapshot.clone()
    }

    /// Stops regenerating. The last published snapshot stays readable.
    /// Calling it more than once is harmless.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _ = self.stop_tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stops the service and waits for its task to finish.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Seat;
    use duelhall_protocol::HostInfo;

    fn room(started: bool) -> RoomProperties {
        RoomProperties {
            id: RoomId(7),
            notes: "casual".to_owned(),
            host_info: HostInfo {
                team1_count: 1,
                team2_count: 1,
                best_of: 3,
                starting_lp: 8000,
                ..HostInfo::default()
            },
            started,
            passworded: true,
            duelists: vec![(Seat::new(0, 0), "Yugi".to_owned()), (Seat::new(1, 0), "Kaiba".to_owned())],
        }
    }

    #[test]
    fn test_render_empty_matches_initial_snapshot() {
        assert_eq!(render(&[]).unwrap(), EMPTY_LISTING);
    }

    #[test]
    fn test_render_room_fields() {
        let json: serde_json::Value = serde_json::from_str(&render(&[room(false)]).unwrap()).unwrap();
        let listed = &json["rooms"][0];
        assert_eq!(listed["roomid"], 7);
        assert_eq!(listed["roomnotes"], "casual");
        assert_eq!(listed["needpass"], true);
        assert_eq!(listed["best_of"], 3);
        assert_eq!(listed["start_lp"], 8000);
        assert_eq!(listed["istart"], "waiting");
        assert_eq!(listed["users"][0]["name"], "Yugi");
        assert_eq!(listed["users"][1]["name"], "Kaiba");
        assert_eq!(listed["users"][1]["pos"], 1);
    }

    #[test]
    fn test_render_started_room() {
        let json: serde_json::Value = serde_json::from_str(&render(&[room(true)]).unwrap()).unwrap();
        assert_eq!(json["rooms"][0]["istart"], "start");
    }
}
