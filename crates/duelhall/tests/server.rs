//! Integration tests for the Duelhall server, handler, and full connection flow.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use duelhall::prelude::*;
use duelhall_protocol::{
    ChatText, CreateGame, FixedPayload, JoinGame, PlayerInfo, StocType, encode,
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Mock engine
// =========================================================================

/// Engine whose duels end as soon as they start. The server tests never
/// get that far; duel flow is covered by the room crate.
struct NullEngine;

struct NullDuel;

impl DuelEngine for NullEngine {
    type Duel = NullDuel;

    fn create_duel(&self, _options: &DuelOptions) -> Result<NullDuel, EngineError> {
        Ok(NullDuel)
    }

    fn is_extra_deck_card(&self, _code: u32) -> bool {
        false
    }
}

impl Duel for NullDuel {
    fn add_card(&mut self, _card: &NewCard) -> Result<(), EngineError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn process(&mut self) -> Result<DuelStatus, EngineError> {
        Ok(DuelStatus::End)
    }

    fn get_messages(&mut self) -> Result<Vec<u8>, EngineError> {
        Ok(Vec::new())
    }

    fn set_response(&mut self, _response: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }

    fn query_count(&mut self, _team: u8, _location: u8) -> Result<u32, EngineError> {
        Ok(0)
    }
}

// =========================================================================
// Helpers
// =========================================================================

const WAIT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
    lobby: Arc<Lobby<NullEngine>>,
    listing: watch::Receiver<Arc<str>>,
    task: JoinHandle<Result<(), DuelhallError>>,
}

/// Starts a TCP server on a random port.
async fn start_server(config: ServerConfig) -> TestServer {
    let server = DuelServerBuilder::new()
        .config(ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..config
        })
        .listing(ListingConfig {
            interval: Duration::from_millis(20),
        })
        .build(NullEngine)
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr");
    let handle = server.handle();
    let lobby = server.lobby();
    let listing = server.listing().expect("listing enabled").subscribe();
    let task = tokio::spawn(server.run());
    TestServer {
        addr,
        handle,
        lobby,
        listing,
        task,
    }
}

fn frame(msg_type: CtosType, body: &[u8]) -> Vec<u8> {
    encode(msg_type as u8, body).expect("body fits in a frame")
}

async fn send(stream: &mut TcpStream, msg_type: CtosType, body: &[u8]) {
    stream
        .write_all(&frame(msg_type, body))
        .await
        .expect("write should succeed");
}

/// Reads one server packet. `None` on EOF or timeout.
async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 3];
    timeout(WAIT, stream.read_exact(&mut header)).await.ok()?.ok()?;
    let length = i16::from_le_bytes([header[0], header[1]]) as usize;
    let mut body = vec![0u8; length - 1];
    timeout(WAIT, stream.read_exact(&mut body)).await.ok()?.ok()?;
    Some((header[2], body))
}

/// Skips packets until one of type `msg_type` arrives.
async fn expect_packet(stream: &mut TcpStream, msg_type: StocType) -> Vec<u8> {
    loop {
        let (ty, body) = read_packet(stream)
            .await
            .unwrap_or_else(|| panic!("expected {msg_type:?} before EOF"));
        if ty == msg_type as u8 {
            return body;
        }
    }
}

/// Drains whatever is queued and asserts the server then closed the socket.
async fn expect_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 512];
    loop {
        match timeout(WAIT, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => return,
            Ok(Ok(_)) => continue,
            Err(_) => panic!("server did not close the connection"),
        }
    }
}

fn player_info(name: &str) -> Vec<u8> {
    PlayerInfo { name: name.into() }.to_bytes()
}

fn create_game(handshake: u64) -> Vec<u8> {
    create_game_with_password(handshake, "")
}

fn create_game_with_password(handshake: u64, password: &str) -> Vec<u8> {
    CreateGame {
        host_info: HostInfo {
            team1_count: 1,
            team2_count: 1,
            best_of: 1,
            starting_lp: 8000,
            handshake,
            ..HostInfo::default()
        },
        name: "room".into(),
        password: password.into(),
        notes: "casual".into(),
    }
    .to_bytes()
}

fn join_game(room_id: u32, client_version: ClientVersion) -> Vec<u8> {
    JoinGame {
        version: 0x1361,
        room_id,
        password: String::new(),
        client_version,
    }
    .to_bytes()
}

fn join_game_with_password(room_id: u32, password: &str) -> Vec<u8> {
    JoinGame {
        version: 0x1361,
        room_id,
        password: password.into(),
        client_version: ClientVersion::default(),
    }
    .to_bytes()
}

fn chat(text: &str) -> Vec<u8> {
    ChatText(text.into()).to_bytes()
}

fn utf16_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Connects, names itself, creates a room and waits for the room state.
async fn host(addr: SocketAddr, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("should connect");
    send(&mut stream, CtosType::PlayerInfo, &player_info(name)).await;
    send(&mut stream, CtosType::CreateGame, &create_game(0)).await;
    expect_packet(&mut stream, StocType::HsPlayerEnter).await;
    stream
}

/// Connects, names itself and joins room 1.
async fn guest(addr: SocketAddr, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("should connect");
    send(&mut stream, CtosType::PlayerInfo, &player_info(name)).await;
    send(
        &mut stream,
        CtosType::JoinGame,
        &join_game(1, ClientVersion::default()),
    )
    .await;
    expect_packet(&mut stream, StocType::JoinGame).await;
    stream
}

// =========================================================================
// Create / join
// =========================================================================

#[tokio::test]
async fn test_create_game_sends_room_state_to_host() {
    let server = start_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    send(&mut stream, CtosType::PlayerInfo, &player_info("Yugi")).await;
    send(&mut stream, CtosType::CreateGame, &create_game(0)).await;

    let (ty, body) = read_packet(&mut stream).await.unwrap();
    assert_eq!(ty, StocType::JoinGame as u8);
    assert_eq!(body.len(), HostInfo::SIZE);

    let (ty, body) = read_packet(&mut stream).await.unwrap();
    assert_eq!(ty, StocType::TypeChange as u8);
    assert_eq!(body, vec![0x10], "host flag set, position 0");

    let body = expect_packet(&mut stream, StocType::HsPlayerEnter).await;
    assert_eq!(utf16_name(&body[..40]), "Yugi");
    assert_eq!(body[40], 0);
    assert_eq!(server.lobby.room_count(), 1);
}

#[tokio::test]
async fn test_join_unknown_room_gets_unavailable_error() {
    let server = start_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    send(&mut stream, CtosType::PlayerInfo, &player_info("Joey")).await;
    send(
        &mut stream,
        CtosType::JoinGame,
        &join_game(99, ClientVersion::default()),
    )
    .await;

    let body = expect_packet(&mut stream, StocType::ErrorMsg).await;
    assert_eq!(body, vec![1, 0, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn test_join_retry_with_right_password_is_admitted() {
    let server = start_server(ServerConfig::default()).await;
    let mut yugi = TcpStream::connect(server.addr).await.unwrap();
    send(&mut yugi, CtosType::PlayerInfo, &player_info("Yugi")).await;
    send(
        &mut yugi,
        CtosType::CreateGame,
        &create_game_with_password(0, "secret"),
    )
    .await;
    expect_packet(&mut yugi, StocType::HsPlayerEnter).await;

    let mut kaiba = TcpStream::connect(server.addr).await.unwrap();
    send(&mut kaiba, CtosType::PlayerInfo, &player_info("Kaiba")).await;
    send(&mut kaiba, CtosType::JoinGame, &join_game_with_password(1, "guess")).await;
    let body = expect_packet(&mut kaiba, StocType::ErrorMsg).await;
    assert_eq!(body, vec![1, 0, 0, 0, 1, 0, 0, 0], "join error, wrong password");

    // Still unattached, so a second attempt is handled as a join.
    send(&mut kaiba, CtosType::JoinGame, &join_game_with_password(1, "secret")).await;
    let body = expect_packet(&mut kaiba, StocType::JoinGame).await;
    assert_eq!(body.len(), HostInfo::SIZE);

    let body = expect_packet(&mut yugi, StocType::HsPlayerEnter).await;
    assert_eq!(utf16_name(&body[..40]), "Kaiba");
    assert_eq!(body[40], 1);
}

#[tokio::test]
async fn test_second_client_join_announced_to_host() {
    let server = start_server(ServerConfig::default()).await;
    let mut yugi = host(server.addr, "Yugi").await;
    let _kaiba = guest(server.addr, "Kaiba").await;

    let body = expect_packet(&mut yugi, StocType::HsPlayerEnter).await;
    assert_eq!(utf16_name(&body[..40]), "Kaiba");
    assert_eq!(body[40], 1);
}

#[tokio::test]
async fn test_chat_relayed_to_room() {
    let server = start_server(ServerConfig::default()).await;
    let mut yugi = host(server.addr, "Yugi").await;
    let mut kaiba = guest(server.addr, "Kaiba").await;
    expect_packet(&mut yugi, StocType::HsPlayerEnter).await;

    send(&mut kaiba, CtosType::Chat, &chat("my turn")).await;

    let body = expect_packet(&mut yugi, StocType::Chat).await;
    assert_eq!(u16::from_le_bytes([body[0], body[1]]), 1);
    assert_eq!(utf16_name(&body[2..]), "my turn");
}

// =========================================================================
// Rejections
// =========================================================================

#[tokio::test]
async fn test_wrong_size_payload_keeps_connection() {
    let server = start_server(ServerConfig::default()).await;
    let mut yugi = host(server.addr, "Yugi").await;
    let mut kaiba = guest(server.addr, "Kaiba").await;
    expect_packet(&mut yugi, StocType::HsPlayerEnter).await;

    // HS_KICK carries exactly one byte.
    send(&mut kaiba, CtosType::HsKick, &[1, 0]).await;
    send(&mut kaiba, CtosType::Chat, &chat("still here")).await;

    let body = expect_packet(&mut yugi, StocType::Chat).await;
    assert_eq!(utf16_name(&body[2..]), "still here");
}

#[tokio::test]
async fn test_malformed_header_closes_connection() {
    let server = start_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    // Length 0 implies a body of -1 bytes.
    stream.write_all(&[0, 0, CtosType::Chat as u8]).await.unwrap();
    expect_closed(&mut stream).await;
}

#[tokio::test]
async fn test_create_before_player_info_closes_connection() {
    let server = start_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    send(&mut stream, CtosType::CreateGame, &create_game(0)).await;
    expect_closed(&mut stream).await;
    assert_eq!(server.lobby.room_count(), 0);
}

#[tokio::test]
async fn test_handshake_mismatch_rejected() {
    let server = start_server(ServerConfig {
        handshake: Some(42),
        ..ServerConfig::default()
    })
    .await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    send(&mut stream, CtosType::PlayerInfo, &player_info("Yugi")).await;
    send(&mut stream, CtosType::CreateGame, &create_game(7)).await;

    let body = expect_packet(&mut stream, StocType::ErrorMsg).await;
    assert_eq!(body[0], 4, "version error");
    expect_closed(&mut stream).await;
    assert_eq!(server.lobby.room_count(), 0);
}

#[tokio::test]
async fn test_client_version_mismatch_rejected() {
    let expected = ClientVersion {
        client_major: 40,
        client_minor: 1,
        core_major: 10,
        core_minor: 0,
    };
    let server = start_server(ServerConfig {
        client_version: Some(expected),
        ..ServerConfig::default()
    })
    .await;
    let _yugi = host(server.addr, "Yugi").await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    send(&mut stream, CtosType::PlayerInfo, &player_info("Kaiba")).await;
    send(
        &mut stream,
        CtosType::JoinGame,
        &join_game(1, ClientVersion::default()),
    )
    .await;

    let body = expect_packet(&mut stream, StocType::ErrorMsg).await;
    assert_eq!(body[0], 4);
    expect_closed(&mut stream).await;
}

// =========================================================================
// Disconnects and shutdown
// =========================================================================

#[tokio::test]
async fn test_host_disconnect_closes_room() {
    let server = start_server(ServerConfig::default()).await;
    let yugi = host(server.addr, "Yugi").await;
    let mut kaiba = guest(server.addr, "Kaiba").await;

    drop(yugi);

    expect_closed(&mut kaiba).await;
    timeout(WAIT, async {
        while server.lobby.room_count() > 0 {
            server.lobby.prune();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("room should be pruned");
}

#[tokio::test]
async fn test_leave_game_disconnects_guest_only() {
    let server = start_server(ServerConfig::default()).await;
    let mut yugi = host(server.addr, "Yugi").await;
    let mut kaiba = guest(server.addr, "Kaiba").await;
    expect_packet(&mut yugi, StocType::HsPlayerEnter).await;

    send(&mut kaiba, CtosType::LeaveGame, &[]).await;
    expect_closed(&mut kaiba).await;

    let body = expect_packet(&mut yugi, StocType::HsPlayerChange).await;
    assert_eq!(body, vec![(1 << 4) | 0xB], "position 1 left");
    assert_eq!(server.lobby.room_count(), 1);
}

#[tokio::test]
async fn test_ready_with_bad_deck_gets_deck_error() {
    let server = start_server(ServerConfig::default()).await;
    let mut yugi = host(server.addr, "Yugi").await;

    send(&mut yugi, CtosType::HsReady, &[]).await;

    let body = expect_packet(&mut yugi, StocType::ErrorMsg).await;
    assert_eq!(body[0], 2, "deck error");
}

#[tokio::test]
async fn test_listing_reflects_created_room() {
    let mut server = start_server(ServerConfig::default()).await;
    let _yugi = host(server.addr, "Yugi").await;

    let snapshot = timeout(WAIT, async {
        loop {
            server.listing.changed().await.expect("listing running");
            let snapshot = server.listing.borrow_and_update().clone();
            if snapshot.contains("roomid") {
                return snapshot;
            }
        }
    })
    .await
    .expect("listing should pick up the room");

    let json: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
    let room = &json["rooms"][0];
    assert_eq!(room["roomid"], 1);
    assert_eq!(room["roomnotes"], "casual");
    assert_eq!(room["istart"], "waiting");
    assert_eq!(room["users"][0]["name"], "Yugi");
}

#[tokio::test]
async fn test_stop_shuts_down_rooms() {
    let server = start_server(ServerConfig::default()).await;
    let mut yugi = host(server.addr, "Yugi").await;

    server.handle.stop();
    let result = timeout(WAIT, server.task).await.expect("run should return");
    assert!(result.expect("task should not panic").is_ok());

    expect_closed(&mut yugi).await;
    assert_eq!(server.lobby.room_count(), 0);
}

// =========================================================================
// WebSocket
// =========================================================================

#[tokio::test]
async fn test_websocket_create_game() {
    let server = DuelServerBuilder::new()
        .bind("127.0.0.1:0")
        .without_listing()
        .build_websocket(NullEngine)
        .await
        .expect("server should build");
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    tokio::spawn(server.run());

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws.send(Message::Binary(frame(CtosType::PlayerInfo, &player_info("Yugi")).into()))
        .await
        .unwrap();
    ws.send(Message::Binary(frame(CtosType::CreateGame, &create_game(0)).into()))
        .await
        .unwrap();

    let msg = timeout(WAIT, ws.next())
        .await
        .expect("should receive")
        .expect("stream open")
        .expect("valid message");
    match msg {
        Message::Binary(data) => assert_eq!(data[2], StocType::JoinGame as u8),
        other => panic!("expected binary packet, got {other:?}"),
    }
    handle.stop();
}
