//! End-to-end tests over real WebSocket connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use jaipur::game::card::CardKind;
use jaipur::game::rules::RuleError;
use jaipur::game::state::MatchPhase;
use jaipur::network::protocol::{GameSnapshot, ServerMessage};
use jaipur::network::server::GameServerError;
use jaipur::{GameServer, Seat, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Serving = (Arc<GameServer>, SocketAddr, JoinHandle<Result<(), GameServerError>>);

async fn start_server(seed: u64) -> Serving {
    start_server_with(ServerConfig {
        rng_seed: Some(seed),
        ..Default::default()
    })
    .await
}

async fn start_server_with(config: ServerConfig) -> Serving {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig { bind_addr: addr, ..config };
    let server = Arc::new(GameServer::new(config));
    let serving = server.clone();
    let handle = tokio::spawn(async move { serving.serve(listener).await });
    (server, addr, handle)
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    ws
}

async fn next_snapshot(client: &mut Client) -> GameSnapshot {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for snapshot")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            let ServerMessage::GameState(snapshot) = ServerMessage::from_json(&text).unwrap();
            return snapshot;
        }
    }
}

async fn send(client: &mut Client, json: &str) {
    client.send(Message::Text(json.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_two_players_share_ordered_snapshots() {
    let (server, addr, _handle) = start_server(11).await;

    let mut alice = connect(addr, "/game/m1/alice").await;
    let first = next_snapshot(&mut alice).await;
    assert_eq!(first.phase, MatchPhase::Loading);
    assert_eq!(first.seq, 0);

    let mut bob = connect(addr, "/game/m1/bob").await;
    let _ = next_snapshot(&mut bob).await;
    assert_eq!(server.match_count().await, 1);

    send(&mut alice, r#"{"type":"start-round","payload":{"startingSeat":1,"seatLabel":"Alice"}}"#).await;
    let a = next_snapshot(&mut alice).await;
    let b = next_snapshot(&mut bob).await;
    assert_eq!(a, b);
    assert_eq!(a.phase, MatchPhase::Playing);
    assert_eq!(a.seq, 1);
    assert_eq!(a.current_player, Seat::One);
    assert_eq!(a.message, "Alice's turn");
    assert_eq!(a.market.len(), 5);
    let total = a.deck.len()
        + a.market.len()
        + a.players.one.hand.len()
        + a.players.one.camel_herd.len()
        + a.players.two.hand.len()
        + a.players.two.camel_herd.len();
    assert_eq!(total, 49);

    // Out of turn: rejected, but still broadcast.
    send(&mut bob, r#"{"type":"take-camels"}"#).await;
    let rejected = next_snapshot(&mut alice).await;
    let _ = next_snapshot(&mut bob).await;
    assert_eq!(rejected.seq, 2);
    assert_eq!(rejected.current_player, Seat::One);
    assert_eq!(rejected.message, "It is not your turn");
    assert_eq!(rejected.market, a.market);

    // Camels, payload omitted.
    let had_camels = a.market.iter().any(|c| c.kind == CardKind::Camel);
    send(&mut alice, r#"{"type":"take-camels"}"#).await;
    let after = next_snapshot(&mut alice).await;
    let _ = next_snapshot(&mut bob).await;
    assert_eq!(after.seq, 3);
    if had_camels {
        assert_eq!(after.current_player, Seat::Two);
        assert!(after.players.one.camel_herd.len() > a.players.one.camel_herd.len());
        assert!(after.message.ends_with("Player 2's turn"));
    } else {
        assert_eq!(after.message, RuleError::NoCamelsAvailable.to_string());
    }
}

#[tokio::test]
async fn test_unknown_route_rejected() {
    let (_server, addr, _handle) = start_server(1).await;

    let err = connect_async(format!("ws://{addr}/lobby/m1")).await.unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 404),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_spectator_watches_but_cannot_act() {
    let (server, addr, _handle) = start_server(2).await;
    server
        .registry()
        .register_match("m2", ["p1".to_string(), "p2".to_string()], Some(Seat::Two))
        .await;

    let mut p1 = connect(addr, "/game/m2/p1").await;
    let _ = next_snapshot(&mut p1).await;
    let mut watcher = connect(addr, "/game/m2/watcher").await;
    let _ = next_snapshot(&mut watcher).await;

    send(&mut watcher, r#"{"type":"start-round","payload":{}}"#).await;
    let refused = next_snapshot(&mut watcher).await;
    let _ = next_snapshot(&mut p1).await;
    assert_eq!(refused.phase, MatchPhase::Loading);
    assert_eq!(refused.message, "Spectators cannot act");

    // No starting seat in the payload: the matchmaking seat applies.
    send(&mut p1, r#"{"type":"start-round","payload":{}}"#).await;
    let started = next_snapshot(&mut watcher).await;
    assert_eq!(started.phase, MatchPhase::Playing);
    assert_eq!(started.current_player, Seat::Two);
    assert_eq!(started.message, "Player 2's turn");
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (_server, addr, _handle) = start_server(3).await;
    let mut client = connect(addr, "/game/m3/solo").await;
    let _ = next_snapshot(&mut client).await;

    send(&mut client, "not json").await;
    send(&mut client, r#"{"type":"steal-tokens"}"#).await;
    send(&mut client, r#"{"type":"join"}"#).await;

    let snapshot = next_snapshot(&mut client).await;
    assert_eq!(snapshot.seq, 1);
    assert_eq!(snapshot.phase, MatchPhase::Loading);
}

#[tokio::test]
async fn test_matches_are_isolated() {
    let (server, addr, _handle) = start_server(4).await;

    let mut a = connect(addr, "/game/left/a").await;
    let _ = next_snapshot(&mut a).await;
    let mut b = connect(addr, "/game/right/b").await;
    let _ = next_snapshot(&mut b).await;
    assert_eq!(server.match_count().await, 2);

    send(&mut a, r#"{"type":"start-round","payload":{"startingSeat":1}}"#).await;
    let left = next_snapshot(&mut a).await;
    assert_eq!(left.match_id, "left");
    assert_eq!(left.phase, MatchPhase::Playing);

    send(&mut b, r#"{"type":"join"}"#).await;
    let right = next_snapshot(&mut b).await;
    assert_eq!(right.match_id, "right");
    assert_eq!(right.phase, MatchPhase::Loading);
    assert_eq!(right.seq, 1);
}

#[tokio::test]
async fn test_shutdown_stops_serving() {
    let (server, addr, handle) = start_server(5).await;
    let mut client = connect(addr, "/game/m5/x").await;
    let _ = next_snapshot(&mut client).await;

    server.shutdown();
    let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_pending_handshakes_count_toward_limit() {
    let (_server, addr, _handle) = start_server_with(ServerConfig {
        max_connections: 1,
        rng_seed: Some(6),
        ..Default::default()
    })
    .await;

    // Connected but never upgraded.
    let idle = TcpStream::connect(addr).await.unwrap();
    let refused = timeout(
        Duration::from_secs(5),
        connect_async(format!("ws://{addr}/game/m6/a")),
    )
    .await
    .unwrap();
    assert!(refused.is_err());

    drop(idle);
    let mut admitted = None;
    for _ in 0..50 {
        if let Ok((ws, _)) = connect_async(format!("ws://{addr}/game/m6/a")).await {
            admitted = Some(ws);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut client = admitted.expect("slot was never released");
    assert_eq!(next_snapshot(&mut client).await.match_id, "m6");
}
