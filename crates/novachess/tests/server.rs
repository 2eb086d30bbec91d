//! Integration tests for the Novachess server: logon, matchmaking,
//! move exchange, draw negotiation, and liveness, over real WebSockets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use novachess::ChessServerBuilder;
use novachess_game::ScriptedRules;
use novachess_protocol::{
    ClientBody, ClientPacket, Color, GameId, Move, PacketId, RatingRange,
    ServerBody, ServerPacket, Square, TimeControl,
};
use novachess_registry::{MemoryAccountStore, Outcome};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn mv(from: u8, to: u8) -> Move {
    Move::plain(Square::new(from).unwrap(), Square::new(to).unwrap())
}

fn range() -> RatingRange {
    RatingRange { low: 0, high: 3000 }
}

fn control() -> TimeControl {
    TimeControl { start: 300, increment: 2, delay: 0 }
}

/// A store with two accounts and a shared handle for assertions.
fn store() -> Arc<MemoryAccountStore> {
    let store = MemoryAccountStore::new();
    store.insert("u-alice", "alice", 1500);
    store.insert("u-bob", "bob", 1540);
    Arc::new(store)
}

/// Starts a server on a random port and returns its address.
async fn start_server(
    store: Arc<MemoryAccountStore>,
    rules: ScriptedRules,
) -> String {
    let server = ChessServerBuilder::new()
        .bind("127.0.0.1:0")
        .keepalive(Duration::from_secs(1))
        .build(store, rules)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

/// A protocol-aware test client: numbers its own packets and
/// acknowledges everything the server sends, like a real client would.
struct TestClient {
    ws: ClientWs,
    next_id: u64,
    uid: Option<String>,
}

impl TestClient {
    async fn connect(addr: &str) -> Self {
        let (ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .expect("should connect");
        Self { ws, next_id: 1, uid: None }
    }

    async fn send(&mut self, body: ClientBody) {
        let packet = ClientPacket {
            id: PacketId(self.next_id),
            body,
        };
        self.next_id += 1;
        let json = serde_json::to_string(&packet).expect("encode");
        self.ws.send(Message::text(json)).await.expect("send");
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::text(text.to_string()))
            .await
            .expect("send raw");
    }

    /// Receives the next data frame as a server packet.
    async fn recv(&mut self) -> ServerPacket {
        loop {
            let msg = self
                .ws
                .next()
                .await
                .expect("connection open")
                .expect("recv");
            match msg {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str())
                        .expect("decode server packet");
                }
                Message::Binary(bytes) => {
                    return serde_json::from_slice(&bytes)
                        .expect("decode server packet");
                }
                _ => continue,
            }
        }
    }

    /// The next meaningful server body: acknowledges what wants one,
    /// skips keepalives and the server's own acks.
    async fn expect_body(&mut self) -> ServerBody {
        loop {
            let packet = self.recv().await;
            if packet.body.wants_ack() {
                self.send(ClientBody::Acknowledge { pid: packet.id })
                    .await;
            }
            match packet.body {
                ServerBody::KeepAlive { .. }
                | ServerBody::Acknowledge { .. } => continue,
                body => return body,
            }
        }
    }

    /// Logs on with an account id and returns the state refresh.
    async fn logon(&mut self, uid: &str) -> Vec<novachess_protocol::GameSummary> {
        self.uid = Some(uid.to_string());
        self.send(ClientBody::LogonAccount { uid: uid.to_string() })
            .await;
        match self.expect_body().await {
            ServerBody::AcknowledgeLogon { games } => games,
            other => panic!("expected acknowledge_logon, got {other:?}"),
        }
    }

    async fn request_game(&mut self) {
        self.send(ClientBody::RequestGameVsUser {
            ratingrange: range(),
            timecontrol: control(),
        })
        .await;
    }

    async fn expect_game_found(&mut self) -> (GameId, Color) {
        match self.expect_body().await {
            ServerBody::GameFound { gameid, play, .. } => (gameid, play),
            other => panic!("expected game_found, got {other:?}"),
        }
    }
}

/// Two logged-on clients paired into a game; returned as
/// `(white, black, gameid)`.
async fn paired_clients(addr: &str) -> (TestClient, TestClient, GameId) {
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    a.logon("u-alice").await;
    b.logon("u-bob").await;

    a.request_game().await;
    b.request_game().await;

    let (game_a, play_a) = a.expect_game_found().await;
    let (game_b, play_b) = b.expect_game_found().await;
    assert_eq!(game_a, game_b);
    assert_eq!(play_b, play_a.opponent());

    if play_a == Color::White {
        (a, b, game_a)
    } else {
        (b, a, game_a)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_logon_account_acknowledged_with_empty_games() {
    let addr = start_server(store(), ScriptedRules::new()).await;
    let mut client = TestClient::connect(&addr).await;

    let games = client.logon("u-alice").await;
    assert!(games.is_empty());
}

#[tokio::test]
async fn test_logon_unknown_user_rejected() {
    let addr = start_server(store(), ScriptedRules::new()).await;
    let mut client = TestClient::connect(&addr).await;

    client
        .send(ClientBody::LogonAccount { uid: "ghost".to_string() })
        .await;
    match client.expect_body().await {
        ServerBody::ServerErr { debug_msg, .. } => {
            assert!(debug_msg.contains("ghost"));
        }
        other => panic!("expected server_err, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_packet_must_be_a_logon() {
    let addr = start_server(store(), ScriptedRules::new()).await;
    let mut client = TestClient::connect(&addr).await;

    client.request_game().await;
    match client.expect_body().await {
        ServerBody::ServerErr { msg, .. } => {
            assert!(msg.contains("logon"));
        }
        other => panic!("expected server_err, got {other:?}"),
    }
}

#[tokio::test]
async fn test_anonymous_user_gets_temp_id_before_any_game_packet() {
    let addr = start_server(store(), ScriptedRules::new()).await;
    let mut anon = TestClient::connect(&addr).await;

    anon.send(ClientBody::LogonAnon {}).await;
    match anon.expect_body().await {
        ServerBody::AcknowledgeLogon { games } => assert!(games.is_empty()),
        other => panic!("expected acknowledge_logon, got {other:?}"),
    }

    anon.request_game().await;
    match anon.expect_body().await {
        ServerBody::AssignTempId { temp_id } => {
            assert_eq!(temp_id.len(), 32);
        }
        other => panic!("expected assign_temp_id, got {other:?}"),
    }
}

#[tokio::test]
async fn test_two_compatible_requests_pair_into_one_game() {
    let rules = ScriptedRules::new().serve(vec![mv(8, 16)]);
    let addr = start_server(store(), rules).await;

    let (mut white, _black, gameid) = paired_clients(&addr).await;

    // White is served their first turn.
    match white.expect_body().await {
        ServerBody::UserMakeMove { available_moves, gameid: g, .. } => {
            assert_eq!(available_moves, vec![mv(8, 16)]);
            assert_eq!(g, gameid);
        }
        other => panic!("expected user_make_move, got {other:?}"),
    }
}

#[tokio::test]
async fn test_move_flows_to_opponent_with_their_turn() {
    let rules = ScriptedRules::new()
        .serve(vec![mv(8, 16)])
        .serve(vec![mv(48, 40)]);
    let addr = start_server(store(), rules).await;
    let (mut white, mut black, gameid) = paired_clients(&addr).await;
    white.expect_body().await; // user_make_move

    white
        .send(ClientBody::MakeMove { mv: mv(8, 16), gameid: gameid.clone() })
        .await;

    match black.expect_body().await {
        ServerBody::OpponentMove { mv: played, gameid: g, .. } => {
            assert_eq!(played, mv(8, 16));
            assert_eq!(g, gameid);
        }
        other => panic!("expected opponent_move, got {other:?}"),
    }
    match black.expect_body().await {
        ServerBody::UserMakeMove { available_moves, .. } => {
            assert_eq!(available_moves, vec![mv(48, 40)]);
        }
        other => panic!("expected user_make_move, got {other:?}"),
    }
}

#[tokio::test]
async fn test_illegal_move_rejected_with_server_err_only() {
    let rules = ScriptedRules::new().serve(vec![mv(8, 16)]);
    let addr = start_server(store(), rules).await;
    let (mut white, mut black, gameid) = paired_clients(&addr).await;
    white.expect_body().await; // user_make_move

    white
        .send(ClientBody::MakeMove { mv: mv(0, 63), gameid: gameid.clone() })
        .await;
    match white.expect_body().await {
        ServerBody::ServerErr { .. } => {}
        other => panic!("expected server_err, got {other:?}"),
    }

    // The session is intact: the served move still goes through, and
    // the opponent never saw the rejected one.
    white
        .send(ClientBody::MakeMove { mv: mv(8, 16), gameid })
        .await;
    match black.expect_body().await {
        ServerBody::OpponentMove { mv: played, .. } => {
            assert_eq!(played, mv(8, 16));
        }
        other => panic!("expected opponent_move, got {other:?}"),
    }
}

#[tokio::test]
async fn test_resign_notifies_opponent_and_records_result() {
    let accounts = store();
    let rules = ScriptedRules::new().serve(vec![mv(8, 16)]);
    let addr = start_server(Arc::clone(&accounts), rules).await;
    let (mut white, mut black, gameid) = paired_clients(&addr).await;
    white.expect_body().await; // user_make_move

    black
        .send(ClientBody::Resign { gameid: gameid.clone() })
        .await;

    match white.expect_body().await {
        ServerBody::OpponentResigns { gameid: g } => assert_eq!(g, gameid),
        other => panic!("expected opponent_resigns, got {other:?}"),
    }

    // The results task records the outcome asynchronously.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(accounts.recorded(), vec![(gameid, Outcome::WhiteWins)]);
}

#[tokio::test]
async fn test_draw_negotiation_over_the_wire() {
    let accounts = store();
    let rules = ScriptedRules::new().serve(vec![mv(8, 16)]);
    let addr = start_server(Arc::clone(&accounts), rules).await;
    let (mut white, mut black, gameid) = paired_clients(&addr).await;
    white.expect_body().await; // user_make_move

    white
        .send(ClientBody::OfferDraw { gameid: gameid.clone() })
        .await;
    match black.expect_body().await {
        ServerBody::OpponentDrawRequest { .. } => {}
        other => panic!("expected opponent_draw_request, got {other:?}"),
    }

    black
        .send(ClientBody::DeclineDraw { gameid: gameid.clone() })
        .await;
    match white.expect_body().await {
        ServerBody::OpponentDeclineDrawRequest { .. } => {}
        other => {
            panic!("expected opponent_decline_draw_request, got {other:?}")
        }
    }

    // Second round the other way; accepting ends the game.
    black
        .send(ClientBody::OfferDraw { gameid: gameid.clone() })
        .await;
    match white.expect_body().await {
        ServerBody::OpponentDrawRequest { .. } => {}
        other => panic!("expected opponent_draw_request, got {other:?}"),
    }
    white
        .send(ClientBody::AcceptDraw { gameid: gameid.clone() })
        .await;
    match black.expect_body().await {
        ServerBody::OpponentAcceptDrawRequest { .. } => {}
        other => {
            panic!("expected opponent_accept_draw_request, got {other:?}")
        }
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(accounts.recorded(), vec![(gameid, Outcome::Draw)]);
}

#[tokio::test]
async fn test_accept_draw_without_offer_is_server_err() {
    let rules = ScriptedRules::new().serve(vec![mv(8, 16)]);
    let addr = start_server(store(), rules).await;
    let (mut white, _black, gameid) = paired_clients(&addr).await;
    white.expect_body().await; // user_make_move

    white.send(ClientBody::AcceptDraw { gameid }).await;
    match white.expect_body().await {
        ServerBody::ServerErr { msg, .. } => {
            assert!(msg.contains("draw"));
        }
        other => panic!("expected server_err, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_packet_gets_server_err_without_drop() {
    let addr = start_server(store(), ScriptedRules::new()).await;
    let mut client = TestClient::connect(&addr).await;
    client.logon("u-alice").await;

    client.send_raw("{\"cmd\": \"made_up_command\"}").await;
    match client.expect_body().await {
        ServerBody::ServerErr { msg, .. } => {
            assert!(msg.contains("malformed"));
        }
        other => panic!("expected server_err, got {other:?}"),
    }

    // Still alive and usable: the next request is accepted (receipt
    // ack, then a quiet wait in the queue until the next keepalive).
    client.request_game().await;
    loop {
        let packet = client.recv().await;
        if packet.body.wants_ack() {
            client
                .send(ClientBody::Acknowledge { pid: packet.id })
                .await;
        }
        match packet.body {
            ServerBody::ServerErr { debug_msg, .. } => {
                panic!("request after garbage failed: {debug_msg}")
            }
            ServerBody::KeepAlive { .. } => break,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn test_reconnect_resumes_the_game_in_progress() {
    let rules = ScriptedRules::new().serve(vec![mv(8, 16)]);
    let addr = start_server(store(), rules).await;
    let (mut white, _black, gameid) = paired_clients(&addr).await;
    white.expect_body().await; // user_make_move

    // White vanishes mid-game; the session must survive the teardown.
    let uid = white.uid.clone().expect("logged on");
    drop(white);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut again = TestClient::connect(&addr).await;
    let games = again.logon(&uid).await;
    assert_eq!(games.len(), 1, "state refresh should list the live game");
    assert_eq!(games[0].gameid, gameid);
    assert_eq!(games[0].userplays, Color::White);
    assert_eq!(games[0].toplay, Color::White);
    assert_eq!(games[0].opponent.rating, 1540);

    // Still their move: the turn comes back too.
    match again.expect_body().await {
        ServerBody::UserMakeMove { available_moves, gameid: g, .. } => {
            assert_eq!(available_moves, vec![mv(8, 16)]);
            assert_eq!(g, gameid);
        }
        other => panic!("expected user_make_move, got {other:?}"),
    }
}

#[tokio::test]
async fn test_silent_connection_torn_down_while_game_survives() {
    let rules = ScriptedRules::new().serve(vec![mv(8, 16)]);
    let addr = start_server(store(), rules).await;
    let (mut white, _black, gameid) = paired_clients(&addr).await;
    white.expect_body().await; // user_make_move
    let uid = white.uid.clone().expect("logged on");

    // White goes completely silent without closing the socket — no
    // acks, no packets. The keepalive window decides, not the client.
    let torn_down = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match white.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let packet: ServerPacket =
                        serde_json::from_str(text.as_str()).expect("decode");
                    if matches!(
                        packet.body,
                        ServerBody::TerminateConnection {}
                    ) {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(torn_down.is_ok(), "server should drop a silent connection");

    // The teardown severed the connection only; the session is still
    // there for the identity.
    let mut again = TestClient::connect(&addr).await;
    let games = again.logon(&uid).await;
    assert_eq!(games.len(), 1, "the game should survive the teardown");
    assert_eq!(games[0].gameid, gameid);
}

#[tokio::test]
async fn test_unacknowledged_packet_retransmitted_once_then_torn_down() {
    let addr = start_server(store(), ScriptedRules::new()).await;
    let mut client = TestClient::connect(&addr).await;
    client
        .send(ClientBody::LogonAccount { uid: "u-alice".to_string() })
        .await;

    // This client keeps talking (so the dead-connection check never
    // fires) but never acknowledges anything real. Every packet id it
    // sees is tallied: a retransmitted packet shows up twice with the
    // same id, and no id may appear a third time.
    let mut seen: HashMap<u64, u32> = HashMap::new();
    let mut closed = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        let frame =
            tokio::time::timeout(Duration::from_millis(200), client.ws.next())
                .await;
        match frame {
            Ok(Some(Ok(Message::Text(text)))) => {
                let packet: ServerPacket =
                    serde_json::from_str(text.as_str()).expect("decode");
                if matches!(packet.body, ServerBody::TerminateConnection {}) {
                    closed = true;
                    break;
                }
                *seen.entry(packet.id.0).or_insert(0) += 1;
            }
            Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => {
                closed = true;
                break;
            }
            Ok(Some(Ok(_))) => continue,
            Err(_) => {
                // Idle gap: keep the inbound side warm with an ack for
                // an id the server never sent.
                let noop = ClientPacket {
                    id: PacketId(client.next_id),
                    body: ClientBody::Acknowledge { pid: PacketId(9_999) },
                };
                client.next_id += 1;
                let json = serde_json::to_string(&noop).expect("encode");
                let _ = client.ws.send(Message::text(json)).await;
            }
        }
    }

    assert!(closed, "server should give up on an unacknowledging client");
    assert!(
        seen.values().any(|&count| count == 2),
        "a stale packet should have been retransmitted: {seen:?}"
    );
    assert!(
        seen.values().all(|&count| count <= 2),
        "retransmission must happen at most once: {seen:?}"
    );
}

#[tokio::test]
async fn test_duplicate_acknowledge_is_harmless() {
    let addr = start_server(store(), ScriptedRules::new()).await;
    let mut client = TestClient::connect(&addr).await;
    client
        .send(ClientBody::LogonAccount { uid: "u-alice".to_string() })
        .await;

    // Find the logon response and acknowledge it twice.
    let logon_pid = loop {
        let packet = client.recv().await;
        if let ServerBody::AcknowledgeLogon { .. } = packet.body {
            break packet.id;
        }
    };
    client.send(ClientBody::Acknowledge { pid: logon_pid }).await;
    client.send(ClientBody::Acknowledge { pid: logon_pid }).await;

    // The connection stays healthy: keepalives keep flowing and the
    // duplicate never produces a server_err.
    loop {
        let packet = client.recv().await;
        if packet.body.wants_ack() {
            client
                .send(ClientBody::Acknowledge { pid: packet.id })
                .await;
        }
        match packet.body {
            ServerBody::ServerErr { debug_msg, .. } => {
                panic!("duplicate acknowledge rejected: {debug_msg}")
            }
            ServerBody::KeepAlive { .. } => break,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn test_keepalive_lists_the_active_game() {
    let rules = ScriptedRules::new().serve(vec![mv(8, 16)]);
    let addr = start_server(store(), rules).await;
    let (mut white, _black, gameid) = paired_clients(&addr).await;
    white.expect_body().await; // user_make_move

    // Wait out one keepalive period and read packets raw.
    loop {
        let packet = white.recv().await;
        if packet.body.wants_ack() {
            white
                .send(ClientBody::Acknowledge { pid: packet.id })
                .await;
        }
        if let ServerBody::KeepAlive { games } = packet.body {
            assert_eq!(games.len(), 1);
            assert_eq!(games[0].gameid, gameid);
            assert!(games[0].clock.white <= 300.0);
            break;
        }
    }
}
