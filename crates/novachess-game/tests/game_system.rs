//! Integration tests for the game actor system, using scripted rules
//! and a capturing delivery sink.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use novachess_game::{
    GameError, GameManager, ScriptedRules, Seat, Termination,
};
use novachess_protocol::{
    Color, Move, MoveResult, QuickUser, ServerBody, Square, TimeControl,
};
use novachess_registry::{Delivery, Identity, Outcome};
use tokio::sync::mpsc;

// =========================================================================
// Test fixtures
// =========================================================================

/// Captures everything the actor delivers, per identity.
#[derive(Clone, Default)]
struct Sink(Arc<Mutex<Vec<(Identity, ServerBody)>>>);

impl Sink {
    fn take(&self) -> Vec<(Identity, ServerBody)> {
        std::mem::take(&mut self.0.lock().unwrap())
    }

    fn bodies_for(&self, identity: &Identity) -> Vec<ServerBody> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == identity)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

impl Delivery for Sink {
    fn deliver(&self, to: &Identity, body: ServerBody) {
        self.0.lock().unwrap().push((to.clone(), body));
    }
}

fn identity(id: &str) -> Identity {
    Identity::Account(id.to_owned())
}

fn seat(id: &str) -> Seat {
    Seat {
        identity: identity(id),
        user: QuickUser {
            id: id.to_owned(),
            username: id.to_owned(),
            rating: 1500,
        },
    }
}

fn mv(from: u8, to: u8) -> Move {
    Move::plain(Square::new(from).unwrap(), Square::new(to).unwrap())
}

fn control() -> TimeControl {
    TimeControl { start: 300, increment: 0, delay: 0 }
}

/// Spawns a game (White = "alice", Black = "bob") with the given
/// scripted legal sets and yields so the actor can serve the first turn.
async fn start_game(
    script: Vec<Vec<Move>>,
    control: TimeControl,
) -> (
    GameManager,
    novachess_game::GameHandle,
    Sink,
    mpsc::UnboundedReceiver<novachess_game::GameOver>,
) {
    let mut rules = ScriptedRules::new();
    for set in script {
        rules = rules.serve(set);
    }
    let sink = Sink::default();
    let (done_tx, done_rx) = mpsc::unbounded_channel();

    let mut manager = GameManager::new();
    let game_id = manager.create(
        seat("alice"),
        seat("bob"),
        control,
        rules,
        sink.clone(),
        done_tx,
    );
    let handle = manager.handle(&game_id).unwrap();
    tokio::task::yield_now().await;
    (manager, handle, sink, done_rx)
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_resume_serves_white_their_first_turn() {
    let (_manager, handle, sink, _done) =
        start_game(vec![vec![mv(8, 16)]], control()).await;

    handle.resume(identity("alice")).await.unwrap();
    handle.summary(identity("alice")).await.unwrap();

    let to_white = sink.bodies_for(&identity("alice"));
    assert_eq!(to_white.len(), 1);
    match &to_white[0] {
        ServerBody::UserMakeMove { available_moves, position, .. } => {
            assert_eq!(available_moves, &vec![mv(8, 16)]);
            assert_eq!(position, "start");
        }
        other => panic!("expected user_make_move, got {other:?}"),
    }
    assert!(sink.bodies_for(&identity("bob")).is_empty());
}

#[tokio::test]
async fn test_move_notifies_opponent_and_serves_their_turn() {
    let (_manager, handle, sink, _done) = start_game(
        vec![vec![mv(8, 16)], vec![mv(48, 40)]],
        control(),
    )
    .await;
    sink.take();

    let accepted =
        handle.make_move(identity("alice"), mv(8, 16)).await.unwrap();
    assert_eq!(accepted.result, MoveResult::Continue);

    let to_black = sink.bodies_for(&identity("bob"));
    assert_eq!(to_black.len(), 2);
    match &to_black[0] {
        ServerBody::OpponentMove { mv: played, position, .. } => {
            assert_eq!(*played, mv(8, 16));
            assert_eq!(position, "start/a2a3");
        }
        other => panic!("expected opponent_move, got {other:?}"),
    }
    match &to_black[1] {
        ServerBody::UserMakeMove { available_moves, .. } => {
            assert_eq!(available_moves, &vec![mv(48, 40)]);
        }
        other => panic!("expected user_make_move, got {other:?}"),
    }
}

#[tokio::test]
async fn test_illegal_move_errors_and_opponent_hears_nothing() {
    let (_manager, handle, sink, _done) =
        start_game(vec![vec![mv(8, 16)]], control()).await;
    sink.take();

    let err = handle.make_move(identity("alice"), mv(0, 63)).await;
    assert!(matches!(err, Err(GameError::IllegalMove(_))));
    assert!(sink.bodies_for(&identity("bob")).is_empty());

    // The session is unchanged; the served move still works.
    handle.make_move(identity("alice"), mv(8, 16)).await.unwrap();
}

#[tokio::test]
async fn test_mating_move_finishes_game_and_reports_outcome() {
    let mate =
        ScriptedRules::classified(8, 16, MoveResult::Checkmate).unwrap();
    let (_manager, handle, sink, mut done) =
        start_game(vec![vec![mate]], control()).await;
    sink.take();

    let accepted =
        handle.make_move(identity("alice"), mv(8, 16)).await.unwrap();
    assert_eq!(accepted.result, MoveResult::Checkmate);

    // Black learns the terminal move but is not served a turn.
    let to_black = sink.bodies_for(&identity("bob"));
    assert_eq!(to_black.len(), 1);
    match &to_black[0] {
        ServerBody::OpponentMove { mv: played, .. } => {
            assert_eq!(played.result, MoveResult::Checkmate);
        }
        other => panic!("expected opponent_move, got {other:?}"),
    }

    let report = done.recv().await.unwrap();
    assert_eq!(
        report.termination,
        Termination::Checkmate { winner: Color::White }
    );
    assert_eq!(report.outcome, Outcome::WhiteWins);
    assert_eq!(report.white, identity("alice"));
    assert_eq!(report.black, identity("bob"));
}

#[tokio::test]
async fn test_actor_exits_after_terminal_state() {
    let mate =
        ScriptedRules::classified(8, 16, MoveResult::Checkmate).unwrap();
    let (mut manager, handle, _sink, mut done) =
        start_game(vec![vec![mate]], control()).await;

    handle.make_move(identity("alice"), mv(8, 16)).await.unwrap();
    done.recv().await.unwrap();
    tokio::task::yield_now().await;

    let err = handle.resign(identity("bob")).await;
    assert!(matches!(err, Err(GameError::Unavailable(_))));

    assert!(handle.is_finished());
    manager.reap_finished();
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_draw_negotiation_offer_decline_then_accept() {
    let (_manager, handle, sink, mut done) =
        start_game(vec![vec![mv(8, 16)]], control()).await;
    sink.take();

    handle.offer_draw(identity("alice")).await.unwrap();
    assert!(matches!(
        sink.take().as_slice(),
        [(to, ServerBody::OpponentDrawRequest { .. })] if *to == identity("bob")
    ));

    handle.decline_draw(identity("bob")).await.unwrap();
    assert!(matches!(
        sink.take().as_slice(),
        [(to, ServerBody::OpponentDeclineDrawRequest { .. })]
            if *to == identity("alice")
    ));

    // Second round: Black offers, White accepts, game over.
    handle.offer_draw(identity("bob")).await.unwrap();
    handle.accept_draw(identity("alice")).await.unwrap();

    // Acceptance is heard by both sides.
    let to_bob = sink.bodies_for(&identity("bob"));
    assert!(matches!(
        to_bob.last(),
        Some(ServerBody::OpponentAcceptDrawRequest { .. })
    ));
    let to_alice = sink.bodies_for(&identity("alice"));
    assert!(matches!(
        to_alice.last(),
        Some(ServerBody::OpponentAcceptDrawRequest { .. })
    ));

    let report = done.recv().await.unwrap();
    assert_eq!(report.termination, Termination::DrawAgreed);
    assert_eq!(report.outcome, Outcome::Draw);
}

#[tokio::test]
async fn test_accept_draw_without_offer_is_an_error() {
    let (_manager, handle, sink, _done) =
        start_game(vec![vec![mv(8, 16)]], control()).await;
    sink.take();

    let err = handle.accept_draw(identity("bob")).await;
    assert!(matches!(err, Err(GameError::NoDrawOffer)));
    assert!(sink.take().is_empty());
}

#[tokio::test]
async fn test_resign_notifies_opponent_and_finishes() {
    let (_manager, handle, sink, mut done) =
        start_game(vec![vec![mv(8, 16)]], control()).await;
    sink.take();

    handle.resign(identity("alice")).await.unwrap();

    let to_bob = sink.bodies_for(&identity("bob"));
    assert!(matches!(
        to_bob.as_slice(),
        [ServerBody::OpponentResigns { .. }]
    ));

    let report = done.recv().await.unwrap();
    assert_eq!(
        report.termination,
        Termination::Resigned { loser: Color::White }
    );
    assert_eq!(report.outcome, Outcome::BlackWins);
}

#[tokio::test]
async fn test_flag_fall_forfeits_on_the_clock() {
    let (_manager, _handle, _sink, mut done) = start_game(
        vec![vec![mv(8, 16)]],
        TimeControl { start: 1, increment: 0, delay: 0 },
    )
    .await;

    // Nobody moves; the actor's own timer must fire after one second.
    let report = tokio::time::timeout(Duration::from_secs(5), done.recv())
        .await
        .expect("flag should fall within the timeout")
        .unwrap();
    assert_eq!(
        report.termination,
        Termination::TimeForfeit { loser: Color::White }
    );
    assert_eq!(report.outcome, Outcome::BlackWins);
}

#[tokio::test]
async fn test_resume_reserves_turn_for_side_to_move_only() {
    let (_manager, handle, sink, _done) =
        start_game(vec![vec![mv(8, 16)]], control()).await;
    sink.take();

    // Black reconnects: not their turn, nothing served.
    handle.resume(identity("bob")).await.unwrap();
    handle.summary(identity("bob")).await.unwrap();
    assert!(sink.bodies_for(&identity("bob")).is_empty());

    // White reconnects: their turn comes back.
    handle.resume(identity("alice")).await.unwrap();
    handle.summary(identity("alice")).await.unwrap();
    let to_white = sink.bodies_for(&identity("alice"));
    assert!(matches!(
        to_white.as_slice(),
        [ServerBody::UserMakeMove { .. }]
    ));
}

#[tokio::test]
async fn test_summary_reflects_each_side() {
    let (_manager, handle, _sink, _done) =
        start_game(vec![vec![mv(8, 16)]], control()).await;

    let white = handle.summary(identity("alice")).await.unwrap();
    assert_eq!(white.userplays, Color::White);
    assert_eq!(white.toplay, Color::White);
    assert_eq!(white.opponent.username, "bob");

    let black = handle.summary(identity("bob")).await.unwrap();
    assert_eq!(black.userplays, Color::Black);
    assert_eq!(black.opponent.username, "alice");

    let err = handle.summary(identity("mallory")).await;
    assert!(matches!(err, Err(GameError::NotAPlayer(_))));
}

#[tokio::test]
async fn test_shutdown_tears_down_without_a_result() {
    let (mut manager, handle, _sink, mut done) =
        start_game(vec![vec![mv(8, 16)]], control()).await;

    handle.shutdown().await.unwrap();
    tokio::task::yield_now().await;

    assert!(handle.is_finished());
    assert!(done.try_recv().is_err(), "no result for an abandoned game");
    manager.reap_finished();
    assert!(manager.is_empty());
}
