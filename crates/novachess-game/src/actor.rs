//! Game actor: an isolated Tokio task that owns one [`GameSession`].
//!
//! Each game runs in its own task, communicating with connection
//! handlers through an mpsc channel — no shared mutable state, just
//! message passing. The actor is also the only place that watches the
//! clock: its select loop sleeps until the running side's flag
//! deadline, so a time forfeit fires even if neither player sends
//! another packet.

use std::time::Instant;

use novachess_protocol::{
    Color, GameId, GameSummary, Move, ServerBody, TimeControl,
};
use novachess_registry::{Delivery, Identity, Outcome};
use tokio::sync::{mpsc, oneshot};

use crate::{GameError, GameSession, Phase, RulesEngine, Seat, Termination};

/// Commands sent to a game actor through its channel.
///
/// The `oneshot::Sender` in most variants is a reply channel — the
/// caller sends a command and waits for the outcome on it.
pub(crate) enum GameCommand {
    Move {
        identity: Identity,
        mv: Move,
        reply: oneshot::Sender<Result<Move, GameError>>,
    },
    OfferDraw {
        identity: Identity,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    AcceptDraw {
        identity: Identity,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    DeclineDraw {
        identity: Identity,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Resign {
        identity: Identity,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    /// A player reconnected; re-serve their turn if it is theirs.
    Resume { identity: Identity },
    Summary {
        identity: Identity,
        reply: oneshot::Sender<Result<GameSummary, GameError>>,
    },
    /// Tear the game down without a result (abandonment policy).
    Shutdown,
}

/// Report emitted exactly once when a game reaches a terminal state,
/// for result recording and registry cleanup by the layer above.
#[derive(Debug, Clone)]
pub struct GameOver {
    pub game: GameId,
    pub white: Identity,
    pub black: Identity,
    pub termination: Termination,
    pub outcome: Outcome,
}

/// Handle to a running game actor. Cheap to clone — an `mpsc::Sender`
/// wrapper. The `GameManager` holds one per game.
#[derive(Clone)]
pub struct GameHandle {
    game_id: GameId,
    sender: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// Returns `true` once the actor has exited (game over or shut
    /// down), so the manager can reap the entry.
    pub fn is_finished(&self) -> bool {
        self.sender.is_closed()
    }

    /// Submits a move. On success the returned move is the canonical
    /// one (captures and result from the served legal set).
    pub async fn make_move(
        &self,
        identity: Identity,
        mv: Move,
    ) -> Result<Move, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GameCommand::Move { identity, mv, reply: reply_tx })
            .await
            .map_err(|_| GameError::Unavailable(self.game_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.game_id.clone()))?
    }

    pub async fn offer_draw(&self, identity: Identity) -> Result<(), GameError> {
        self.request(|reply| GameCommand::OfferDraw { identity, reply })
            .await
    }

    pub async fn accept_draw(
        &self,
        identity: Identity,
    ) -> Result<(), GameError> {
        self.request(|reply| GameCommand::AcceptDraw { identity, reply })
            .await
    }

    pub async fn decline_draw(
        &self,
        identity: Identity,
    ) -> Result<(), GameError> {
        self.request(|reply| GameCommand::DeclineDraw { identity, reply })
            .await
    }

    pub async fn resign(&self, identity: Identity) -> Result<(), GameError> {
        self.request(|reply| GameCommand::Resign { identity, reply })
            .await
    }

    /// Asks the actor to re-serve `identity`'s turn after a reconnect
    /// (fire-and-forget).
    pub async fn resume(&self, identity: Identity) -> Result<(), GameError> {
        self.sender
            .send(GameCommand::Resume { identity })
            .await
            .map_err(|_| GameError::Unavailable(self.game_id.clone()))
    }

    /// The keepalive/logon summary of this game as seen by `identity`.
    pub async fn summary(
        &self,
        identity: Identity,
    ) -> Result<GameSummary, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GameCommand::Summary { identity, reply: reply_tx })
            .await
            .map_err(|_| GameError::Unavailable(self.game_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.game_id.clone()))?
    }

    /// Tears the game down without a result.
    pub async fn shutdown(&self) -> Result<(), GameError> {
        self.sender
            .send(GameCommand::Shutdown)
            .await
            .map_err(|_| GameError::Unavailable(self.game_id.clone()))
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), GameError>>) -> GameCommand,
    ) -> Result<(), GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| GameError::Unavailable(self.game_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.game_id.clone()))?
    }
}

/// The internal game actor. Runs inside a Tokio task.
struct GameActor<R: RulesEngine, D: Delivery> {
    session: GameSession<R>,
    delivery: D,
    done: mpsc::UnboundedSender<GameOver>,
    receiver: mpsc::Receiver<GameCommand>,
    shut_down: bool,
}

impl<R: RulesEngine, D: Delivery> GameActor<R, D> {
    async fn run(mut self) {
        tracing::info!(game = %self.session.id(), "game actor started");

        // White's first turn is not served here: the creator sends
        // `game_found` first and then asks for a `Resume`, which keeps
        // the packet order deterministic.
        while !self.session.is_over() && !self.shut_down {
            let deadline = self.session.flag_deadline();
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    // Manager dropped every handle; nothing can reach
                    // this game any more.
                    None => break,
                },
                () = sleep_until_flag(deadline) => {
                    self.handle_flag_fall();
                }
            }
        }

        if let Phase::Finished(termination) = self.session.phase() {
            let report = GameOver {
                game: self.session.id().clone(),
                white: self.session.identity(Color::White).clone(),
                black: self.session.identity(Color::Black).clone(),
                termination,
                outcome: termination.outcome(),
            };
            let _ = self.done.send(report);
        }
        tracing::info!(game = %self.session.id(), "game actor stopped");
    }

    fn handle(&mut self, cmd: GameCommand) {
        match cmd {
            GameCommand::Move { identity, mv, reply } => {
                let _ = reply.send(self.handle_move(&identity, mv));
            }
            GameCommand::OfferDraw { identity, reply } => {
                let _ = reply.send(self.handle_offer_draw(&identity));
            }
            GameCommand::AcceptDraw { identity, reply } => {
                let _ = reply.send(self.handle_accept_draw(&identity));
            }
            GameCommand::DeclineDraw { identity, reply } => {
                let _ = reply.send(self.handle_decline_draw(&identity));
            }
            GameCommand::Resign { identity, reply } => {
                let _ = reply.send(self.handle_resign(&identity));
            }
            GameCommand::Resume { identity } => {
                self.handle_resume(&identity);
            }
            GameCommand::Summary { identity, reply } => {
                let result = self
                    .session
                    .side_of(&identity)
                    .map(|side| self.session.summary_for(side, Instant::now()))
                    .ok_or(GameError::NotAPlayer(identity));
                let _ = reply.send(result);
            }
            GameCommand::Shutdown => {
                tracing::info!(
                    game = %self.session.id(),
                    "game shutting down without a result"
                );
                self.shut_down = true;
            }
        }
    }

    fn handle_move(
        &mut self,
        identity: &Identity,
        mv: Move,
    ) -> Result<Move, GameError> {
        let now = Instant::now();
        let record = self.session.make_move(identity, mv, now)?;

        // side_of cannot fail after a successful move.
        let opponent = match self.session.side_of(identity) {
            Some(side) => self.session.identity(side.opponent()).clone(),
            None => return Ok(record.mv),
        };

        // The opponent always learns the move; a terminal result rides
        // along in its `result` field. The mover's acknowledgement is
        // their notice.
        self.delivery.deliver(
            &opponent,
            ServerBody::OpponentMove {
                mv: record.mv,
                gameid: self.session.id().clone(),
                position: record.position,
            },
        );
        if record.termination.is_none() {
            self.delivery
                .deliver(&opponent, self.session.turn_notice(now));
        }
        Ok(record.mv)
    }

    fn handle_offer_draw(&mut self, identity: &Identity) -> Result<(), GameError> {
        self.session.offer_draw(identity)?;
        self.notify_opponent_of(identity, |gameid| {
            ServerBody::OpponentDrawRequest { gameid }
        });
        Ok(())
    }

    fn handle_accept_draw(
        &mut self,
        identity: &Identity,
    ) -> Result<(), GameError> {
        self.session.accept_draw(identity, Instant::now())?;
        // Both sides hear the acceptance; it is the terminal notice.
        let gameid = self.session.id().clone();
        for side in [Color::White, Color::Black] {
            self.delivery.deliver(
                self.session.identity(side),
                ServerBody::OpponentAcceptDrawRequest {
                    gameid: gameid.clone(),
                },
            );
        }
        Ok(())
    }

    fn handle_decline_draw(
        &mut self,
        identity: &Identity,
    ) -> Result<(), GameError> {
        self.session.decline_draw(identity)?;
        self.notify_opponent_of(identity, |gameid| {
            ServerBody::OpponentDeclineDrawRequest { gameid }
        });
        Ok(())
    }

    fn handle_resign(&mut self, identity: &Identity) -> Result<(), GameError> {
        self.session.resign(identity, Instant::now())?;
        self.notify_opponent_of(identity, |gameid| {
            ServerBody::OpponentResigns { gameid }
        });
        Ok(())
    }

    fn handle_resume(&mut self, identity: &Identity) {
        if self.session.is_over() {
            return;
        }
        if self.session.side_of(identity) == Some(self.session.to_play()) {
            self.delivery
                .deliver(identity, self.session.turn_notice(Instant::now()));
        }
    }

    fn handle_flag_fall(&mut self) {
        if self.session.flag_fall(Instant::now()).is_some() {
            // No dedicated packet exists for a flag fall; both clients
            // learn from their next keepalive, which stops listing the
            // game.
            tracing::info!(game = %self.session.id(), "flag fell");
        }
    }

    /// Sends a notice about `identity`'s action to their opponent.
    fn notify_opponent_of(
        &self,
        identity: &Identity,
        make: impl FnOnce(GameId) -> ServerBody,
    ) {
        if let Some(side) = self.session.side_of(identity) {
            let opponent = self.session.identity(side.opponent());
            self.delivery
                .deliver(opponent, make(self.session.id().clone()));
        }
    }
}

/// Sleeps until the flag deadline, or forever when the clock is frozen.
async fn sleep_until_flag(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Spawns a game actor task and returns a handle to communicate with it.
pub(crate) fn spawn_game<R: RulesEngine, D: Delivery>(
    game_id: GameId,
    white: Seat,
    black: Seat,
    control: TimeControl,
    rules: R,
    delivery: D,
    done: mpsc::UnboundedSender<GameOver>,
    channel_size: usize,
) -> GameHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let session = GameSession::new(
        game_id.clone(),
        white,
        black,
        control,
        rules,
        Instant::now(),
    );

    let actor = GameActor {
        session,
        delivery,
        done,
        receiver: rx,
        shut_down: false,
    };
    tokio::spawn(actor.run());

    GameHandle { game_id, sender: tx }
}
