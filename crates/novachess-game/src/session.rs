//! The game session state machine.
//!
//! [`GameSession`] is deliberately pure: every operation takes an
//! explicit `Instant` and returns what happened, with no channels, no
//! tasks, and no I/O. The actor in [`crate::actor`] wraps one session
//! and does the delivering; tests drive the machine directly.
//!
//! ```text
//!             make_move (terminal classification)
//!             resign / accept_draw / flag fall
//!  InProgress ─────────────────────────────────► Finished(Termination)
//!      ▲                                              │
//!      └── make_move / draw offers cycle here         └── no way out
//! ```

use std::time::{Duration, Instant};

use novachess_clock::ChessClock;
use novachess_protocol::{
    ClockSnapshot, Color, GameId, GameSummary, Move, MoveResult, QuickUser,
    ServerBody, TimeControl,
};
use novachess_registry::{Identity, Outcome};

use crate::{GameError, RulesEngine};

/// How a finished game ended.
///
/// The first five come from the rules engine's move classification; the
/// last three are session-level outcomes with no position behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Checkmate { winner: Color },
    Stalemate,
    Repetition,
    InsufficientMaterial,
    FiftyMoveRule,
    Resigned { loser: Color },
    DrawAgreed,
    TimeForfeit { loser: Color },
}

impl Termination {
    /// Lifts a terminal move classification into a termination.
    /// `mover` is the side that played the move; a mating move makes
    /// them the winner. Returns `None` for `Continue`.
    pub fn from_move_result(result: MoveResult, mover: Color) -> Option<Self> {
        match result {
            MoveResult::Continue => None,
            MoveResult::Checkmate => Some(Self::Checkmate { winner: mover }),
            MoveResult::Stalemate => Some(Self::Stalemate),
            MoveResult::Repetition => Some(Self::Repetition),
            MoveResult::InsufficientMaterial => {
                Some(Self::InsufficientMaterial)
            }
            MoveResult::FiftyMoveRule => Some(Self::FiftyMoveRule),
        }
    }

    /// The game outcome this termination records against both accounts.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Checkmate { winner } => win_for(*winner),
            Self::Resigned { loser } | Self::TimeForfeit { loser } => {
                win_for(loser.opponent())
            }
            Self::Stalemate
            | Self::Repetition
            | Self::InsufficientMaterial
            | Self::FiftyMoveRule
            | Self::DrawAgreed => Outcome::Draw,
        }
    }
}

fn win_for(side: Color) -> Outcome {
    match side {
        Color::White => Outcome::WhiteWins,
        Color::Black => Outcome::BlackWins,
    }
}

/// Where a session is in its lifecycle. `Finished` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    InProgress,
    Finished(Termination),
}

/// One side of the board: who sits there and how to describe them to
/// the opponent.
#[derive(Debug, Clone)]
pub struct Seat {
    pub identity: Identity,
    pub user: QuickUser,
}

/// What an accepted move did to the session.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    /// The canonical move, with `captures` and `result` taken from the
    /// served legal set rather than the client's claim.
    pub mv: Move,
    /// The position after the move.
    pub position: String,
    /// Set iff this move ended the game.
    pub termination: Option<Termination>,
}

/// One game between two identities: position, history, clocks, draw
/// negotiation, and termination.
pub struct GameSession<R: RulesEngine> {
    id: GameId,
    rules: R,
    /// Indexed by `Color as usize` (Black = 0, White = 1).
    seats: [Seat; 2],
    position: String,
    history: Vec<Move>,
    /// The legal moves served for the current position. Authoritative:
    /// a submitted move must match an entry here.
    served: Vec<Move>,
    to_play: Color,
    clock: ChessClock,
    draw_offer: Option<Color>,
    phase: Phase,
}

impl<R: RulesEngine> GameSession<R> {
    /// Creates a session in `InProgress` with White to move and White's
    /// clock running from `now`.
    pub fn new(
        id: GameId,
        white: Seat,
        black: Seat,
        control: TimeControl,
        rules: R,
        now: Instant,
    ) -> Self {
        let position = rules.initial_position();
        let served = rules.legal_moves(&position);
        let mut clock = ChessClock::new(control);
        // A fresh clock cannot already be started.
        let _ = clock.start(now);
        Self {
            id,
            rules,
            seats: [black, white],
            position,
            history: Vec::new(),
            served,
            to_play: Color::White,
            clock,
            draw_offer: None,
            phase: Phase::InProgress,
        }
    }

    // --- accessors -------------------------------------------------------

    pub fn id(&self) -> &GameId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    pub fn to_play(&self) -> Color {
        self.to_play
    }

    pub fn position(&self) -> &str {
        &self.position
    }

    pub fn history(&self) -> &[Move] {
        &self.history
    }

    /// The legal moves currently served for the side to play.
    pub fn served_moves(&self) -> &[Move] {
        &self.served
    }

    pub fn draw_offer(&self) -> Option<Color> {
        self.draw_offer
    }

    /// Which side this identity plays, or `None` for a bystander.
    pub fn side_of(&self, identity: &Identity) -> Option<Color> {
        if self.seats[Color::White as usize].identity == *identity {
            Some(Color::White)
        } else if self.seats[Color::Black as usize].identity == *identity {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn identity(&self, side: Color) -> &Identity {
        &self.seats[side as usize].identity
    }

    pub fn user(&self, side: Color) -> &QuickUser {
        &self.seats[side as usize].user
    }

    pub fn remaining(&self, side: Color, now: Instant) -> Duration {
        self.clock.remaining(side, now)
    }

    pub fn snapshot(&self, now: Instant) -> ClockSnapshot {
        self.clock.snapshot(now)
    }

    /// When the running side's flag falls. `None` once finished.
    pub fn flag_deadline(&self) -> Option<Instant> {
        self.clock.flag_deadline()
    }

    /// The per-game entry for `side`'s keepalive and logon packets.
    pub fn summary_for(&self, side: Color, now: Instant) -> GameSummary {
        GameSummary {
            gameid: self.id.clone(),
            userplays: side,
            toplay: self.to_play,
            opponent: self.user(side.opponent()).clone(),
            clock: self.snapshot(now),
        }
    }

    /// The `user_make_move` packet for the side to play: the served
    /// legal set, the position, and their live remaining time.
    pub fn turn_notice(&self, now: Instant) -> ServerBody {
        ServerBody::UserMakeMove {
            available_moves: self.served.clone(),
            gameid: self.id.clone(),
            position: self.position.clone(),
            timeremaining: self.remaining(self.to_play, now).as_secs_f64(),
        }
    }

    // --- transitions -----------------------------------------------------

    /// Plays a move for `identity`.
    ///
    /// The move must come from the side to play and must match an entry
    /// in the served legal set (matched on `from`/`to`/`castles`; the
    /// served entry's `captures` and `result` are authoritative). On
    /// acceptance the mover's clock is charged, the position advances,
    /// any standing draw offer is voided, and — if the served entry
    /// carries a terminal classification — the session finishes.
    ///
    /// A move arriving after the flag deadline is not accepted, even if
    /// the actor's timer has not fired yet: the session finishes as a
    /// time forfeit and the move is rejected.
    ///
    /// # Errors
    /// [`GameError::NotAPlayer`], [`GameError::GameOver`],
    /// [`GameError::NotYourTurn`], or [`GameError::IllegalMove`]; apart
    /// from the flag-fall transition the session is unchanged on every
    /// error.
    pub fn make_move(
        &mut self,
        identity: &Identity,
        submitted: Move,
        now: Instant,
    ) -> Result<MoveRecord, GameError> {
        let side = self.require_player(identity)?;
        self.require_in_progress()?;
        // A move racing the flag timer loses to the flag: the clock is
        // the authority, not whichever event reaches the actor first.
        if self.flag_fall(now).is_some() {
            return Err(GameError::GameOver);
        }
        if side != self.to_play {
            return Err(GameError::NotYourTurn);
        }

        let mv = self
            .served
            .iter()
            .find(|m| {
                m.from == submitted.from
                    && m.to == submitted.to
                    && m.castles == submitted.castles
            })
            .copied()
            .ok_or_else(|| {
                GameError::IllegalMove(format!(
                    "{}{}",
                    submitted.from, submitted.to
                ))
            })?;

        // The clock runs iff the phase is InProgress, checked above.
        let _ = self.clock.press(now);
        self.history.push(mv);
        self.position = self.rules.apply(&self.position, &mv);
        // An offer applies to the position it was made in.
        self.draw_offer = None;

        let termination = Termination::from_move_result(mv.result, side);
        match termination {
            Some(termination) => {
                self.finish(termination, now);
                self.served.clear();
            }
            None => {
                self.to_play = side.opponent();
                self.served = self.rules.legal_moves(&self.position);
            }
        }

        tracing::debug!(
            game = %self.id,
            mover = %side,
            mv = %format_args!("{}{}", mv.from, mv.to),
            plies = self.history.len(),
            "move accepted"
        );
        Ok(MoveRecord {
            mv,
            position: self.position.clone(),
            termination,
        })
    }

    /// Records a draw offer by `identity`.
    ///
    /// # Errors
    /// [`GameError::OfferPending`] while any offer stands — a player
    /// facing an offer answers it with accept or decline, not a
    /// counter-offer.
    pub fn offer_draw(&mut self, identity: &Identity) -> Result<(), GameError> {
        let side = self.require_player(identity)?;
        self.require_in_progress()?;
        if self.draw_offer.is_some() {
            return Err(GameError::OfferPending);
        }
        self.draw_offer = Some(side);
        tracing::debug!(game = %self.id, by = %side, "draw offered");
        Ok(())
    }

    /// Accepts the opponent's standing draw offer and finishes the game.
    ///
    /// # Errors
    /// [`GameError::NoDrawOffer`] unless the *opponent* has an offer
    /// outstanding — a player cannot accept their own.
    pub fn accept_draw(
        &mut self,
        identity: &Identity,
        now: Instant,
    ) -> Result<(), GameError> {
        let side = self.require_player(identity)?;
        self.require_in_progress()?;
        if self.draw_offer != Some(side.opponent()) {
            return Err(GameError::NoDrawOffer);
        }
        self.draw_offer = None;
        self.finish(Termination::DrawAgreed, now);
        Ok(())
    }

    /// Declines the opponent's standing draw offer; play continues.
    ///
    /// # Errors
    /// [`GameError::NoDrawOffer`] unless the opponent has an offer
    /// outstanding.
    pub fn decline_draw(
        &mut self,
        identity: &Identity,
    ) -> Result<(), GameError> {
        let side = self.require_player(identity)?;
        self.require_in_progress()?;
        if self.draw_offer != Some(side.opponent()) {
            return Err(GameError::NoDrawOffer);
        }
        self.draw_offer = None;
        tracing::debug!(game = %self.id, by = %side, "draw declined");
        Ok(())
    }

    /// Resigns the game for `identity`. Legal on either side's turn.
    pub fn resign(
        &mut self,
        identity: &Identity,
        now: Instant,
    ) -> Result<(), GameError> {
        let side = self.require_player(identity)?;
        self.require_in_progress()?;
        self.finish(Termination::Resigned { loser: side }, now);
        Ok(())
    }

    /// Checks the running side's flag. If it has fallen, finishes the
    /// game as a time forfeit and returns the termination.
    pub fn flag_fall(&mut self, now: Instant) -> Option<Termination> {
        if self.is_over() {
            return None;
        }
        let loser = self.clock.expired(now)?;
        let termination = Termination::TimeForfeit { loser };
        self.finish(termination, now);
        Some(termination)
    }

    fn finish(&mut self, termination: Termination, now: Instant) {
        let _ = self.clock.freeze(now);
        self.phase = Phase::Finished(termination);
        tracing::info!(
            game = %self.id,
            ?termination,
            plies = self.history.len(),
            "game finished"
        );
    }

    fn require_player(
        &self,
        identity: &Identity,
    ) -> Result<Color, GameError> {
        self.side_of(identity)
            .ok_or_else(|| GameError::NotAPlayer(identity.clone()))
    }

    fn require_in_progress(&self) -> Result<(), GameError> {
        match self.phase {
            Phase::InProgress => Ok(()),
            Phase::Finished(_) => Err(GameError::GameOver),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
