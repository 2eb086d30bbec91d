//! The rules-engine boundary.
//!
//! Chess legality is not this crate's business. A [`RulesEngine`] is an
//! external collaborator that, given a position, enumerates the legal
//! moves (each already classified: a mating move carries
//! `MoveResult::Checkmate`, and so on) and applies a chosen move to
//! produce the next position. Positions are opaque FEN-like strings to
//! everything in this crate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use novachess_protocol::{Move, MoveResult};

/// Legal-move enumeration and position transitions for one game.
///
/// The served move set is authoritative: a session accepts a submitted
/// move only if it appears in the set this engine returned for the
/// current position, and copies the engine's classification into the
/// accepted move's `result` field.
pub trait RulesEngine: Send + Sync + 'static {
    /// The position a fresh game starts from.
    fn initial_position(&self) -> String;

    /// Every legal move in `position`, with `result` set to the
    /// terminal classification reached by playing it (or `Continue`).
    fn legal_moves(&self, position: &str) -> Vec<Move>;

    /// The position after playing `mv` in `position`. Only called with
    /// moves the engine itself served for `position`.
    fn apply(&self, position: &str, mv: &Move) -> String;
}

impl<R: RulesEngine> RulesEngine for Arc<R> {
    fn initial_position(&self) -> String {
        (**self).initial_position()
    }

    fn legal_moves(&self, position: &str) -> Vec<Move> {
        (**self).legal_moves(position)
    }

    fn apply(&self, position: &str, mv: &Move) -> String {
        (**self).apply(position, mv)
    }
}

/// A deterministic engine for tests and development: serves scripted
/// legal-move sets in order and derives positions by appending the
/// played move. Same role as `MemoryAccountStore` in the registry
/// crate — the real engine lives behind the same trait elsewhere.
///
/// Once the script is exhausted the last set keeps being served, so a
/// single-entry script behaves like a static engine.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRules {
    script: Arc<Mutex<VecDeque<Vec<Move>>>>,
    last: Arc<Mutex<Vec<Move>>>,
}

impl ScriptedRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the legal-move set to serve for the next position asked
    /// about. Builder-style, chainable.
    pub fn serve(self, legal: Vec<Move>) -> Self {
        self.script
            .lock()
            .expect("rules script lock poisoned")
            .push_back(legal);
        self
    }

    /// A classified move: `plain` from/to with the given result.
    pub fn classified(
        from: u8,
        to: u8,
        result: MoveResult,
    ) -> Option<Move> {
        use novachess_protocol::Square;
        let mut mv = Move::plain(Square::new(from)?, Square::new(to)?);
        mv.result = result;
        Some(mv)
    }
}

impl RulesEngine for ScriptedRules {
    fn initial_position(&self) -> String {
        "start".to_owned()
    }

    fn legal_moves(&self, _position: &str) -> Vec<Move> {
        let mut script =
            self.script.lock().expect("rules script lock poisoned");
        match script.pop_front() {
            Some(set) => {
                *self.last.lock().expect("rules script lock poisoned") =
                    set.clone();
                set
            }
            None => self
                .last
                .lock()
                .expect("rules script lock poisoned")
                .clone(),
        }
    }

    fn apply(&self, position: &str, mv: &Move) -> String {
        format!("{position}/{}{}", mv.from, mv.to)
    }
}
