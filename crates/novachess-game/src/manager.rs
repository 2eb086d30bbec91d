//! Game manager: creates, tracks, and reaps game actors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use novachess_protocol::{GameId, TimeControl};
use novachess_registry::Delivery;
use tokio::sync::mpsc;

use crate::actor::spawn_game;
use crate::{GameHandle, GameOver, RulesEngine, Seat};

/// Counter for generating unique game ids.
static NEXT_GAME_ID: AtomicU64 = AtomicU64::new(1);

/// Default command channel size for game actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Tracks every running game by id.
///
/// The manager does not index players — the session registry already
/// maps each identity to its at-most-one active game, so lookups go
/// identity → game id (registry) → handle (here).
#[derive(Default)]
pub struct GameManager {
    games: HashMap<GameId, GameHandle>,
}

impl GameManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a new game between `white` and `black` and returns its id.
    ///
    /// `done` receives a single [`GameOver`] when the game reaches a
    /// terminal state.
    pub fn create<R: RulesEngine, D: Delivery>(
        &mut self,
        white: Seat,
        black: Seat,
        control: TimeControl,
        rules: R,
        delivery: D,
        done: mpsc::UnboundedSender<GameOver>,
    ) -> GameId {
        let game_id = GameId(
            NEXT_GAME_ID.fetch_add(1, Ordering::Relaxed).to_string(),
        );
        let handle = spawn_game(
            game_id.clone(),
            white,
            black,
            control,
            rules,
            delivery,
            done,
            DEFAULT_CHANNEL_SIZE,
        );
        self.games.insert(game_id.clone(), handle);
        tracing::info!(game = %game_id, games = self.games.len(), "game created");
        game_id
    }

    /// A clone of the handle for `game_id`, if the game still exists.
    pub fn handle(&self, game_id: &GameId) -> Option<GameHandle> {
        self.games.get(game_id).cloned()
    }

    /// Drops the entry for a finished game.
    pub fn remove(&mut self, game_id: &GameId) -> Option<GameHandle> {
        self.games.remove(game_id)
    }

    /// Drops entries whose actor has already exited. Cheap; called
    /// opportunistically rather than on a timer.
    pub fn reap_finished(&mut self) {
        self.games.retain(|game_id, handle| {
            let alive = !handle.is_finished();
            if !alive {
                tracing::debug!(game = %game_id, "reaped finished game");
            }
            alive
        });
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
