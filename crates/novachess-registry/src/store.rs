//! The account-store collaborator: user profiles and result recording.
//!
//! The server does not own user accounts — it consumes a persistent store
//! keyed by opaque user ids through the [`AccountStore`] trait, the same
//! way authentication providers are plugged into a backend. An in-memory
//! implementation ships for tests and development.

use std::collections::HashMap;
use std::sync::Mutex;

use novachess_protocol::GameId;

use crate::RegistryError;

/// What the server needs to know about a user: enough to build the
/// `opponent` field of `game_found` and to seed matchmaking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub rating: u16,
}

/// The final outcome of a game, as recorded against the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    WhiteWins,
    BlackWins,
    Draw,
}

/// Looks up users and records finished games.
///
/// Rating math is the store's business — the server only transmits
/// precomputed deltas. `Send + Sync + 'static` because the store is
/// shared across every connection and game task.
pub trait AccountStore: Send + Sync + 'static {
    /// Resolves a permanent user id to its profile.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownUser`] if the uid does not exist.
    fn lookup(
        &self,
        uid: &str,
    ) -> impl std::future::Future<Output = Result<Profile, RegistryError>> + Send;

    /// Records the outcome of a finished game.
    fn record_result(
        &self,
        gameid: &GameId,
        outcome: Outcome,
    ) -> impl std::future::Future<Output = Result<(), RegistryError>> + Send;
}

impl<S: AccountStore> AccountStore for std::sync::Arc<S> {
    async fn lookup(&self, uid: &str) -> Result<Profile, RegistryError> {
        (**self).lookup(uid).await
    }

    async fn record_result(
        &self,
        gameid: &GameId,
        outcome: Outcome,
    ) -> Result<(), RegistryError> {
        (**self).record_result(gameid, outcome).await
    }
}

// ---------------------------------------------------------------------------
// MemoryAccountStore
// ---------------------------------------------------------------------------

/// An in-memory [`AccountStore`] for tests and development.
///
/// Holds profiles in a map and remembers every recorded result so tests
/// can assert on them.
#[derive(Default)]
pub struct MemoryAccountStore {
    users: Mutex<HashMap<String, Profile>>,
    results: Mutex<Vec<(GameId, Outcome)>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn insert(&self, uid: &str, username: &str, rating: u16) {
        self.users.lock().expect("store lock poisoned").insert(
            uid.to_string(),
            Profile {
                username: username.to_string(),
                rating,
            },
        );
    }

    /// Every result recorded so far, in recording order.
    pub fn recorded(&self) -> Vec<(GameId, Outcome)> {
        self.results.lock().expect("store lock poisoned").clone()
    }
}

impl AccountStore for MemoryAccountStore {
    async fn lookup(&self, uid: &str) -> Result<Profile, RegistryError> {
        self.users
            .lock()
            .expect("store lock poisoned")
            .get(uid)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownUser(uid.to_string()))
    }

    async fn record_result(
        &self,
        gameid: &GameId,
        outcome: Outcome,
    ) -> Result<(), RegistryError> {
        tracing::info!(%gameid, ?outcome, "game result recorded");
        self.results
            .lock()
            .expect("store lock poisoned")
            .push((gameid.clone(), outcome));
        Ok(())
    }
}
