//! The session registry: identity → connection → active game.
//!
//! This is the piece that makes reconnection work. Connections come and
//! go with the network; identities persist. The registry maps each
//! identity to its *current* outbound channel (absent while disconnected)
//! and to its at-most-one active game.
//!
//! # Concurrency note
//!
//! [`SessionRegistry`] itself is a plain map. All sharing goes through
//! [`SharedRegistry`], which wraps it in a `std::sync::Mutex` — every
//! operation is a short, await-free critical section, so a sync mutex is
//! both safe and cheaper than an async one here. Per-identity reads and
//! writes are serialized by that lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use novachess_protocol::{GameId, ServerBody};
use tokio::sync::mpsc;

use crate::{Identity, RegistryError};

/// The channel a connection task listens on for outbound bodies.
/// Packet ids are assigned at the connection, where the per-sender
/// monotonic counter lives.
pub type OutboundSender = mpsc::UnboundedSender<ServerBody>;

/// What the registry knows about one identity.
#[derive(Default)]
struct Entry {
    /// Current outbound channel; `None` while disconnected.
    outbound: Option<OutboundSender>,
    /// The identity's active game, if any. At most one — invariant.
    game: Option<GameId>,
}

/// Maps identities to connections and active games.
pub struct SessionRegistry {
    entries: HashMap<Identity, Entry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Binds an identity to a connection's outbound channel.
    ///
    /// Replaces any prior channel for that identity — this is how a
    /// reconnect takes over from a dead connection. Returns the
    /// identity's active game id, if any, so the caller can push a
    /// state-refresh packet to the reconnecting client.
    pub fn bind(
        &mut self,
        identity: Identity,
        outbound: OutboundSender,
    ) -> Option<GameId> {
        let entry = self.entries.entry(identity.clone()).or_default();
        let rebound = entry.outbound.is_some();
        entry.outbound = Some(outbound);
        tracing::info!(%identity, rebound, "identity bound");
        entry.game.clone()
    }

    /// Unbinds an identity from its connection.
    ///
    /// The identity's game slot is untouched: a torn-down connection
    /// never terminates a game, it just leaves the session awaiting
    /// reconnection. The entry itself is dropped once it holds neither
    /// a connection nor a game.
    pub fn unbind(&mut self, identity: &Identity) {
        if let Some(entry) = self.entries.get_mut(identity) {
            entry.outbound = None;
            tracing::info!(%identity, "identity unbound");
            if entry.game.is_none() {
                self.entries.remove(identity);
            }
        }
    }

    /// Returns `true` if the identity currently has a live connection.
    pub fn is_connected(&self, identity: &Identity) -> bool {
        self.entries
            .get(identity)
            .is_some_and(|e| e.outbound.is_some())
    }

    /// The identity's active game, if any.
    pub fn active_game(&self, identity: &Identity) -> Option<GameId> {
        self.entries.get(identity).and_then(|e| e.game.clone())
    }

    /// Marks an identity as participating in a game.
    ///
    /// # Errors
    /// Returns [`RegistryError::AlreadyInGame`] if the identity already
    /// has an active game — the one-game-per-identity invariant.
    pub fn set_game(
        &mut self,
        identity: &Identity,
        gameid: GameId,
    ) -> Result<(), RegistryError> {
        let entry = self.entries.entry(identity.clone()).or_default();
        if let Some(existing) = &entry.game {
            return Err(RegistryError::AlreadyInGame(
                identity.clone(),
                existing.clone(),
            ));
        }
        entry.game = Some(gameid);
        Ok(())
    }

    /// Marks both participants of a new pairing as in-game, atomically:
    /// either both slots are claimed or neither is touched.
    ///
    /// # Errors
    /// Returns [`RegistryError::AlreadyInGame`] for the first identity
    /// that already has an active game, leaving the other's slot alone.
    pub fn set_game_pair(
        &mut self,
        first: &Identity,
        second: &Identity,
        gameid: GameId,
    ) -> Result<(), RegistryError> {
        for identity in [first, second] {
            if let Some(existing) = self.active_game(identity) {
                return Err(RegistryError::AlreadyInGame(
                    identity.clone(),
                    existing,
                ));
            }
        }
        self.entries.entry(first.clone()).or_default().game =
            Some(gameid.clone());
        self.entries.entry(second.clone()).or_default().game = Some(gameid);
        Ok(())
    }

    /// Clears an identity's game slot (the game reached a terminal
    /// state). Drops the whole entry if the identity is also offline —
    /// in particular this is how a temp identity dies with its game.
    pub fn clear_game(&mut self, identity: &Identity) {
        if let Some(entry) = self.entries.get_mut(identity) {
            entry.game = None;
            if entry.outbound.is_none() {
                self.entries.remove(identity);
            }
        }
    }

    /// Sends a body to the identity's current connection, if it has one.
    ///
    /// Silently drops otherwise: the session persists by identity, and a
    /// disconnected participant simply misses live notifications until
    /// the next state refresh after reconnecting.
    pub fn deliver(&self, identity: &Identity, body: ServerBody) {
        if let Some(sender) = self
            .entries
            .get(identity)
            .and_then(|e| e.outbound.as_ref())
        {
            if sender.send(body).is_err() {
                tracing::debug!(%identity, "outbound channel gone, dropping");
            }
        } else {
            tracing::debug!(%identity, "identity offline, dropping delivery");
        }
    }

    /// Number of known identities (connected or awaiting reconnect).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Delivery + SharedRegistry
// ---------------------------------------------------------------------------

/// Routes a server body to whatever connection an identity currently
/// has. Game sessions and the matchmaker send through this seam instead
/// of holding connection channels directly, which is what lets a session
/// outlive its participants' transports — and what lets tests swap in a
/// capturing sink.
pub trait Delivery: Send + Sync + 'static {
    fn deliver(&self, to: &Identity, body: ServerBody);
}

/// The shareable handle to the one process-wide [`SessionRegistry`].
///
/// Cheap to clone; passed into connection handlers and game actors
/// explicitly rather than living in a global.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<Mutex<SessionRegistry>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// See [`SessionRegistry::bind`].
    pub fn bind(
        &self,
        identity: Identity,
        outbound: OutboundSender,
    ) -> Option<GameId> {
        self.lock().bind(identity, outbound)
    }

    /// See [`SessionRegistry::unbind`].
    pub fn unbind(&self, identity: &Identity) {
        self.lock().unbind(identity);
    }

    /// See [`SessionRegistry::is_connected`].
    pub fn is_connected(&self, identity: &Identity) -> bool {
        self.lock().is_connected(identity)
    }

    /// See [`SessionRegistry::active_game`].
    pub fn active_game(&self, identity: &Identity) -> Option<GameId> {
        self.lock().active_game(identity)
    }

    /// See [`SessionRegistry::set_game`].
    pub fn set_game(
        &self,
        identity: &Identity,
        gameid: GameId,
    ) -> Result<(), RegistryError> {
        self.lock().set_game(identity, gameid)
    }

    /// See [`SessionRegistry::set_game_pair`].
    pub fn set_game_pair(
        &self,
        first: &Identity,
        second: &Identity,
        gameid: GameId,
    ) -> Result<(), RegistryError> {
        self.lock().set_game_pair(first, second, gameid)
    }

    /// See [`SessionRegistry::clear_game`].
    pub fn clear_game(&self, identity: &Identity) {
        self.lock().clear_game(identity);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionRegistry> {
        self.inner.lock().expect("registry lock poisoned")
    }
}

impl Delivery for SharedRegistry {
    fn deliver(&self, to: &Identity, body: ServerBody) {
        self.lock().deliver(to, body);
    }
}

// =========================================================================
// Tests
// =========================================================================
