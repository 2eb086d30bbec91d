//! The FIFO matchmaking queue.

use novachess_protocol::{EloChange, QuickUser, RatingRange, TimeControl};
use novachess_registry::Identity;
use rand::Rng;

use crate::{elo_change, MatchError};

/// One player's standing request for a game.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub identity: Identity,
    pub username: String,
    pub rating: u16,
    /// Opponent ratings this player will accept.
    pub range: RatingRange,
    pub control: TimeControl,
}

impl MatchRequest {
    /// Two requests pair iff each accepts the other's rating and both
    /// asked for the same time control.
    fn compatible(&self, other: &MatchRequest) -> bool {
        self.range.contains(other.rating)
            && other.range.contains(self.rating)
            && self.control == other.control
    }

    /// This player as seen by their opponent.
    pub fn quick_user(&self) -> QuickUser {
        QuickUser {
            id: self.identity.as_str().to_owned(),
            username: self.username.clone(),
            rating: self.rating,
        }
    }
}

/// A made match: two requests that left the queue together.
///
/// Colors are assigned uniformly at random when the pairing is made.
#[derive(Debug, Clone)]
pub struct Pairing {
    pub white: MatchRequest,
    pub black: MatchRequest,
    pub control: TimeControl,
}

impl Pairing {
    fn new(a: MatchRequest, b: MatchRequest) -> Self {
        let control = a.control;
        let (white, black) = if rand::rng().random::<bool>() {
            (a, b)
        } else {
            (b, a)
        };
        Self { white, black, control }
    }

    /// The rating deltas White is playing for.
    pub fn elo_for_white(&self) -> EloChange {
        elo_change(self.white.rating, self.black.rating)
    }

    /// The rating deltas Black is playing for.
    pub fn elo_for_black(&self) -> EloChange {
        elo_change(self.black.rating, self.white.rating)
    }
}

/// Players waiting for an opponent, in arrival order.
///
/// The queue never matches proactively: pairings happen only when a new
/// request arrives, against the pending requests in FIFO order, so the
/// longest-waiting compatible player always wins the tie-break.
#[derive(Debug, Default)]
pub struct MatchQueue {
    pending: Vec<MatchRequest>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a request, pairing it immediately with the earliest
    /// compatible pending request if one exists. On a pairing both
    /// requests leave the queue atomically.
    ///
    /// # Errors
    /// Returns [`MatchError::AlreadyQueued`] if this identity already
    /// has a pending request. The queue is unchanged.
    pub fn enqueue(&mut self, request: MatchRequest) -> Result<Option<Pairing>, MatchError> {
        if self.pending.iter().any(|r| r.identity == request.identity) {
            return Err(MatchError::AlreadyQueued(request.identity));
        }

        let found = self
            .pending
            .iter()
            .position(|candidate| candidate.compatible(&request));
        match found {
            Some(index) => {
                let candidate = self.pending.remove(index);
                tracing::info!(
                    a = %candidate.identity,
                    b = %request.identity,
                    waiting = self.pending.len(),
                    "match made"
                );
                Ok(Some(Pairing::new(candidate, request)))
            }
            None => {
                tracing::debug!(
                    identity = %request.identity,
                    waiting = self.pending.len() + 1,
                    "queued for a game"
                );
                self.pending.push(request);
                Ok(None)
            }
        }
    }

    /// Removes an identity's pending request, if any. Called on
    /// disconnect, so a missing request is not an error.
    pub fn withdraw(&mut self, identity: &Identity) -> bool {
        let before = self.pending.len();
        self.pending.retain(|r| &r.identity != identity);
        let removed = self.pending.len() < before;
        if removed {
            tracing::debug!(%identity, "withdrawn from queue");
        }
        removed
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.pending.iter().any(|r| &r.identity == identity)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
