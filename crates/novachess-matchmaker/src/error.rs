//! Error types for matchmaking.

use novachess_registry::Identity;

/// Errors that can occur while queueing for a game.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The identity is already waiting in the queue. One pending
    /// request per identity at a time.
    #[error("{0} is already queued for a game")]
    AlreadyQueued(Identity),
}
