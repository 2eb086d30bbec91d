//! Error types for the registry layer.

use novachess_protocol::GameId;

use crate::Identity;

/// Errors that can occur in identity and session tracking.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The account store has no user with this id.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The identity already has an active game. At most one game per
    /// identity at a time.
    #[error("{0} is already in game {1}")]
    AlreadyInGame(Identity, GameId),

    /// The account store backend failed.
    #[error("account store failure: {0}")]
    StoreFailure(String),
}
