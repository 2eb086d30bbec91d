//! Unified error type for the server crate.

use novachess_game::GameError;
use novachess_matchmaker::MatchError;
use novachess_protocol::ProtocolError;
use novachess_registry::RegistryError;
use novachess_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so `?` converts sub-crate errors automatically in the handler and
/// server loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A codec-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An identity or account-store error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A matchmaking error.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// A game session error.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The connection failed its liveness contract and was torn down.
    #[error("connection torn down: {0}")]
    Liveness(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Transport(_)));
        assert!(server_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_registry_error() {
        let err = RegistryError::UnknownUser("ghost".into());
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Registry(_)));
    }

    #[test]
    fn test_from_game_error() {
        let err = GameError::NotYourTurn;
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Game(_)));
    }
}
