//! Error types for game sessions.

use novachess_protocol::GameId;
use novachess_registry::Identity;

/// Errors that can occur while operating on a game session.
///
/// Every variant maps to a `server_err` sent to the offending identity
/// only; none of them changes session state.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The identity is not one of this game's two players.
    #[error("{0} is not a player in this game")]
    NotAPlayer(Identity),

    /// A move or offer from the side not to play.
    #[error("it is not your turn")]
    NotYourTurn,

    /// The submitted move is absent from the served legal-move set.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// `accept_draw` or `decline_draw` with no offer from the opponent
    /// outstanding.
    #[error("no draw offer to respond to")]
    NoDrawOffer,

    /// A second `offer_draw` while an offer is already outstanding.
    #[error("a draw offer is already pending")]
    OfferPending,

    /// Any action on a session that already reached a terminal state.
    #[error("the game is over")]
    GameOver,

    /// The game's actor task is gone (shut down or crashed).
    #[error("game {0} is unavailable")]
    Unavailable(GameId),
}
