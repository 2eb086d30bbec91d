//! Matchmaking for the Novachess server.
//!
//! A single FIFO [`MatchQueue`] holds every player waiting for a game.
//! Each arriving request is compared against the pending ones in
//! arrival order; the first mutually compatible pair leaves the queue
//! together as a [`Pairing`] with randomly assigned colors.
//!
//! Rating math ([`elo_change`]) lives here too, so the server can
//! announce the stakes of a game the moment it is made.

mod elo;
mod error;
mod queue;

pub use elo::elo_change;
pub use error::MatchError;
pub use queue::{MatchQueue, MatchRequest, Pairing};
