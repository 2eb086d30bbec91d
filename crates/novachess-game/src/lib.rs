//! Game sessions for the Novachess server.
//!
//! The layers, inside out:
//!
//! - [`GameSession`] — the pure state machine: position, history,
//!   clocks, draw negotiation, termination. Explicit `Instant`
//!   arguments, no I/O.
//! - [`actor`](crate::actor) internals — one Tokio task per game
//!   wrapping a session, reachable through a [`GameHandle`]. The task
//!   also owns the flag-fall timer.
//! - [`GameManager`] — the id → handle table.
//!
//! Chess legality itself lives behind the [`RulesEngine`] trait; this
//! crate treats positions as opaque strings.

mod actor;
mod error;
mod manager;
mod rules;
mod session;

pub use actor::{GameHandle, GameOver};
pub use error::GameError;
pub use manager::GameManager;
pub use rules::{RulesEngine, ScriptedRules};
pub use session::{GameSession, MoveRecord, Phase, Seat, Termination};
