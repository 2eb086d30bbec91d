//! Wire protocol for the Novachess server.
//!
//! This crate defines the language client and server speak:
//!
//! - **Types** ([`Packet`], [`ClientBody`], [`ServerBody`], [`Move`],
//!   [`TimeControl`], etc.) — the closed set of typed packets covering
//!   matchmaking, move exchange, clocks, draw negotiation, resignation,
//!   and connection liveness.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how packets become
//!   bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong in between.
//!
//! The protocol layer knows nothing about connections, sessions, or
//! games; it only serializes, deserializes, and validates shape.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Castling, ClientBody, ClientPacket, ClockSnapshot, Color, EloChange,
    GameId, GameSummary, Move, MoveResult, Packet, PacketId, QuickUser,
    RatingRange, ServerBody, ServerPacket, Square, TimeControl,
};
