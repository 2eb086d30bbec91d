//! Core protocol types for the Novachess wire format.
//!
//! Every message on the wire is a [`Packet`]: a unique per-sender `id`, a
//! command string, and a command-specific `data` object. The command set is
//! closed — it is modeled as two exhaustive enums ([`ClientBody`] for
//! client→server, [`ServerBody`] for server→client) so that adding a command
//! is a compile-time-checked change at every consumer.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique packet identifier, monotonic per sender.
///
/// Each side of the connection numbers its own outbound packets. The id is
/// echoed back in `acknowledge` packets (as `pid`) so the sender can
/// correlate acknowledgements with what it sent.
///
/// `#[serde(transparent)]` keeps the wire shape a plain number: a
/// `PacketId(42)` serializes to `42`, not `{ "0": 42 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(pub u64);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkt-{}", self.0)
    }
}

/// A server-assigned game identifier, stable for the life of one game.
///
/// All packets about a game (moves, draw negotiation, resignation) address
/// it by this id. Same newtype pattern as [`PacketId`], transparent string
/// on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Board primitives
// ---------------------------------------------------------------------------

/// A board square encoded as `rank * 8 + file`, 0–63.
///
/// The only validation the protocol layer does on moves is this range
/// check — everything else (legality, captures) is the rules engine's
/// business. Deserialization rejects out-of-range indices so a malformed
/// client can never smuggle a square like 200 past the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Square(u8);

impl Square {
    /// Highest valid square index (h8).
    pub const MAX: u8 = 63;

    /// Creates a square from a raw index, rejecting anything above 63.
    pub fn new(index: u8) -> Option<Self> {
        (index <= Self::MAX).then_some(Self(index))
    }

    /// The raw `rank * 8 + file` index.
    pub fn index(self) -> u8 {
        self.0
    }

    /// Rank 0–7.
    pub fn rank(self) -> u8 {
        self.0 / 8
    }

    /// File 0–7.
    pub fn file(self) -> u8 {
        self.0 % 8
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let index = u8::deserialize(d)?;
        Square::new(index).ok_or_else(|| {
            D::Error::custom(format!(
                "square index {index} out of range (0-63)"
            ))
        })
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Algebraic form, e.g. square 0 = "a1", square 63 = "h8".
        let file = (b'a' + self.file()) as char;
        write!(f, "{}{}", file, self.rank() + 1)
    }
}

/// The side a user plays, and the side to move. White = 1, Black = 0 on
/// the wire — integer-encoded, so this gets manual serde impls rather
/// than the derive (which would emit variant name strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    White = 1,
    Black = 0,
}

impl Color {
    /// The other side.
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match u8::deserialize(d)? {
            1 => Ok(Self::White),
            0 => Ok(Self::Black),
            other => Err(D::Error::custom(format!(
                "invalid color discriminant: {other}"
            ))),
        }
    }
}

/// Whether a move castles, and to which side. Integer-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Castling {
    /// Not a castling move.
    #[default]
    None = 0,
    /// O-O
    Kingside = 1,
    /// O-O-O
    Queenside = 2,
}

impl Serialize for Castling {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Castling {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(Self::None),
            1 => Ok(Self::Kingside),
            2 => Ok(Self::Queenside),
            other => Err(D::Error::custom(format!(
                "invalid castling discriminant: {other}"
            ))),
        }
    }
}

/// The position-level outcome of a move, as classified by the rules
/// engine. `Continue` on every move except the one that ends the game.
/// Integer-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MoveResult {
    /// No effect, the game continues.
    #[default]
    Continue = 0,
    Checkmate = 1,
    Stalemate = 2,
    Repetition = 3,
    InsufficientMaterial = 4,
    FiftyMoveRule = 5,
}

impl MoveResult {
    /// Returns `true` if this result ends the game.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl Serialize for MoveResult {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for MoveResult {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(Self::Continue),
            1 => Ok(Self::Checkmate),
            2 => Ok(Self::Stalemate),
            3 => Ok(Self::Repetition),
            4 => Ok(Self::InsufficientMaterial),
            5 => Ok(Self::FiftyMoveRule),
            other => Err(D::Error::custom(format!(
                "invalid move result discriminant: {other}"
            ))),
        }
    }
}

/// A single chess move as it travels on the wire.
///
/// `captures` names the captured square when the move captures (it differs
/// from `to` only for en passant). `result` is set by the server from the
/// rules engine's classification; it is `Continue` on every move except
/// the one that ends the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub captures: Option<Square>,
    pub castles: Castling,
    pub result: MoveResult,
}

impl Move {
    /// A plain (non-capturing, non-castling) move with no result.
    pub fn plain(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            captures: None,
            castles: Castling::None,
            result: MoveResult::Continue,
        }
    }
}

// ---------------------------------------------------------------------------
// Matchmaking primitives
// ---------------------------------------------------------------------------

/// The Elo band a match request will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRange {
    /// Lowest acceptable rating.
    pub low: u16,
    /// Highest acceptable rating.
    pub high: u16,
}

impl RatingRange {
    /// Returns `true` if `rating` falls inside this range (inclusive).
    pub fn contains(&self, rating: u16) -> bool {
        self.low <= rating && rating <= self.high
    }
}

/// Clock rules for a game: starting time, per-move increment, and the
/// delay before a side's clock starts running, all in seconds.
///
/// Matchmaking requires an exact match on all three fields — there is no
/// negotiation. Unsigned fields mean negative values are rejected at the
/// codec, not by a runtime check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeControl {
    /// Starting time in seconds (the X in X|Y).
    pub start: u32,
    /// Increment in seconds added after each move (the Y in X|Y).
    pub increment: u32,
    /// Per-turn delay in seconds before the clock starts counting down.
    pub delay: u32,
}

/// A quick-reference summary of a user, carried in `game_found` and game
/// snapshots so the client can render the opponent without a separate
/// account lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickUser {
    pub id: String,
    pub username: String,
    pub rating: u16,
}

/// The precomputed Elo deltas for each possible outcome of a game.
///
/// Computed once at pairing time and transmitted; the client never
/// recomputes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EloChange {
    /// Rating change if the user wins.
    pub win: i16,
    /// Rating change if the user draws.
    pub draw: i16,
    /// Rating change if the user loses.
    pub loss: i16,
}

// ---------------------------------------------------------------------------
// Game snapshots
// ---------------------------------------------------------------------------

/// Time remaining on each side, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub white: f64,
    pub black: f64,
}

/// The per-game entry inside `keep_alive` and `acknowledge_logon` packets.
///
/// This doubles as the state-refresh a reconnecting client uses to
/// resynchronize: which side it plays, whose turn it is, who the opponent
/// is, and where both clocks stand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub gameid: GameId,
    /// Which side the receiving user plays.
    pub userplays: Color,
    /// Which side is to move.
    pub toplay: Color,
    pub opponent: QuickUser,
    pub clock: ClockSnapshot,
}

// ---------------------------------------------------------------------------
// Packet bodies
// ---------------------------------------------------------------------------

/// Everything a client can send, keyed by command string.
///
/// `#[serde(tag = "cmd", content = "data")]` produces the wire shape
/// `{ "cmd": "make_move", "data": { ... } }` — adjacently tagged, with
/// `rename_all` turning variant names into the protocol's snake_case
/// command strings. Empty-payload commands are zero-field struct variants
/// so `data` is an empty object rather than absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data", rename_all = "snake_case")]
pub enum ClientBody {
    /// Ask to be matched against another user.
    RequestGameVsUser {
        ratingrange: RatingRange,
        timecontrol: TimeControl,
    },

    /// Confirm receipt of the server packet with id `pid`.
    Acknowledge { pid: PacketId },

    /// Log on with a permanent account id (or a still-live temp id).
    LogonAccount { uid: String },

    /// Log on without an account. A temporary id is assigned by the
    /// server once this user becomes a game participant.
    LogonAnon {},

    OfferDraw { gameid: GameId },

    /// Accept the opponent's outstanding draw offer. The server errors
    /// if no such offer exists.
    AcceptDraw { gameid: GameId },

    /// Decline the opponent's outstanding draw offer. The server errors
    /// if no such offer exists.
    DeclineDraw { gameid: GameId },

    Resign { gameid: GameId },

    /// Submit a move. The server validates it against its own legal-move
    /// set; an illegal move is rejected, never silently corrected.
    MakeMove {
        #[serde(rename = "move")]
        mv: Move,
        gameid: GameId,
    },

    /// Close the connection. Does not end any in-progress game.
    TerminateConnection {},
}

impl ClientBody {
    /// The protocol command string for this body.
    pub fn cmd(&self) -> &'static str {
        match self {
            Self::RequestGameVsUser { .. } => "request_game_vs_user",
            Self::Acknowledge { .. } => "acknowledge",
            Self::LogonAccount { .. } => "logon_account",
            Self::LogonAnon {} => "logon_anon",
            Self::OfferDraw { .. } => "offer_draw",
            Self::AcceptDraw { .. } => "accept_draw",
            Self::DeclineDraw { .. } => "decline_draw",
            Self::Resign { .. } => "resign",
            Self::MakeMove { .. } => "make_move",
            Self::TerminateConnection {} => "terminate_connection",
        }
    }

    /// Returns `true` if this packet must be answered with an
    /// `acknowledge`. Acknowledgements and connection terminations are
    /// the only self-acknowledging commands.
    pub fn wants_ack(&self) -> bool {
        !matches!(
            self,
            Self::Acknowledge { .. } | Self::TerminateConnection {}
        )
    }
}

/// Everything the server can send. Same adjacently-tagged encoding as
/// [`ClientBody`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data", rename_all = "snake_case")]
pub enum ServerBody {
    /// The acknowledgement used in place of `acknowledge` for logon
    /// packets: it carries the games the identity is participating in,
    /// which is also the state refresh a reconnecting client needs.
    AcknowledgeLogon { games: Vec<GameSummary> },

    /// Sent every 5 seconds: both a liveness probe and a state refresh.
    /// If the client sends nothing for 5 more seconds, the connection is
    /// assumed dead.
    KeepAlive { games: Vec<GameSummary> },

    /// A temporary user id assigned to an anonymous user for the
    /// lifetime of one game. Always precedes any game packet for that
    /// user.
    AssignTempId { temp_id: String },

    /// An error occurred. `msg` is for the user, `debug_msg` for devs.
    ServerErr { msg: String, debug_msg: String },

    /// A suitable game was found.
    GameFound {
        opponent: QuickUser,
        elo_change: EloChange,
        /// The side the user plays.
        play: Color,
        gameid: GameId,
    },

    Acknowledge { pid: PacketId },

    /// It is the user's turn; here is every move they may make.
    UserMakeMove {
        available_moves: Vec<Move>,
        gameid: GameId,
        /// Position as a FEN substring.
        position: String,
        /// The user's time remaining in seconds.
        timeremaining: f64,
    },

    /// The opponent moved. Followed by a `user_make_move` if the game
    /// did not end on this move.
    OpponentMove {
        #[serde(rename = "move")]
        mv: Move,
        gameid: GameId,
        /// The resulting position as a FEN substring.
        position: String,
    },

    OpponentResigns { gameid: GameId },

    OpponentDrawRequest { gameid: GameId },

    OpponentDeclineDrawRequest { gameid: GameId },

    /// The opponent accepted the draw offer; the game is over.
    OpponentAcceptDrawRequest { gameid: GameId },

    TerminateConnection {},
}

impl ServerBody {
    /// The protocol command string for this body.
    pub fn cmd(&self) -> &'static str {
        match self {
            Self::AcknowledgeLogon { .. } => "acknowledge_logon",
            Self::KeepAlive { .. } => "keep_alive",
            Self::AssignTempId { .. } => "assign_temp_id",
            Self::ServerErr { .. } => "server_err",
            Self::GameFound { .. } => "game_found",
            Self::Acknowledge { .. } => "acknowledge",
            Self::UserMakeMove { .. } => "user_make_move",
            Self::OpponentMove { .. } => "opponent_move",
            Self::OpponentResigns { .. } => "opponent_resigns",
            Self::OpponentDrawRequest { .. } => "opponent_draw_request",
            Self::OpponentDeclineDrawRequest { .. } => {
                "opponent_decline_draw_request"
            }
            Self::OpponentAcceptDrawRequest { .. } => {
                "opponent_accept_draw_request"
            }
            Self::TerminateConnection {} => "terminate_connection",
        }
    }

    /// Returns `true` if the client is expected to acknowledge this
    /// packet within the liveness window.
    pub fn wants_ack(&self) -> bool {
        !matches!(
            self,
            Self::Acknowledge { .. } | Self::TerminateConnection {}
        )
    }
}

// ---------------------------------------------------------------------------
// Packet — the top-level wire format
// ---------------------------------------------------------------------------

/// The top-level message: a per-sender unique id plus a tagged body.
///
/// ```text
/// { "id": 42, "cmd": "make_move", "data": { "move": ..., "gameid": ... } }
/// ```
///
/// `#[serde(flatten)]` splices the body's `cmd`/`data` pair into the same
/// object as `id`. Packets are immutable once sent; retransmission reuses
/// the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet<B> {
    pub id: PacketId,
    #[serde(flatten)]
    pub body: B,
}

/// A full client→server packet.
pub type ClientPacket = Packet<ClientBody>;

/// A full server→client packet.
pub type ServerPacket = Packet<ServerBody>;

// =========================================================================
// Tests
// =========================================================================
