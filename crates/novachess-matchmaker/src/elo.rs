//! Elo rating arithmetic.
//!
//! The server announces the rating stakes of a game up front, so the
//! win/draw/loss deltas are computed when the pairing is made, not when
//! the game ends.

use novachess_protocol::EloChange;

/// K-factor applied to every game.
const K: f64 = 32.0;

/// The rating deltas `rating` would see against `opponent`, one per
/// possible outcome, rounded to the nearest point.
///
/// Standard Elo: expected score `E = 1 / (1 + 10^((opp - own) / 400))`,
/// delta `K * (score - E)` with scores 1, ½, 0.
pub fn elo_change(rating: u16, opponent: u16) -> EloChange {
    let expected =
        1.0 / (1.0 + 10f64.powf((f64::from(opponent) - f64::from(rating)) / 400.0));
    let delta = |score: f64| (K * (score - expected)).round() as i16;
    EloChange {
        win: delta(1.0),
        draw: delta(0.5),
        loss: delta(0.0),
    }
}

// =========================================================================
// Tests
// =========================================================================
