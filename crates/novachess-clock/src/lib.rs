//! Chess clock accounting for the Novachess server.
//!
//! One [`ChessClock`] per game session, driven by the session's actor.
//! The clock itself never sleeps or spawns timers — every operation takes
//! an explicit `Instant`, which keeps the arithmetic deterministic and
//! testable, and the actor turns [`ChessClock::flag_deadline`] into a
//! `tokio::time::sleep_until` in its select loop.
//!
//! # Invariants
//!
//! - While a game is in progress exactly one side's clock runs; the
//!   other side's value is frozen.
//! - After [`freeze`](ChessClock::freeze) neither side runs (terminal
//!   state), and no operation restarts the clock.
//! - The delay portion of a turn is free: a side that answers within
//!   `delay` seconds is charged nothing.

use std::time::{Duration, Instant};

use novachess_protocol::{ClockSnapshot, Color, TimeControl};

/// Errors from clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// `press` or `freeze` on a clock that isn't running.
    #[error("clock is not running")]
    NotRunning,

    /// `start` on a clock that already ran.
    #[error("clock was already started")]
    AlreadyStarted,
}

/// Both players' clocks for one game.
///
/// ```text
/// start(now)            press(now)              freeze(now)
///   White runs  ──────►  charge mover,  ──────►  neither runs
///                        +increment,             (terminal)
///                        opponent runs
/// ```
#[derive(Debug, Clone)]
pub struct ChessClock {
    control: TimeControl,
    /// Remaining time per side, indexed by `Color as usize`
    /// (Black = 0, White = 1).
    remaining: [Duration; 2],
    /// The running side and when its turn started. `None` before
    /// `start` and after `freeze`.
    running: Option<(Color, Instant)>,
    started: bool,
}

impl ChessClock {
    /// A fresh clock: both sides at `control.start`, nothing running.
    pub fn new(control: TimeControl) -> Self {
        let start = Duration::from_secs(u64::from(control.start));
        Self {
            control,
            remaining: [start, start],
            running: None,
            started: false,
        }
    }

    /// Starts the game: White's clock runs first.
    ///
    /// # Errors
    /// Returns [`ClockError::AlreadyStarted`] on a second call — a
    /// session is created exactly once.
    pub fn start(&mut self, now: Instant) -> Result<(), ClockError> {
        if self.started {
            return Err(ClockError::AlreadyStarted);
        }
        self.started = true;
        self.running = Some((Color::White, now));
        tracing::debug!(control = ?self.control, "clock started, white to move");
        Ok(())
    }

    /// The side whose clock is currently running, if any.
    pub fn running(&self) -> Option<Color> {
        self.running.map(|(side, _)| side)
    }

    /// The mover presses the clock: their elapsed turn time (minus the
    /// delay allowance) is charged, their increment is added back, and
    /// the opponent's clock starts running.
    ///
    /// Returns the side now to move.
    ///
    /// # Errors
    /// Returns [`ClockError::NotRunning`] before `start` or after
    /// `freeze`.
    pub fn press(&mut self, now: Instant) -> Result<Color, ClockError> {
        let (side, turn_start) = self.running.ok_or(ClockError::NotRunning)?;

        let charged = self.charge(side, turn_start, now);
        let slot = &mut self.remaining[side as usize];
        *slot += Duration::from_secs(u64::from(self.control.increment));

        let next = side.opponent();
        self.running = Some((next, now));
        tracing::trace!(
            mover = %side,
            charged_ms = charged.as_millis() as u64,
            "clock pressed"
        );
        Ok(next)
    }

    /// Stops both clocks permanently (the game reached a terminal
    /// state). The running side is charged its live elapsed time, no
    /// increment.
    ///
    /// # Errors
    /// Returns [`ClockError::NotRunning`] if nothing is running.
    pub fn freeze(&mut self, now: Instant) -> Result<(), ClockError> {
        let (side, turn_start) = self.running.ok_or(ClockError::NotRunning)?;
        self.charge(side, turn_start, now);
        self.running = None;
        tracing::debug!("clock frozen");
        Ok(())
    }

    /// The live time remaining for a side. For the running side this
    /// strictly decreases in real time (once past the delay allowance);
    /// for the other side it is frozen.
    pub fn remaining(&self, side: Color, now: Instant) -> Duration {
        let banked = self.remaining[side as usize];
        match self.running {
            Some((running, turn_start)) if running == side => {
                banked.saturating_sub(self.turn_charge(turn_start, now))
            }
            _ => banked,
        }
    }

    /// The instant at which the running side's flag falls, for the
    /// session actor's expiry timer. `None` when nothing is running.
    pub fn flag_deadline(&self) -> Option<Instant> {
        let (side, turn_start) = self.running?;
        Some(
            turn_start
                + Duration::from_secs(u64::from(self.control.delay))
                + self.remaining[side as usize],
        )
    }

    /// The side whose flag has fallen as of `now`, if any.
    pub fn expired(&self, now: Instant) -> Option<Color> {
        let (side, _) = self.running?;
        (self.remaining(side, now) == Duration::ZERO).then_some(side)
    }

    /// Both sides' live remaining time in wire form (seconds).
    pub fn snapshot(&self, now: Instant) -> ClockSnapshot {
        ClockSnapshot {
            white: self.remaining(Color::White, now).as_secs_f64(),
            black: self.remaining(Color::Black, now).as_secs_f64(),
        }
    }

    /// What a turn lasting from `turn_start` to `now` costs: elapsed
    /// time past the delay allowance, never negative.
    fn turn_charge(&self, turn_start: Instant, now: Instant) -> Duration {
        now.saturating_duration_since(turn_start)
            .saturating_sub(Duration::from_secs(u64::from(self.control.delay)))
    }

    /// Deducts the turn charge from `side`'s bank and returns it.
    fn charge(&mut self, side: Color, turn_start: Instant, now: Instant) -> Duration {
        let charged = self.turn_charge(turn_start, now);
        let slot = &mut self.remaining[side as usize];
        *slot = slot.saturating_sub(charged);
        charged
    }
}

// =========================================================================
// Tests
// =========================================================================
