//! Simulated wall clocks with per-replica skew.
//!
//! Last-writer-wins timestamps come from wall clocks, and real wall
//! clocks disagree. Each replica gets a constant skew drawn from the
//! seeded rng so that concurrent writes land with close but unequal
//! stamps, with occasional exact collisions left to the tie-break.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How simulated clocks are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Baseline timestamp in milliseconds.
    pub base_millis: u64,
    /// Milliseconds advanced per simulation round.
    pub tick_millis: u64,
    /// Maximum absolute skew assigned to a replica, in milliseconds.
    pub max_abs_skew_millis: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            base_millis: 1_700_000_000_000,
            tick_millis: 100,
            max_abs_skew_millis: 25,
        }
    }
}

impl ClockConfig {
    /// Draws a concrete per-replica clock.
    pub fn assign<R: Rng>(&self, rng: &mut R) -> SimClock {
        let bound = i64::try_from(self.max_abs_skew_millis).unwrap_or(i64::MAX);
        SimClock {
            base_millis: self.base_millis,
            tick_millis: self.tick_millis,
            skew_millis: rng.gen_range(-bound..=bound),
        }
    }
}

/// One replica's skewed wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    base_millis: u64,
    tick_millis: u64,
    skew_millis: i64,
}

impl SimClock {
    /// Wall time this replica would report at `round`.
    #[must_use]
    pub fn now(&self, round: u64) -> u64 {
        let ideal = self
            .base_millis
            .saturating_add(round.saturating_mul(self.tick_millis));
        if self.skew_millis >= 0 {
            ideal.saturating_add(self.skew_millis.unsigned_abs())
        } else {
            ideal.saturating_sub(self.skew_millis.unsigned_abs())
        }
    }

    /// The assigned skew, for traces.
    #[must_use]
    pub const fn skew_millis(&self) -> i64 {
        self.skew_millis
    }
}
