//! Counter with increments and decrements.
//!
//! Two [`GCounter`]s, one for raises and one for lowers; the readable value
//! is their difference and may be negative. Merging merges each side
//! independently, which keeps the whole thing a semilattice even though the
//! visible value moves in both directions.

use serde::{Deserialize, Serialize};

use crate::crdt::GCounter;
use crate::error::CrdtError;
use crate::merge::Merge;
use crate::node::NodeId;

/// Increment/decrement counter built from two grow-only halves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnCounter {
    positive: GCounter,
    negative: GCounter,
}

impl PnCounter {
    /// New counter with value zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the counter by `amount`.
    ///
    /// # Errors
    ///
    /// [`CrdtError::NegativeAmount`] when `amount` is negative; use
    /// [`PnCounter::decrement`] to lower the value.
    pub fn increment(&mut self, node: &NodeId, amount: i64) -> Result<(), CrdtError> {
        self.positive.increment(node, amount)
    }

    /// Lower the counter by `amount` (itself non-negative).
    ///
    /// # Errors
    ///
    /// [`CrdtError::NegativeAmount`] when `amount` is negative.
    pub fn decrement(&mut self, node: &NodeId, amount: i64) -> Result<(), CrdtError> {
        self.negative.increment(node, amount)
    }

    /// Current value: raises minus lowers. May be negative.
    #[must_use]
    pub fn value(&self) -> i64 {
        let diff = i128::from(self.positive.value()) - i128::from(self.negative.value());
        i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
    }
}

impl Merge for PnCounter {
    /// Merge the two halves independently.
    fn merge(&mut self, other: Self) {
        self.positive.merge(other.positive);
        self.negative.merge(other.negative);
    }
}
