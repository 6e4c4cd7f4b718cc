//! Grow-only counter.
//!
//! Each node owns one entry in a per-node count map and may only ever raise
//! it. The counter's value is the sum of all entries; merging takes the
//! pointwise max, so re-delivered or crossed exchanges cannot double-count.
//!
//! Decrements are a type error here by construction of the data model, and
//! a runtime error at the API: [`GCounter::increment`] rejects negative
//! amounts instead of silently clamping, because a caller passing a negative
//! delta wanted a [`PnCounter`](crate::crdt::PnCounter).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CrdtError;
use crate::merge::Merge;
use crate::node::NodeId;

/// Grow-only counter: per-node monotone entries, summed on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GCounter {
    counts: BTreeMap<NodeId, u64>,
}

impl GCounter {
    /// New counter with value zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `node`'s entry by `amount`.
    ///
    /// # Errors
    ///
    /// [`CrdtError::NegativeAmount`] when `amount` is negative; the counter
    /// is left untouched. Zero is accepted and does nothing.
    pub fn increment(&mut self, node: &NodeId, amount: i64) -> Result<(), CrdtError> {
        let amount = u64::try_from(amount).map_err(|_| CrdtError::NegativeAmount { amount })?;
        if amount == 0 {
            return Ok(());
        }
        let entry = self.counts.entry(node.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
        Ok(())
    }

    /// Sum of all per-node entries.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.counts.values().fold(0, |acc, v| acc.saturating_add(*v))
    }

    /// The entry recorded for one node, zero when absent.
    #[must_use]
    pub fn entry(&self, node: &NodeId) -> u64 {
        self.counts.get(node).copied().unwrap_or(0)
    }
}

impl Merge for GCounter {
    /// Pointwise max over the union of nodes.
    fn merge(&mut self, other: Self) {
        for (node, count) in other.counts {
            let entry = self.counts.entry(node).or_insert(0);
            if count > *entry {
                *entry = count;
            }
        }
    }
}
