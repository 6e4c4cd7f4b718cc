//! OR-Set (observed-remove set) with add-wins semantics.
//!
//! Every add mints a fresh [`Dot`], so the same value can be present under
//! several tags at once. A remove only tombstones the tags it has actually
//! observed; a concurrent add introduces a tag the remove never saw, and
//! that tag survives the merge. Concurrent add/remove of the same value
//! therefore resolves to "present".
//!
//! Tombstoned tags are kept forever; they are what stops a removed tag
//! from resurrecting when stale state is re-delivered.
//!
//! # Semilattice Properties
//!
//! Merge is the union of the tag map and the tombstone set, which makes it
//! commutative, associative, and idempotent by construction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::merge::Merge;
use crate::node::{Dot, NodeId};

/// Observed-remove set.
///
/// `entries` maps every tag ever observed to the value it was minted for;
/// `tombstones` is the set of killed tags. A value is present when at least
/// one of its tags is not tombstoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrSet<T> {
    entries: BTreeMap<Dot, T>,
    tombstones: BTreeSet<Dot>,
}

impl<T> Default for OrSet<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }
}

impl<T: Clone + PartialEq> OrSet<T> {
    /// Create a new empty OR-Set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value`, minting a fresh tag on behalf of `node`.
    ///
    /// Re-adding a value that is already present mints another tag; the
    /// extra tag is what makes a later concurrent remove lose.
    pub fn add(&mut self, node: &NodeId, value: T) -> Dot {
        let dot = Dot::new(node.clone(), self.next_counter(node));
        self.entries.insert(dot.clone(), value);
        dot
    }

    /// Remove `value` by tombstoning every live tag observed for it.
    ///
    /// Returns the number of tags tombstoned. Zero means the value was not
    /// observed here: the remove is a no-op, and any concurrent add
    /// elsewhere survives untouched.
    pub fn remove(&mut self, value: &T) -> usize {
        let observed: Vec<Dot> = self
            .entries
            .iter()
            .filter(|&(dot, v)| v == value && !self.tombstones.contains(dot))
            .map(|(dot, _)| dot.clone())
            .collect();
        for dot in &observed {
            self.tombstones.insert(dot.clone());
        }
        observed.len()
    }

    /// True when at least one live (non-tombstoned) tag carries `value`.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.entries
            .iter()
            .any(|(dot, v)| v == value && !self.tombstones.contains(dot))
    }

    /// Live tags currently carrying `value`, in tag order.
    #[must_use]
    pub fn live_tags(&self, value: &T) -> Vec<Dot> {
        self.entries
            .iter()
            .filter(|&(dot, v)| v == value && !self.tombstones.contains(dot))
            .map(|(dot, _)| dot.clone())
            .collect()
    }

    /// Distinct present values, in order of their earliest live tag.
    #[must_use]
    pub fn value(&self) -> Vec<T> {
        let mut out: Vec<T> = Vec::new();
        for (dot, v) in &self.entries {
            if !self.tombstones.contains(dot) && !out.contains(v) {
                out.push(v.clone());
            }
        }
        out
    }

    /// Smallest unused counter for `node`, over live *and* tombstoned tags.
    ///
    /// Tombstones count: reusing a killed counter would mint a tag that is
    /// already dead everywhere it has gossiped to.
    fn next_counter(&self, node: &NodeId) -> u64 {
        self.entries
            .keys()
            .chain(self.tombstones.iter())
            .filter(|dot| dot.node == *node)
            .map(|dot| dot.counter)
            .max()
            .unwrap_or(0)
            + 1
    }
}

impl<T> Merge for OrSet<T> {
    /// Union of tag maps and tombstone sets.
    ///
    /// Tags are globally unique, so a key present on both sides carries the
    /// same value and the overwrite is harmless.
    fn merge(&mut self, other: Self) {
        self.entries.extend(other.entries);
        self.tombstones.extend(other.tombstones);
    }
}
