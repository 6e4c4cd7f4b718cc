//! Vector clocks for causality tracking.
//!
//! Each replica keeps one logical counter per node it has heard from. A
//! local mutation bumps the replica's own entry; receiving remote state
//! merges clocks pointwise with max. Comparing two clocks then answers the
//! only question gossip cares about: did one state causally precede the
//! other, or were they concurrent?
//!
//! Missing entries read as zero, and zero entries are never stored, so two
//! clocks that agree on every counter compare equal regardless of which
//! keys they materialize.
//!
//! # Ordering
//!
//! [`VectorClock`] implements [`PartialOrd`]: `Some(Less)` means
//! happens-before, `None` means concurrent. The convenience predicates
//! [`VectorClock::happens_before`] and [`VectorClock::concurrent`] wrap
//! that comparison.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::merge::Merge;
use crate::node::NodeId;

/// Per-node logical clock map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    /// Empty clock: every node reads zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter recorded for `node`, zero when absent.
    #[must_use]
    pub fn get(&self, node: &NodeId) -> u64 {
        self.entries.get(node).copied().unwrap_or(0)
    }

    /// Bump `node`'s entry by one and return the new value.
    pub fn increment(&mut self, node: &NodeId) -> u64 {
        let counter = self.entries.entry(node.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Number of nodes with a nonzero entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no node has ticked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(node, counter)` pairs in node order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, u64)> {
        self.entries.iter().map(|(node, counter)| (node, *counter))
    }

    /// True when `self` causally precedes `other`: every entry is <= the
    /// other's and at least one is strictly smaller. Reflexively false.
    #[must_use]
    pub fn happens_before(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Less))
    }

    /// True when neither clock causally precedes the other and they are not
    /// equal: the histories diverged.
    #[must_use]
    pub fn concurrent(&self, other: &Self) -> bool {
        self.partial_cmp(other).is_none()
    }

    /// Pointwise `<=` over the union of keys (missing reads as zero).
    fn dominated_by(&self, other: &Self) -> bool {
        self.entries
            .iter()
            .all(|(node, counter)| *counter <= other.get(node))
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let le = self.dominated_by(other);
        let ge = other.dominated_by(self);
        match (le, ge) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl Merge for VectorClock {
    /// Pointwise max over the union of keys. Entries never decrease.
    fn merge(&mut self, other: Self) {
        for (node, counter) in other.entries {
            if counter == 0 {
                continue;
            }
            let local = self.entries.entry(node).or_insert(0);
            if counter > *local {
                *local = counter;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn clock(pairs: &[(&str, u64)]) -> VectorClock {
        let mut c = VectorClock::new();
        for (id, count) in pairs {
            for _ in 0..*count {
                c.increment(&node(id));
            }
        }
        c
    }

    // === Basics ===

    #[test]
    fn new_clock_reads_zero_everywhere() {
        let c = VectorClock::new();
        assert_eq!(c.get(&node("a")), 0);
        assert!(c.is_empty());
    }

    #[test]
    fn increment_bumps_only_the_named_node() {
        let mut c = VectorClock::new();
        assert_eq!(c.increment(&node("a")), 1);
        assert_eq!(c.increment(&node("a")), 2);
        assert_eq!(c.get(&node("a")), 2);
        assert_eq!(c.get(&node("b")), 0);
    }

    // === Causality ===

    #[test]
    fn happens_before_is_strict() {
        let earlier = clock(&[("a", 1)]);
        let later = clock(&[("a", 2), ("b", 1)]);
        assert!(earlier.happens_before(&later));
        assert!(!later.happens_before(&earlier));
        assert!(!earlier.happens_before(&earlier));
    }

    #[test]
    fn diverged_clocks_are_concurrent() {
        let a = clock(&[("a", 2), ("b", 1)]);
        let b = clock(&[("a", 1), ("b", 2)]);
        assert!(a.concurrent(&b));
        assert!(b.concurrent(&a));
        assert!(!a.happens_before(&b));
        assert!(!b.happens_before(&a));
    }

    #[test]
    fn equal_clocks_are_neither_before_nor_concurrent() {
        let a = clock(&[("a", 1), ("b", 3)]);
        let b = clock(&[("a", 1), ("b", 3)]);
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
        assert!(!a.concurrent(&b));
        assert!(!a.happens_before(&b));
    }

    #[test]
    fn missing_entries_read_as_zero_for_comparison() {
        let empty = VectorClock::new();
        let ticked = clock(&[("a", 1)]);
        assert!(empty.happens_before(&ticked));
        assert!(!ticked.happens_before(&empty));
    }

    // === Merge ===

    #[test]
    fn merge_takes_pointwise_max() {
        let mut a = clock(&[("a", 3), ("b", 1)]);
        let b = clock(&[("a", 1), ("b", 4), ("c", 2)]);
        a.merge(b);
        assert_eq!(a.get(&node("a")), 3);
        assert_eq!(a.get(&node("b")), 4);
        assert_eq!(a.get(&node("c")), 2);
    }

    #[test]
    fn merged_clock_happens_after_both_inputs() {
        let a = clock(&[("a", 2)]);
        let b = clock(&[("b", 5)]);
        let mut merged = a.clone();
        merged.merge(b.clone());
        assert!(a.happens_before(&merged));
        assert!(b.happens_before(&merged));
    }

    #[test]
    fn merge_commutative() {
        let a = clock(&[("a", 2), ("c", 1)]);
        let b = clock(&[("b", 3), ("c", 4)]);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn merge_idempotent() {
        let a = clock(&[("a", 2), ("b", 1)]);
        let mut merged = a.clone();
        merged.merge(a.clone());
        assert_eq!(merged, a);
    }

    // === Serde ===

    #[test]
    fn serde_roundtrip_preserves_equality() {
        let c = clock(&[("a", 3), ("b", 7)]);
        let json = serde_json::to_string(&c).expect("serialize");
        let back: VectorClock = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, c);
    }

    #[test]
    fn serializes_as_a_flat_map() {
        let c = clock(&[("a", 2)]);
        let json = serde_json::to_value(&c).expect("serialize");
        assert_eq!(json, serde_json::json!({ "a": 2 }));
    }
}
