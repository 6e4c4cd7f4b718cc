//! Last-writer-wins set.
//!
//! Presence of a value is decided by comparing its latest add against its
//! latest remove. Every mutation is stamped `(timestamp, node)`; within
//! each side the higher stamp survives, node id breaking exact timestamp
//! ties so every replica keeps the same entry. Membership then compares
//! timestamps alone: a remove hides a value only when it is strictly
//! later than the add, so equal timestamps keep the value present. The
//! set is biased toward keeping data.
//!
//! Unlike the OR-Set, a remove here needs no observation: it is a dated
//! statement of intent that beats any earlier add, including adds it has
//! never seen.
//!
//! Values are keyed by their canonical JSON serialization, so any
//! serializable element type works without `Ord` or `Hash` bounds.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::CrdtError;
use crate::merge::Merge;
use crate::node::NodeId;

/// One stamped mutation: the value it concerns and who wrote it when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwEntry<T> {
    /// The element the mutation concerns.
    pub value: T,
    /// Caller-supplied timestamp in milliseconds.
    pub timestamp: u64,
    /// Writing replica, the timestamp tie-break.
    pub node: NodeId,
}

impl<T> LwwEntry<T> {
    /// Strictly-later-than, used to pick each side's surviving entry:
    /// higher timestamp, or same timestamp from a lexicographically
    /// greater node.
    fn wins_over(&self, other: &Self) -> bool {
        (self.timestamp, &self.node) > (other.timestamp, &other.node)
    }
}

/// Last-writer-wins set: latest add vs latest remove per value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwSet<T> {
    adds: BTreeMap<String, LwwEntry<T>>,
    removes: BTreeMap<String, LwwEntry<T>>,
}

impl<T> Default for LwwSet<T> {
    fn default() -> Self {
        Self {
            adds: BTreeMap::new(),
            removes: BTreeMap::new(),
        }
    }
}

/// Keep the later of an existing entry and a new one.
fn upsert_winner<T>(map: &mut BTreeMap<String, LwwEntry<T>>, key: String, entry: LwwEntry<T>) {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(entry);
        }
        Entry::Occupied(mut slot) => {
            if entry.wins_over(slot.get()) {
                slot.insert(entry);
            }
        }
    }
}

impl<T: Clone + Serialize + DeserializeOwned> LwwSet<T> {
    /// Create a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an add of `value` at `timestamp` by `node`.
    ///
    /// # Errors
    ///
    /// [`CrdtError::Encode`] when the value cannot be serialized for
    /// keying.
    pub fn add(&mut self, node: &NodeId, value: T, timestamp: u64) -> Result<(), CrdtError> {
        let key = key_of(&value)?;
        let entry = LwwEntry {
            value,
            timestamp,
            node: node.clone(),
        };
        upsert_winner(&mut self.adds, key, entry);
        Ok(())
    }

    /// Record a remove of `value` at `timestamp` by `node`.
    ///
    /// # Errors
    ///
    /// [`CrdtError::Encode`] when the value cannot be serialized for
    /// keying.
    pub fn remove(&mut self, node: &NodeId, value: &T, timestamp: u64) -> Result<(), CrdtError> {
        let key = key_of(value)?;
        let entry = LwwEntry {
            value: value.clone(),
            timestamp,
            node: node.clone(),
        };
        upsert_winner(&mut self.removes, key, entry);
        Ok(())
    }

    /// True when the value's latest remove is not strictly later than
    /// its latest add. An equal-timestamp remove loses, whichever node
    /// stamped it.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        let Ok(key) = key_of(value) else {
            return false;
        };
        self.adds.get(&key).is_some_and(|add| {
            self.removes
                .get(&key)
                .is_none_or(|remove| remove.timestamp <= add.timestamp)
        })
    }

    /// Present values, in canonical key order.
    #[must_use]
    pub fn value(&self) -> Vec<T> {
        self.adds
            .iter()
            .filter(|&(key, add)| {
                self.removes
                    .get(key)
                    .is_none_or(|remove| remove.timestamp <= add.timestamp)
            })
            .map(|(_, add)| add.value.clone())
            .collect()
    }
}

/// Canonical map key for a value: its JSON serialization.
fn key_of<T: Serialize>(value: &T) -> Result<String, CrdtError> {
    Ok(serde_json::to_string(value)?)
}

impl<T> Merge for LwwSet<T> {
    /// Per-key winner on both the add and the remove side.
    fn merge(&mut self, other: Self) {
        for (key, entry) in other.adds {
            upsert_winner(&mut self.adds, key, entry);
        }
        for (key, entry) in other.removes {
            upsert_winner(&mut self.removes, key, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn x() -> String {
        "x".to_owned()
    }

    // === Presence ===

    #[test]
    fn new_set_is_empty() {
        let s: LwwSet<String> = LwwSet::new();
        assert!(!s.contains(&x()));
        assert!(s.value().is_empty());
    }

    #[test]
    fn add_then_contains() {
        let mut s = LwwSet::new();
        s.add(&node("a"), x(), 100).expect("add");
        assert!(s.contains(&x()));
        assert_eq!(s.value(), vec![x()]);
    }

    #[test]
    fn later_remove_beats_earlier_add() {
        let mut s = LwwSet::new();
        s.add(&node("a"), x(), 100).expect("add");
        s.remove(&node("a"), &x(), 200).expect("remove");
        assert!(!s.contains(&x()));
    }

    #[test]
    fn later_add_resurrects() {
        let mut s = LwwSet::new();
        s.add(&node("a"), x(), 100).expect("add");
        s.remove(&node("a"), &x(), 200).expect("remove");
        s.add(&node("a"), x(), 300).expect("add");
        assert!(s.contains(&x()));
    }

    #[test]
    fn equal_stamp_same_node_add_wins() {
        let mut s = LwwSet::new();
        s.add(&node("a"), x(), 100).expect("add");
        s.remove(&node("a"), &x(), 100).expect("remove");
        assert!(s.contains(&x()), "full ties are biased toward presence");
    }

    #[test]
    fn equal_timestamp_cross_node_add_wins() {
        // Membership is settled on timestamps alone: the remove has to
        // be strictly later, whichever node stamped it.
        let mut s = LwwSet::new();
        s.add(&node("a"), x(), 100).expect("add");
        s.remove(&node("b"), &x(), 100).expect("remove");
        assert!(s.contains(&x()));

        let mut s = LwwSet::new();
        s.add(&node("b"), x(), 100).expect("add");
        s.remove(&node("a"), &x(), 100).expect("remove");
        assert!(s.contains(&x()));
        assert_eq!(s.value(), vec![x()]);
    }

    #[test]
    fn unobserved_remove_applies_by_timestamp() {
        // The remove arrives before any add is known locally.
        let mut s = LwwSet::new();
        s.remove(&node("b"), &x(), 200).expect("remove");
        assert!(!s.contains(&x()));

        // An earlier add merges in later and still loses.
        let mut other = LwwSet::new();
        other.add(&node("a"), x(), 100).expect("add");
        s.merge(other);
        assert!(!s.contains(&x()));
    }

    #[test]
    fn stale_double_add_keeps_latest_entry() {
        let mut s = LwwSet::new();
        s.add(&node("a"), x(), 300).expect("add");
        s.add(&node("b"), x(), 100).expect("add");
        assert!(s.contains(&x()));
        // A remove between the two stamps loses to the surviving 300.
        s.remove(&node("a"), &x(), 200).expect("remove");
        assert!(s.contains(&x()));
    }

    // === Merge ===

    #[test]
    fn replicas_agree_after_symmetric_merge() {
        let mut on_a = LwwSet::new();
        let mut on_b = LwwSet::new();
        on_a.add(&node("a"), x(), 100).expect("add");
        on_b.remove(&node("b"), &x(), 100).expect("remove");

        let mut ab = on_a.clone();
        ab.merge(on_b.clone());
        let mut ba = on_b;
        ba.merge(on_a);

        assert_eq!(ab, ba);
        // Same-stamp add and remove from different nodes: the add wins.
        assert!(ab.contains(&x()));
    }

    #[test]
    fn merge_idempotent() {
        let mut s = LwwSet::new();
        s.add(&node("a"), x(), 100).expect("add");
        s.remove(&node("a"), &"y".to_owned(), 50).expect("remove");
        let snapshot = s.clone();
        s.merge(snapshot.clone());
        assert_eq!(s, snapshot);
    }

    #[test]
    fn merge_associative() {
        let mut a = LwwSet::new();
        a.add(&node("a"), x(), 100).expect("add");
        let mut b = LwwSet::new();
        b.remove(&node("b"), &x(), 150).expect("remove");
        let mut c = LwwSet::new();
        c.add(&node("c"), x(), 200).expect("add");

        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut right_inner = b;
        right_inner.merge(c);
        let mut right = a;
        right.merge(right_inner);

        assert_eq!(left, right);
        assert!(left.contains(&x()), "the 200ms add is the latest word");
    }

    // === Non-string elements ===

    #[test]
    fn numeric_elements_key_canonically() {
        let mut s = LwwSet::new();
        s.add(&node("a"), 42_u32, 100).expect("add");
        assert!(s.contains(&42));
        assert!(!s.contains(&7));
    }

    // === Serde ===

    #[test]
    fn serde_roundtrip() {
        let mut s = LwwSet::new();
        s.add(&node("a"), x(), 100).expect("add");
        s.remove(&node("b"), &"y".to_owned(), 90).expect("remove");
        let json = serde_json::to_string(&s).expect("serialize");
        let back: LwwSet<String> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, s);
    }
}
