//! One simulated replica: a real merge engine driven by scripted ops.
//!
//! Replicas register the same five roots and mutate them with seeded
//! random operations, so every replicated type is exercised in every
//! run. All randomness flows through the caller's rng; a replica given
//! the same script always ends in the same state.

use std::collections::BTreeMap;

use anyhow::{Context as _, Result};
use rand::Rng;
use rumor_core::{
    Crdt, GCounter, LwwSet, Merge, MergeEngine, MergeOutcome, NodeId, OrSet, PnCounter, Rga,
    StateEntry, VectorClock,
};
use rumor_gossip::SyncMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::clock::SimClock;

/// Root keys every simulated replica registers.
pub const ROOT_KEYS: [&str; 5] = ["likes", "score", "tags", "flags", "doc"];

/// Elements drawn for set operations.
const WORDS: [&str; 6] = ["alpha", "bravo", "carol", "delta", "echo", "foxtrot"];

/// Elements drawn for sequence inserts.
const LETTERS: [char; 8] = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];

/// Immutable snapshot of one replica's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaState {
    /// Replica identity.
    pub node: NodeId,
    /// Full tagged state per key, in key order.
    pub entries: Vec<StateEntry>,
    /// Observable value per key, for diagnostics.
    pub values: BTreeMap<String, Value>,
}

/// A replica under simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimReplica {
    engine: MergeEngine,
    clock: VectorClock,
    wall: SimClock,
}

impl SimReplica {
    /// New replica with all five roots registered.
    #[must_use]
    pub fn new(node: NodeId, wall: SimClock) -> Self {
        let mut engine = MergeEngine::new(node);
        engine.register("likes", GCounter::new());
        engine.register("score", PnCounter::new());
        engine.register("tags", OrSet::<Value>::new());
        engine.register("flags", LwwSet::<Value>::new());
        engine.register("doc", Rga::<Value>::new());
        Self {
            engine,
            clock: VectorClock::new(),
            wall,
        }
    }

    /// Replica identity.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        self.engine.node()
    }

    /// The replica's vector clock.
    #[must_use]
    pub const fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Applies one seeded random mutation and bumps the vector clock,
    /// returning the key that was touched.
    pub fn mutate<R: Rng>(&mut self, round: u64, rng: &mut R) -> Result<&'static str> {
        let node = self.engine.node().clone();
        let key = ROOT_KEYS[rng.gen_range(0..ROOT_KEYS.len())];
        match key {
            "likes" => {
                let amount = rng.gen_range(1..=5);
                self.root_mut(key)?
                    .as_g_counter_mut()
                    .context("likes is a g-counter")?
                    .increment(&node, amount)?;
            }
            "score" => {
                let amount = rng.gen_range(1..=5);
                let negative = rng.gen_range(0..2) == 0;
                let counter = self
                    .root_mut(key)?
                    .as_pn_counter_mut()
                    .context("score is a pn-counter")?;
                if negative {
                    counter.decrement(&node, amount)?;
                } else {
                    counter.increment(&node, amount)?;
                }
            }
            "tags" => {
                let word = json!(WORDS[rng.gen_range(0..WORDS.len())]);
                let removing = rng.gen_range(0..2) == 0;
                let set = self
                    .root_mut(key)?
                    .as_or_set_mut()
                    .context("tags is an or-set")?;
                if removing && set.contains(&word) {
                    set.remove(&word);
                } else {
                    set.add(&node, word);
                }
            }
            "flags" => {
                let word = json!(WORDS[rng.gen_range(0..WORDS.len())]);
                let stamp = self.wall.now(round);
                let removing = rng.gen_range(0..2) == 0;
                let set = self
                    .root_mut(key)?
                    .as_lww_set_mut()
                    .context("flags is a lww-set")?;
                if removing {
                    set.remove(&node, &word, stamp)?;
                } else {
                    set.add(&node, word, stamp)?;
                }
            }
            _ => {
                let letter = json!(LETTERS[rng.gen_range(0..LETTERS.len())].to_string());
                let seq = self
                    .root_mut("doc")?
                    .as_rga_mut()
                    .context("doc is a sequence")?;
                let visible = seq.len();
                if visible > 0 && rng.gen_range(0..3) == 0 {
                    let index = rng.gen_range(0..visible);
                    seq.delete(index)?;
                } else {
                    let index = rng.gen_range(0..=visible);
                    seq.insert(&node, index, letter)?;
                }
            }
        }
        self.clock.increment(&node);
        Ok(key)
    }

    /// Full-state snapshot addressed from this replica.
    #[must_use]
    pub fn sync_message(&self) -> SyncMessage {
        SyncMessage {
            from: self.engine.node().clone(),
            clock: self.clock.clone(),
            entries: self.engine.snapshot(),
        }
    }

    /// Merges a received snapshot into local state.
    pub fn absorb(&mut self, message: SyncMessage) -> MergeOutcome {
        let outcome = self.engine.apply(message.entries);
        self.clock.merge(message.clock);
        outcome
    }

    /// Current observable state.
    #[must_use]
    pub fn state(&self) -> ReplicaState {
        let entries = self.engine.snapshot();
        let values = entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.crdt.value()))
            .collect();
        ReplicaState {
            node: self.engine.node().clone(),
            entries,
            values,
        }
    }

    fn root_mut(&mut self, key: &str) -> Result<&mut Crdt> {
        self.engine
            .get_mut(key)
            .with_context(|| format!("root {key} not registered"))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::clock::ClockConfig;

    use super::*;

    fn replica(name: &str, seed: u64) -> SimReplica {
        let mut rng = StdRng::seed_from_u64(seed);
        SimReplica::new(NodeId::new(name), ClockConfig::default().assign(&mut rng))
    }

    #[test]
    fn every_root_is_registered() {
        let state = replica("n0", 1).state();
        let keys: Vec<&str> = state.entries.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, vec!["doc", "flags", "likes", "score", "tags"]);
        assert_eq!(state.values.len(), 5);
    }

    #[test]
    fn the_same_script_produces_the_same_state() {
        let mut first = replica("n0", 9);
        let mut second = replica("n0", 9);
        let mut rng_a = StdRng::seed_from_u64(3);
        let mut rng_b = StdRng::seed_from_u64(3);

        for round in 0..50 {
            first.mutate(round, &mut rng_a).unwrap();
            second.mutate(round, &mut rng_b).unwrap();
        }
        assert_eq!(first.state(), second.state());
    }

    #[test]
    fn every_mutation_bumps_the_vector_clock() {
        let mut replica = replica("n0", 4);
        let mut rng = StdRng::seed_from_u64(4);
        for round in 0..20 {
            replica.mutate(round, &mut rng).unwrap();
        }
        assert_eq!(replica.clock().get(&NodeId::new("n0")), 20);
    }

    #[test]
    fn absorbing_a_snapshot_is_idempotent() {
        let mut sender = replica("n0", 5);
        let mut receiver = replica("n1", 6);
        let mut rng = StdRng::seed_from_u64(5);
        for round in 0..30 {
            sender.mutate(round, &mut rng).unwrap();
        }

        let first = receiver.absorb(sender.sync_message());
        assert!(first.changed);
        assert_eq!(first.merged, 5);

        let again = receiver.absorb(sender.sync_message());
        assert!(!again.changed);
        assert_eq!(receiver.state().values, sender.state().values);
    }
}
