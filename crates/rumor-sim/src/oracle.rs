//! Post-run invariant checks over replica end states.
//!
//! Every check re-merges real snapshots through a fresh engine, so a
//! failure here means a replicated type broke a lattice law rather than
//! the harness losing a message.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::seq::SliceRandom;
use rumor_core::{Crdt, MergeEngine, NodeId, StateEntry};

use crate::replica::ReplicaState;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one invariant check, or of [`ConvergenceOracle::check_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// True iff no violations were found.
    pub passed: bool,
    /// One diagnostic per broken invariant.
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn fail(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: false,
            violations,
        }
    }

    /// Folds another result into this one; failures accumulate.
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

/// Diagnostic for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two replicas disagree on at least one root after full delivery.
    ///
    /// Emitted by `check_convergence`.
    Convergence {
        /// First diverging replica.
        node_a: NodeId,
        /// Second diverging replica.
        node_b: NodeId,
        /// Keys whose tagged state differs between the two.
        keys: Vec<String>,
    },

    /// A replica absorbing its own snapshot again changed state.
    ///
    /// Emitted by `check_idempotence`.
    Idempotence {
        /// The replica whose state moved.
        node: NodeId,
        /// Keys that changed on re-application.
        keys: Vec<String>,
    },

    /// Folding the same snapshots in a shuffled order produced a
    /// different final state.
    ///
    /// Emitted by `check_commutativity`.
    Commutativity {
        /// Zero-based index of the shuffled order that diverged.
        permutation_index: usize,
        /// Keys that differ from the canonical fold.
        keys: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Invariant checks run against end-of-run replica states.
///
/// # Invariants checked
///
/// 1. **Strong convergence** (`check_convergence`): after full delivery
///    every replica holds the same tagged state for every root.
/// 2. **Idempotence** (`check_idempotence`): a replica absorbing its own
///    snapshot again must not change.
/// 3. **Commutativity** (`check_commutativity`): folding the same set of
///    snapshots in any order lands on the same state.
pub struct ConvergenceOracle;

impl ConvergenceOracle {
    /// Compares every replica pair; all diverging pairs are reported.
    #[must_use]
    pub fn check_convergence(states: &[ReplicaState]) -> OracleResult {
        if states.len() < 2 {
            return OracleResult::pass();
        }

        let mut violations = Vec::new();
        for i in 0..states.len() {
            for j in (i + 1)..states.len() {
                let keys = diverging_keys(&states[i], &states[j]);
                if !keys.is_empty() {
                    violations.push(InvariantViolation::Convergence {
                        node_a: states[i].node.clone(),
                        node_b: states[j].node.clone(),
                        keys,
                    });
                }
            }
        }

        if violations.is_empty() {
            OracleResult::pass()
        } else {
            OracleResult::fail(violations)
        }
    }

    /// Re-applies each replica's own snapshot to itself. The merge is a
    /// join, so nothing may change.
    #[must_use]
    pub fn check_idempotence(states: &[ReplicaState]) -> OracleResult {
        let mut violations = Vec::new();
        for state in states {
            let mut engine = engine_from(state.node.clone(), &state.entries);
            let before = engine.snapshot();
            let outcome = engine.apply(state.entries.clone());
            if outcome.changed {
                let after = engine.snapshot();
                violations.push(InvariantViolation::Idempotence {
                    node: state.node.clone(),
                    keys: entry_diff(&before, &after),
                });
            }
        }

        if violations.is_empty() {
            OracleResult::pass()
        } else {
            OracleResult::fail(violations)
        }
    }

    /// Folds every replica's snapshot into one engine in the given order,
    /// then in `iterations` shuffled orders. Every order must land on the
    /// same final state, even when the inputs have not converged.
    #[must_use]
    pub fn check_commutativity<R: Rng>(
        states: &[ReplicaState],
        rng: &mut R,
        iterations: usize,
    ) -> OracleResult {
        if states.len() < 2 || iterations == 0 {
            return OracleResult::pass();
        }

        let canonical_order: Vec<usize> = (0..states.len()).collect();
        let canonical = fold_in_order(&canonical_order, states);

        let mut violations = Vec::new();
        let mut order = canonical_order;
        for permutation_index in 0..iterations {
            order.shuffle(rng);
            let folded = fold_in_order(&order, states);
            let keys = entry_diff(&canonical, &folded);
            if !keys.is_empty() {
                violations.push(InvariantViolation::Commutativity {
                    permutation_index,
                    keys,
                });
            }
        }

        if violations.is_empty() {
            OracleResult::pass()
        } else {
            OracleResult::fail(violations)
        }
    }

    /// Runs every invariant check and merges the results.
    #[must_use]
    pub fn check_all<R: Rng>(states: &[ReplicaState], rng: &mut R) -> OracleResult {
        Self::check_convergence(states)
            .merge(Self::check_idempotence(states))
            .merge(Self::check_commutativity(states, rng, 8))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Keys whose tagged state differs between two replicas, including keys
/// only one side carries.
fn diverging_keys(a: &ReplicaState, b: &ReplicaState) -> Vec<String> {
    let left: BTreeMap<&str, &Crdt> = a
        .entries
        .iter()
        .map(|entry| (entry.key.as_str(), &entry.crdt))
        .collect();
    let right: BTreeMap<&str, &Crdt> = b
        .entries
        .iter()
        .map(|entry| (entry.key.as_str(), &entry.crdt))
        .collect();

    let mut keys: BTreeSet<&str> = left.keys().copied().collect();
    keys.extend(right.keys().copied());

    keys.into_iter()
        .filter(|key| left.get(key) != right.get(key))
        .map(str::to_owned)
        .collect()
}

/// An engine holding exactly the given entries.
fn engine_from(node: NodeId, entries: &[StateEntry]) -> MergeEngine {
    let mut engine = MergeEngine::new(node);
    for entry in entries {
        engine.register(entry.key.clone(), entry.crdt.clone());
    }
    engine
}

/// Merges the chosen states into a fresh engine in `order`, registering
/// each key the first time it appears.
fn fold_in_order(order: &[usize], states: &[ReplicaState]) -> Vec<StateEntry> {
    let mut engine = MergeEngine::new(NodeId::new("oracle"));
    for &index in order {
        let state = &states[index];
        for entry in &state.entries {
            if engine.get(&entry.key).is_none() {
                engine.register(entry.key.clone(), entry.crdt.clone());
            }
        }
        engine.apply(state.entries.clone());
    }
    engine.snapshot()
}

/// Keys at which two same-shaped snapshots disagree.
fn entry_diff(before: &[StateEntry], after: &[StateEntry]) -> Vec<String> {
    before
        .iter()
        .zip(after)
        .filter(|(b, a)| b != a)
        .map(|(b, _)| b.key.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rumor_gossip::SyncMessage;

    use crate::clock::ClockConfig;
    use crate::replica::SimReplica;

    use super::*;

    /// Builds `count` replicas and runs `rounds` of seeded mutations on
    /// each, without any exchange.
    fn seeded_replicas(count: usize, rounds: u64, seed: u64) -> Vec<SimReplica> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut replicas: Vec<SimReplica> = (0..count)
            .map(|i| {
                SimReplica::new(
                    NodeId::new(format!("n{i}")),
                    ClockConfig::default().assign(&mut rng),
                )
            })
            .collect();
        for round in 0..rounds {
            for replica in &mut replicas {
                replica.mutate(round, &mut rng).unwrap();
            }
        }
        replicas
    }

    /// One full mesh exchange: everybody absorbs everybody's pre-round
    /// snapshot, which joins all states in a single pass.
    fn exchange_all(replicas: &mut [SimReplica]) {
        let snapshots: Vec<SyncMessage> =
            replicas.iter().map(SimReplica::sync_message).collect();
        for replica in replicas.iter_mut() {
            for message in &snapshots {
                if message.from != *replica.node() {
                    replica.absorb(message.clone());
                }
            }
        }
    }

    fn states(replicas: &[SimReplica]) -> Vec<ReplicaState> {
        replicas.iter().map(SimReplica::state).collect()
    }

    #[test]
    fn converged_replicas_pass_every_check() {
        let mut replicas = seeded_replicas(3, 40, 11);
        exchange_all(&mut replicas);

        let mut rng = StdRng::seed_from_u64(11);
        let result = ConvergenceOracle::check_all(&states(&replicas), &mut rng);
        assert!(result.passed, "violations: {:?}", result.violations);
    }

    #[test]
    fn a_withheld_snapshot_shows_up_as_divergence() {
        let mut replicas = seeded_replicas(2, 30, 21);
        let message = replicas[0].sync_message();
        replicas[1].absorb(message);
        // replicas[0] never hears back, so it is missing replicas[1]'s ops.

        let result = ConvergenceOracle::check_convergence(&states(&replicas));
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        match &result.violations[0] {
            InvariantViolation::Convergence {
                node_a,
                node_b,
                keys,
            } => {
                assert_eq!(node_a, replicas[0].node());
                assert_eq!(node_b, replicas[1].node());
                assert!(!keys.is_empty());
            }
            other => panic!("unexpected violation: {other:?}"),
        }
    }

    #[test]
    fn absorbing_your_own_snapshot_changes_nothing() {
        let mut replicas = seeded_replicas(3, 40, 31);
        exchange_all(&mut replicas);

        let result = ConvergenceOracle::check_idempotence(&states(&replicas));
        assert!(result.passed, "violations: {:?}", result.violations);
    }

    #[test]
    fn fold_order_does_not_matter_even_before_convergence() {
        // Deliberately unconverged inputs: commutativity must hold anyway.
        let replicas = seeded_replicas(4, 35, 41);

        let mut rng = StdRng::seed_from_u64(41);
        let result =
            ConvergenceOracle::check_commutativity(&states(&replicas), &mut rng, 12);
        assert!(result.passed, "violations: {:?}", result.violations);
    }

    #[test]
    fn a_single_replica_trivially_passes() {
        let replicas = seeded_replicas(1, 20, 51);
        let mut rng = StdRng::seed_from_u64(51);
        let result = ConvergenceOracle::check_all(&states(&replicas), &mut rng);
        assert!(result.passed);
    }

    #[test]
    fn merging_results_accumulates_failures() {
        let failing = OracleResult::fail(vec![InvariantViolation::Idempotence {
            node: NodeId::new("n0"),
            keys: vec!["likes".to_owned()],
        }]);
        let merged = OracleResult::pass().merge(failing);
        assert!(!merged.passed);
        assert_eq!(merged.violations.len(), 1);
    }
}
