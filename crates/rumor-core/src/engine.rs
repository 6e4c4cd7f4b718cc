//! The named-state merge engine.
//!
//! A [`MergeEngine`] is one node's registry of replicated roots: string
//! keys (`"likes"`, `"roster"`, `"doc"`) each owning a [`Crdt`]. The
//! gossip layer snapshots the whole registry into wire entries and folds
//! remote snapshots back in; the host application registers roots up front
//! and mutates them through the typed accessors.
//!
//! Applying a remote snapshot is deliberately forgiving. Unknown keys are
//! skipped with a warning: clusters roll out new roots one node at a
//! time, and the nodes that do not know a key yet must not choke on it.
//! A kind mismatch on a shared key means two deployments disagree about
//! what the key *is*; the entry is skipped and counted so the operator can
//! see it, but the rest of the snapshot still lands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crdt::Crdt;
use crate::node::NodeId;

// ---------------------------------------------------------------------------
// Wire entry
// ---------------------------------------------------------------------------

/// One registry root as it travels: `{"key": …, "type": …, "state": …}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Registry key the state belongs to.
    pub key: String,
    /// The tagged state itself.
    #[serde(flatten)]
    pub crdt: Crdt,
}

// ---------------------------------------------------------------------------
// Apply outcome
// ---------------------------------------------------------------------------

/// What applying one remote snapshot did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Entries merged into local roots.
    pub merged: usize,
    /// Entries skipped because the key is not registered here.
    pub skipped_unknown: usize,
    /// Entries skipped because the kinds disagreed.
    pub errors: usize,
    /// True when at least one root's read value changed.
    pub changed: bool,
}

impl MergeOutcome {
    /// True when the snapshot taught this node nothing new.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        !self.changed
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One node's registry of named CRDT roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeEngine {
    node: NodeId,
    entries: BTreeMap<String, Crdt>,
}

impl MergeEngine {
    /// New empty registry owned by `node`.
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            entries: BTreeMap::new(),
        }
    }

    /// The owning node.
    #[must_use]
    pub const fn node(&self) -> &NodeId {
        &self.node
    }

    /// Register (or replace) the root under `key`, returning the previous
    /// instance when there was one.
    pub fn register(&mut self, key: impl Into<String>, crdt: impl Into<Crdt>) -> Option<Crdt> {
        self.entries.insert(key.into(), crdt.into())
    }

    /// Borrow the root under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Crdt> {
        self.entries.get(key)
    }

    /// Mutably borrow the root under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Crdt> {
        self.entries.get_mut(key)
    }

    /// Registered keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deep-copied wire entries for every registered root.
    ///
    /// The copies are independent: mutating the snapshot (or the registry
    /// afterwards) affects only one side.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StateEntry> {
        self.entries
            .iter()
            .map(|(key, crdt)| StateEntry {
                key: key.clone(),
                crdt: crdt.clone(),
            })
            .collect()
    }

    /// Fold a remote snapshot into the local roots.
    ///
    /// Per entry: unknown key → skip and count; kind mismatch → skip and
    /// count; otherwise merge. Never fails as a whole.
    pub fn apply(&mut self, entries: Vec<StateEntry>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for entry in entries {
            let Some(local) = self.entries.get_mut(&entry.key) else {
                warn!(key = %entry.key, "remote snapshot names an unregistered key, skipping");
                outcome.skipped_unknown += 1;
                continue;
            };
            let before = local.value();
            match local.try_merge(entry.crdt) {
                Ok(()) => {
                    outcome.merged += 1;
                    if local.value() != before {
                        outcome.changed = true;
                    }
                }
                Err(err) => {
                    warn!(key = %entry.key, error = %err, "remote entry disagrees with local root, skipping");
                    outcome.errors += 1;
                }
            }
        }
        outcome
    }
}
