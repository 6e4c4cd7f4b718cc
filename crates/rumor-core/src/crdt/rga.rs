//! RGA (replicated growable array): an ordered sequence CRDT.
//!
//! Every element carries a globally unique [`Dot`] id and an [`Anchor`]
//! naming the element it was inserted after (or the head of the sequence).
//! Deletes tombstone an element instead of removing it: the id must keep
//! existing because concurrent inserts elsewhere may anchor to it.
//!
//! # Ordering
//!
//! Rendering walks the anchor tree depth-first from the head. Elements
//! anchored to the same target (concurrent inserts at one spot) are
//! visited in descending id order, so every replica linearizes the same
//! tree into the same sequence. An element's whole subtree is emitted
//! before its next sibling, which keeps causally-contiguous runs (one
//! replica typing a word) intact through merges.
//!
//! Merge is a union of elements by id plus an OR of tombstone flags, which
//! is commutative, associative, and idempotent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CrdtError;
use crate::merge::Merge;
use crate::node::{Dot, NodeId};

/// Where an element attaches in the sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    /// Before everything: the element was inserted at position zero.
    Head,
    /// Directly after the element with this id (which may be tombstoned).
    After(Dot),
}

/// One sequence element: payload, insertion point, and liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgaElement<T> {
    /// The payload.
    pub value: T,
    /// Insertion point at the time of the insert.
    pub anchor: Anchor,
    /// Dead elements stay in the tree as anchors but are not rendered.
    pub tombstone: bool,
}

/// Replicated growable array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rga<T> {
    elements: BTreeMap<Dot, RgaElement<T>>,
}

impl<T> Default for Rga<T> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
        }
    }
}

impl<T: Clone> Rga<T> {
    /// Create a new empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` at visible position `index` on behalf of `node`.
    ///
    /// The new element anchors after whatever is visible at `index - 1`
    /// right now (the head for `index` 0), and keeps that anchor forever.
    /// Returns the freshly minted element id.
    ///
    /// # Errors
    ///
    /// [`CrdtError::IndexOutOfBounds`] when `index` is past the visible
    /// length (equal to the length is an append and fine).
    pub fn insert(&mut self, node: &NodeId, index: usize, value: T) -> Result<Dot, CrdtError> {
        let visible = self.visible_ids();
        if index > visible.len() {
            return Err(CrdtError::IndexOutOfBounds {
                index,
                len: visible.len(),
            });
        }
        let anchor = if index == 0 {
            Anchor::Head
        } else {
            Anchor::After(visible[index - 1].clone())
        };
        let dot = Dot::new(node.clone(), self.next_counter(node));
        self.elements.insert(
            dot.clone(),
            RgaElement {
                value,
                anchor,
                tombstone: false,
            },
        );
        Ok(dot)
    }

    /// Append `value` after the current visible end.
    ///
    /// # Errors
    ///
    /// Never fails in practice; shares [`Rga::insert`]'s signature.
    pub fn push(&mut self, node: &NodeId, value: T) -> Result<Dot, CrdtError> {
        let end = self.len();
        self.insert(node, end, value)
    }

    /// Tombstone the element at visible position `index`, returning its
    /// payload.
    ///
    /// # Errors
    ///
    /// [`CrdtError::IndexOutOfBounds`] when nothing is visible there.
    pub fn delete(&mut self, index: usize) -> Result<T, CrdtError> {
        let visible = self.visible_ids();
        let Some(id) = visible.get(index).cloned() else {
            return Err(CrdtError::IndexOutOfBounds {
                index,
                len: visible.len(),
            });
        };
        // The id came out of the visible walk, so the element exists.
        let element = self
            .elements
            .get_mut(&id)
            .ok_or(CrdtError::IndexOutOfBounds {
                index,
                len: visible.len(),
            })?;
        element.tombstone = true;
        Ok(element.value.clone())
    }

    /// Payload at visible position `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        let id = self.visible_ids().into_iter().nth(index)?;
        self.elements.get(&id).map(|e| &e.value)
    }

    /// Number of visible (non-tombstoned) elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.values().filter(|e| !e.tombstone).count()
    }

    /// True when nothing is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visible payloads in sequence order.
    #[must_use]
    pub fn value(&self) -> Vec<T> {
        self.ordered_ids()
            .into_iter()
            .filter_map(|id| {
                let element = &self.elements[id];
                (!element.tombstone).then(|| element.value.clone())
            })
            .collect()
    }

    /// Ids of visible elements in sequence order.
    fn visible_ids(&self) -> Vec<Dot> {
        self.ordered_ids()
            .into_iter()
            .filter(|id| !self.elements[*id].tombstone)
            .cloned()
            .collect()
    }

    /// Depth-first linearization of the anchor tree.
    ///
    /// Children of each anchor are pushed in ascending id order and popped
    /// off a stack, so siblings emit in descending id order, each with its
    /// full subtree before the next.
    fn ordered_ids(&self) -> Vec<&Dot> {
        let mut children: BTreeMap<Option<&Dot>, Vec<&Dot>> = BTreeMap::new();
        for (id, element) in &self.elements {
            let parent = match &element.anchor {
                Anchor::Head => None,
                Anchor::After(p) => Some(p),
            };
            children.entry(parent).or_default().push(id);
        }

        let mut out = Vec::with_capacity(self.elements.len());
        let mut stack: Vec<&Dot> = children.get(&None).cloned().unwrap_or_default();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(kids) = children.get(&Some(id)) {
                stack.extend(kids.iter().copied());
            }
        }
        out
    }

    /// Smallest unused counter for `node`. Tombstoned elements still hold
    /// their ids, so counters are never reused.
    fn next_counter(&self, node: &NodeId) -> u64 {
        self.elements
            .keys()
            .filter(|dot| dot.node == *node)
            .map(|dot| dot.counter)
            .max()
            .unwrap_or(0)
            + 1
    }
}

impl<T: Clone + fmt::Display> Rga<T> {
    /// Concatenate visible payloads via their `Display` form.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.value().iter().map(ToString::to_string).collect()
    }
}

impl<T> Merge for Rga<T> {
    /// Union elements by id; OR tombstone flags.
    ///
    /// Ids are globally unique, so a shared id carries the same value and
    /// anchor on both sides; only liveness can differ.
    fn merge(&mut self, other: Self) {
        for (id, element) in other.elements {
            match self.elements.get_mut(&id) {
                Some(local) => {
                    if element.tombstone {
                        local.tombstone = true;
                    }
                }
                None => {
                    self.elements.insert(id, element);
                }
            }
        }
    }
}
