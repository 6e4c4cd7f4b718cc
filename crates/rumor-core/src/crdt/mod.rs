//! State-based CRDTs and the closed variant set the merge engine ships.
//!
//! Five replicated types live here, each in its own module:
//!
//! - [`GCounter`]: grow-only counter
//! - [`PnCounter`]: counter with increments and decrements
//! - [`OrSet`]: observed-remove set, add-wins
//! - [`LwwSet`]: last-writer-wins set
//! - [`Rga`]: ordered sequence
//!
//! The generic types take any serializable element. For the registry and
//! the wire there is [`Crdt`], a closed sum over the five kinds with the
//! element type fixed to [`serde_json::Value`]: adding a kind means adding
//! a variant, and every dispatch site is then a compile-time exhaustiveness
//! check instead of a stringly-typed lookup.

pub mod gcounter;
pub mod lwwset;
pub mod orset;
pub mod pncounter;
pub mod rga;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use gcounter::GCounter;
pub use lwwset::{LwwEntry, LwwSet};
pub use orset::OrSet;
pub use pncounter::PnCounter;
pub use rga::{Anchor, Rga, RgaElement};

use crate::error::CrdtError;
use crate::merge::Merge;

// ---------------------------------------------------------------------------
// Kind tag
// ---------------------------------------------------------------------------

/// Which CRDT a piece of state is. Closed: the wire never carries a kind
/// this enum cannot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrdtKind {
    GCounter,
    PnCounter,
    OrSet,
    LwwSet,
    Rga,
}

impl CrdtKind {
    /// The wire spelling of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GCounter => "g-counter",
            Self::PnCounter => "pn-counter",
            Self::OrSet => "or-set",
            Self::LwwSet => "lww-set",
            Self::Rga => "rga",
        }
    }
}

impl fmt::Display for CrdtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Closed sum over the five kinds
// ---------------------------------------------------------------------------

/// One registered CRDT with JSON elements, as the engine stores it and the
/// wire moves it.
///
/// Serializes adjacently tagged as `{"type": …, "state": …}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "kebab-case")]
pub enum Crdt {
    GCounter(GCounter),
    PnCounter(PnCounter),
    OrSet(OrSet<Value>),
    LwwSet(LwwSet<Value>),
    Rga(Rga<Value>),
}

impl Crdt {
    /// The kind tag of this state.
    #[must_use]
    pub const fn kind(&self) -> CrdtKind {
        match self {
            Self::GCounter(_) => CrdtKind::GCounter,
            Self::PnCounter(_) => CrdtKind::PnCounter,
            Self::OrSet(_) => CrdtKind::OrSet,
            Self::LwwSet(_) => CrdtKind::LwwSet,
            Self::Rga(_) => CrdtKind::Rga,
        }
    }

    /// The current read value as JSON: a number for counters, an array for
    /// sets and sequences.
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::GCounter(c) => Value::from(c.value()),
            Self::PnCounter(c) => Value::from(c.value()),
            Self::OrSet(s) => Value::Array(s.value()),
            Self::LwwSet(s) => Value::Array(s.value()),
            Self::Rga(r) => Value::Array(r.value()),
        }
    }

    /// Merge remote state of the same kind into this one.
    ///
    /// # Errors
    ///
    /// [`CrdtError::KindMismatch`] when the kinds differ; the local state
    /// is left untouched.
    pub fn try_merge(&mut self, other: Self) -> Result<(), CrdtError> {
        match (self, other) {
            (Self::GCounter(a), Self::GCounter(b)) => a.merge(b),
            (Self::PnCounter(a), Self::PnCounter(b)) => a.merge(b),
            (Self::OrSet(a), Self::OrSet(b)) => a.merge(b),
            (Self::LwwSet(a), Self::LwwSet(b)) => a.merge(b),
            (Self::Rga(a), Self::Rga(b)) => a.merge(b),
            (local, remote) => {
                return Err(CrdtError::KindMismatch {
                    expected: local.kind(),
                    found: remote.kind(),
                });
            }
        }
        Ok(())
    }

    /// Borrow as a grow-only counter, if that is the kind.
    #[must_use]
    pub const fn as_g_counter(&self) -> Option<&GCounter> {
        match self {
            Self::GCounter(c) => Some(c),
            _ => None,
        }
    }

    /// Mutably borrow as a grow-only counter.
    pub const fn as_g_counter_mut(&mut self) -> Option<&mut GCounter> {
        match self {
            Self::GCounter(c) => Some(c),
            _ => None,
        }
    }

    /// Borrow as a PN-counter, if that is the kind.
    #[must_use]
    pub const fn as_pn_counter(&self) -> Option<&PnCounter> {
        match self {
            Self::PnCounter(c) => Some(c),
            _ => None,
        }
    }

    /// Mutably borrow as a PN-counter.
    pub const fn as_pn_counter_mut(&mut self) -> Option<&mut PnCounter> {
        match self {
            Self::PnCounter(c) => Some(c),
            _ => None,
        }
    }

    /// Borrow as an OR-Set, if that is the kind.
    #[must_use]
    pub const fn as_or_set(&self) -> Option<&OrSet<Value>> {
        match self {
            Self::OrSet(s) => Some(s),
            _ => None,
        }
    }

    /// Mutably borrow as an OR-Set.
    pub const fn as_or_set_mut(&mut self) -> Option<&mut OrSet<Value>> {
        match self {
            Self::OrSet(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as an LWW set, if that is the kind.
    #[must_use]
    pub const fn as_lww_set(&self) -> Option<&LwwSet<Value>> {
        match self {
            Self::LwwSet(s) => Some(s),
            _ => None,
        }
    }

    /// Mutably borrow as an LWW set.
    pub const fn as_lww_set_mut(&mut self) -> Option<&mut LwwSet<Value>> {
        match self {
            Self::LwwSet(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a sequence, if that is the kind.
    #[must_use]
    pub const fn as_rga(&self) -> Option<&Rga<Value>> {
        match self {
            Self::Rga(r) => Some(r),
            _ => None,
        }
    }

    /// Mutably borrow as a sequence.
    pub const fn as_rga_mut(&mut self) -> Option<&mut Rga<Value>> {
        match self {
            Self::Rga(r) => Some(r),
            _ => None,
        }
    }
}

impl From<GCounter> for Crdt {
    fn from(c: GCounter) -> Self {
        Self::GCounter(c)
    }
}

impl From<PnCounter> for Crdt {
    fn from(c: PnCounter) -> Self {
        Self::PnCounter(c)
    }
}

impl From<OrSet<Value>> for Crdt {
    fn from(s: OrSet<Value>) -> Self {
        Self::OrSet(s)
    }
}

impl From<LwwSet<Value>> for Crdt {
    fn from(s: LwwSet<Value>) -> Self {
        Self::LwwSet(s)
    }
}

impl From<Rga<Value>> for Crdt {
    fn from(r: Rga<Value>) -> Self {
        Self::Rga(r)
    }
}
