//! rumor-core: vector clocks, state-based CRDTs, and the merge engine.
//!
//! This crate is the replication substrate under the gossip layer. It knows
//! nothing about networks or timers: everything here is a plain value that
//! can be cloned, serialized, and merged. The [`engine::MergeEngine`] holds
//! one node's named roots; the five CRDTs under [`crdt`] are the state they
//! carry; [`clock::VectorClock`] tracks causality between snapshots.
//!
//! # Conventions
//!
//! - **Errors**: fallible operations return `Result<_, CrdtError>`; merge
//!   laws never fail, invariant violations do.
//! - **Logging**: `tracing` macros (`warn!` for soft-skipped remote data).
//! - **Serialization**: everything that travels derives serde and
//!   round-trips through JSON.

pub mod clock;
pub mod crdt;
pub mod engine;
pub mod error;
pub mod merge;
pub mod node;

pub use clock::VectorClock;
pub use crdt::{Crdt, CrdtKind, GCounter, LwwSet, OrSet, PnCounter, Rga};
pub use engine::{MergeEngine, MergeOutcome, StateEntry};
pub use error::CrdtError;
pub use merge::Merge;
pub use node::{Dot, NodeId, now_millis};
