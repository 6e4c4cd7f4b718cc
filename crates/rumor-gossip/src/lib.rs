//! rumor-gossip: membership, failure detection, and anti-entropy.
//!
//! This crate turns the passive state in `rumor-core` into a replicated
//! layer. Each node runs a [`protocol::GossipProtocol`]: a single loop
//! that periodically pushes the node's full snapshot to a few random live
//! peers and merges whatever snapshots arrive. Liveness comes from
//! [`peer::PeerManager`], which feeds a phi-accrual
//! [`detector::PhiDetector`] per peer from message arrivals instead of a
//! hard timeout.
//!
//! Transports are pluggable through the [`transport::Transport`] trait;
//! [`transport::MemoryHub`] wires nodes together in-process for tests.
//!
//! # Conventions
//!
//! - **Errors**: `GossipError` / `TransportError` via `thiserror`; bad
//!   remote data is counted and skipped, never fatal.
//! - **Logging**: `tracing` with the node id on every loop-side event.
//! - **Shutdown**: cooperative, via `tokio_util` cancellation tokens.

pub mod config;
pub mod detector;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod transport;
pub mod wire;

pub use config::{DetectorConfig, GossipConfig};
pub use detector::{DEFAULT_MIN_STD_DEV_MS, DEFAULT_PHI_THRESHOLD, DEFAULT_WINDOW, PhiDetector};
pub use error::{GossipError, TransportError};
pub use peer::{PeerEvent, PeerInfo, PeerManager, PeerMetrics};
pub use protocol::{GossipMetrics, GossipProtocol};
pub use transport::{DEFAULT_MAILBOX, Incoming, MemoryHub, MemoryTransport, Transport};
pub use wire::SyncMessage;
