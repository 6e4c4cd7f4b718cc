//! Wire format for anti-entropy exchanges.
//!
//! A gossip round ships the sender's full state snapshot: one
//! [`StateEntry`] per registered key, each tagged with its replica kind so
//! the receiver can refuse to merge mismatched kinds, plus the sender's
//! vector clock. Everything is JSON so payloads stay inspectable from any
//! peer implementation.

use rumor_core::{NodeId, StateEntry, VectorClock};
use serde::{Deserialize, Serialize};

use crate::error::GossipError;

/// One full-state exchange from `from` to whoever receives it.
///
/// Receipt of a sync message doubles as a heartbeat for the failure
/// detector, so `from` is authoritative for liveness accounting even when
/// the transport knows the sender by other means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Node that produced this snapshot.
    pub from: NodeId,
    /// The sender's vector clock at send time.
    pub clock: VectorClock,
    /// Snapshot of every registered key, in key order.
    pub entries: Vec<StateEntry>,
}

impl SyncMessage {
    /// Encodes the message for the transport.
    ///
    /// # Errors
    ///
    /// [`GossipError::Codec`] when serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, GossipError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes bytes received from the transport.
    ///
    /// # Errors
    ///
    /// [`GossipError::Codec`] when the payload is not a valid snapshot.
    pub fn decode(bytes: &[u8]) -> Result<Self, GossipError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
