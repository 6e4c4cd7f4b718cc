//! Error types for transports and the gossip protocol.

use rumor_core::NodeId;

/// Failures surfaced by a [`crate::Transport`] implementation.
///
/// Transports are expected to be lossy: a full outbound queue is not an
/// error, it is a dropped packet. Only conditions the caller could act on
/// are reported here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The destination has never been registered with the transport.
    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),

    /// The destination was registered but its inbound queue has been
    /// dropped, typically because the node shut down.
    #[error("peer {0} is no longer accepting messages")]
    Closed(NodeId),
}

/// Errors produced by the gossip layer itself.
#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    /// A received payload could not be decoded as a sync message, or an
    /// outbound snapshot could not be encoded.
    #[error("wire codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// The transport refused an outbound message.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// A configuration value fails validation.
    #[error("invalid config: {reason}")]
    Config { reason: String },

    /// `start` was called on a protocol that already has a running loop.
    #[error("gossip loop is already running")]
    AlreadyRunning,
}
