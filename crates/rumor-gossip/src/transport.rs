//! Transport seam and the in-memory implementation used by tests.
//!
//! The protocol never opens sockets itself; it hands encoded payloads to
//! a [`Transport`] and reads whatever shows up on its inbound queue. That
//! keeps the gossip loop testable against an in-process hub and leaves
//! real UDP or TCP carriers as drop-in implementations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use rumor_core::NodeId;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::TransportError;

/// Default inbound queue depth for [`MemoryHub`] mailboxes.
pub const DEFAULT_MAILBOX: usize = 256;

/// A message as delivered to a node's inbound queue.
#[derive(Debug, Clone)]
pub struct Incoming {
    /// Transport-level sender, for logging. The envelope inside the
    /// payload carries the authoritative sender id.
    pub from: NodeId,
    /// Raw encoded payload.
    pub payload: Vec<u8>,
}

/// Where outbound gossip goes.
///
/// Implementations are datagram-shaped: fire and forget, no ordering or
/// delivery guarantee. Losing messages is acceptable because every round
/// resends full state.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `payload` to `to`, best effort.
    async fn send(&self, to: &NodeId, payload: Vec<u8>) -> Result<(), TransportError>;
}

type Mailboxes = Arc<RwLock<HashMap<NodeId, mpsc::Sender<Incoming>>>>;

/// In-process message switch connecting [`MemoryTransport`] handles.
///
/// Every connected node gets a bounded mailbox. Sends to a full mailbox
/// are dropped silently, which is close enough to a lossy datagram
/// network for protocol tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    mailboxes: Mailboxes,
}

impl MemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node`, returning its sending handle and inbound queue.
    ///
    /// Reconnecting an already-known node replaces its mailbox.
    #[must_use]
    pub fn connect(&self, node: &NodeId) -> (MemoryTransport, mpsc::Receiver<Incoming>) {
        self.connect_with_capacity(node, DEFAULT_MAILBOX)
    }

    /// [`Self::connect`] with an explicit mailbox depth.
    #[must_use]
    pub fn connect_with_capacity(
        &self,
        node: &NodeId,
        capacity: usize,
    ) -> (MemoryTransport, mpsc::Receiver<Incoming>) {
        let (tx, rx) = mpsc::channel(capacity);
        self.write().insert(node.clone(), tx);
        let transport = MemoryTransport {
            from: node.clone(),
            mailboxes: Arc::clone(&self.mailboxes),
        };
        (transport, rx)
    }

    /// Forgets `node`; later sends to it report [`TransportError::UnknownPeer`].
    pub fn disconnect(&self, node: &NodeId) -> bool {
        self.write().remove(node).is_some()
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<NodeId, mpsc::Sender<Incoming>>> {
        self.mailboxes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sending handle bound to one node registered on a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    from: NodeId,
    mailboxes: Mailboxes,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, to: &NodeId, payload: Vec<u8>) -> Result<(), TransportError> {
        let mailbox = self
            .mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(to)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;
        let incoming = Incoming {
            from: self.from.clone(),
            payload,
        };
        match mailbox.try_send(incoming) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(to = %to, "mailbox full, dropping message");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed(to.clone())),
        }
    }
}
