//! The anti-entropy gossip loop.
//!
//! Each node runs one loop that alternates between two jobs: on every
//! tick it sweeps the failure detector and pushes its full state
//! snapshot to a random fanout of live peers, and between ticks it
//! drains the inbound queue, merging whatever snapshots arrive. Merging
//! is commutative and idempotent all the way down, so duplicate,
//! reordered, and crossed-in-flight messages all land on the same state.
//!
//! The loop owns nothing exclusively: the engine and peer table sit
//! behind mutexes so the application can mutate state and inspect
//! membership while gossip runs. Locks are never held across awaits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rumor_core::{Merge, MergeEngine, NodeId, VectorClock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::GossipConfig;
use crate::error::GossipError;
use crate::peer::{PeerEvent, PeerManager, PeerMetrics};
use crate::transport::{Incoming, Transport};
use crate::wire::SyncMessage;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Point-in-time protocol counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GossipMetrics {
    /// Sync messages the transport accepted.
    pub messages_sent: u64,
    /// Sync messages received and decoded.
    pub messages_received: u64,
    /// Individual root merges applied from remote snapshots.
    pub merge_operations: u64,
    /// Undecodable payloads plus entries refused for kind mismatch.
    pub payload_errors: u64,
    /// Diagnostic only: span from the last observed state change to the
    /// first merge that taught this node nothing new. `None` while
    /// changes are still propagating.
    pub convergence: Option<Duration>,
}

#[derive(Debug, Default)]
struct MetricsState {
    sent: u64,
    received: u64,
    merges: u64,
    payload_errors: u64,
    last_change_at: Option<Instant>,
    convergence: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Shared state between the public handle and the spawned loop.
struct Inner {
    node: NodeId,
    config: GossipConfig,
    engine: Arc<Mutex<MergeEngine>>,
    clock: Arc<Mutex<VectorClock>>,
    peers: Arc<Mutex<PeerManager>>,
    transport: Arc<dyn Transport>,
    metrics: Mutex<MetricsState>,
}

struct RunState {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One node's gossip endpoint.
///
/// Construct it, register roots on [`Self::engine`], introduce peers,
/// then [`Self::start`] the loop with the transport's inbound queue.
pub struct GossipProtocol {
    inner: Arc<Inner>,
    runtime: Mutex<Option<RunState>>,
}

impl GossipProtocol {
    /// Builds a protocol instance after validating `config`.
    pub fn new(
        node: NodeId,
        config: GossipConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, GossipError> {
        config.validate()?;
        let peers = PeerManager::new(node.clone(), config.detector, config.event_capacity);
        let inner = Inner {
            node: node.clone(),
            config,
            engine: Arc::new(Mutex::new(MergeEngine::new(node))),
            clock: Arc::new(Mutex::new(VectorClock::new())),
            peers: Arc::new(Mutex::new(peers)),
            transport,
            metrics: Mutex::new(MetricsState::default()),
        };
        Ok(Self {
            inner: Arc::new(inner),
            runtime: Mutex::new(None),
        })
    }

    /// The local node's id.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.inner.node
    }

    /// Handle to the local state registry.
    ///
    /// Lock it to register roots or apply local mutations; call
    /// [`Self::increment_clock`] after each mutation so causality
    /// tracking keeps up.
    #[must_use]
    pub fn engine(&self) -> Arc<Mutex<MergeEngine>> {
        Arc::clone(&self.inner.engine)
    }

    /// Handle to the peer table.
    #[must_use]
    pub fn peers(&self) -> Arc<Mutex<PeerManager>> {
        Arc::clone(&self.inner.peers)
    }

    /// Adds one peer to the table.
    pub fn add_peer(&self, id: NodeId, address: impl Into<String>, port: u16) -> bool {
        lock(&self.inner.peers).add_peer(id, address, port)
    }

    /// Subscribes to membership transitions.
    #[must_use]
    pub fn subscribe_peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        lock(&self.inner.peers).subscribe()
    }

    /// Bumps the local node's vector clock entry, marking a local
    /// mutation. Returns the new counter value.
    pub fn increment_clock(&self) -> u64 {
        let counter = lock(&self.inner.clock).increment(&self.inner.node);
        let mut metrics = lock(&self.inner.metrics);
        metrics.last_change_at = Some(Instant::now());
        metrics.convergence = None;
        counter
    }

    /// Snapshot of the local vector clock.
    #[must_use]
    pub fn clock(&self) -> VectorClock {
        lock(&self.inner.clock).clone()
    }

    /// Snapshot of the protocol counters.
    #[must_use]
    pub fn metrics(&self) -> GossipMetrics {
        let metrics = lock(&self.inner.metrics);
        GossipMetrics {
            messages_sent: metrics.sent,
            messages_received: metrics.received,
            merge_operations: metrics.merges,
            payload_errors: metrics.payload_errors,
            convergence: metrics.convergence,
        }
    }

    /// Membership counts and mean suspicion level right now.
    #[must_use]
    pub fn peer_metrics(&self) -> PeerMetrics {
        lock(&self.inner.peers).metrics(Instant::now())
    }

    /// True while the gossip loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.runtime).is_some()
    }

    /// Spawns the gossip loop, reading inbound messages from `inbound`.
    ///
    /// Must be called on a tokio runtime. Fails with
    /// [`GossipError::AlreadyRunning`] while a loop is active; a stopped
    /// protocol can be started again with a fresh inbound queue.
    pub fn start(&self, inbound: mpsc::Receiver<Incoming>) -> Result<(), GossipError> {
        let mut runtime = lock(&self.runtime);
        if runtime.is_some() {
            return Err(GossipError::AlreadyRunning);
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(Arc::clone(&self.inner), inbound, cancel.clone()));
        *runtime = Some(RunState { cancel, task });
        Ok(())
    }

    /// Stops the loop and waits for it to wind down. Idempotent; a round
    /// already in flight finishes first.
    pub async fn stop(&self) {
        let state = lock(&self.runtime).take();
        if let Some(state) = state {
            state.cancel.cancel();
            if state.task.await.is_err() {
                warn!(node = %self.inner.node, "gossip loop panicked before shutdown");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Loop body
// ---------------------------------------------------------------------------

async fn run_loop(
    inner: Arc<Inner>,
    mut inbound: mpsc::Receiver<Incoming>,
    cancel: CancellationToken,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(inner.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(node = %inner.node, "gossip loop started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            incoming = inbound.recv() => match incoming {
                Some(incoming) => inner.handle_message(&incoming),
                None => {
                    debug!(node = %inner.node, "inbound queue closed, stopping gossip loop");
                    break;
                }
            },
            _ = ticker.tick() => inner.run_round(&mut rng).await,
        }
    }
    debug!(node = %inner.node, "gossip loop stopped");
}

impl Inner {
    /// One gossip round: sweep the detector, then push the local
    /// snapshot to a random fanout of live peers.
    async fn run_round(&self, rng: &mut StdRng) {
        let now = Instant::now();
        let newly_failed = lock(&self.peers).sweep(now);
        for id in newly_failed {
            debug!(node = %self.node, peer = %id, "peer declared failed");
        }

        let targets = lock(&self.peers).random_peers(self.config.fanout, &[], rng);
        if targets.is_empty() {
            return;
        }

        let message = SyncMessage {
            from: self.node.clone(),
            clock: lock(&self.clock).clone(),
            entries: lock(&self.engine).snapshot(),
        };
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    node = %self.node,
                    error = %err,
                    "failed to encode local snapshot, skipping round"
                );
                return;
            }
        };

        for peer in targets {
            match self.transport.send(&peer, payload.clone()).await {
                Ok(()) => lock(&self.metrics).sent += 1,
                Err(err) => {
                    debug!(node = %self.node, peer = %peer, error = %err, "gossip send failed");
                }
            }
        }
    }

    /// Merges one inbound sync message into local state.
    fn handle_message(&self, incoming: &Incoming) {
        let message = match SyncMessage::decode(&incoming.payload) {
            Ok(message) => message,
            Err(err) => {
                lock(&self.metrics).payload_errors += 1;
                warn!(
                    node = %self.node,
                    from = %incoming.from,
                    error = %err,
                    "dropping undecodable gossip payload"
                );
                return;
            }
        };

        // Receipt doubles as a heartbeat. State from an unintroduced
        // sender still merges; only liveness tracking skips it.
        let now = Instant::now();
        if !lock(&self.peers).record_heartbeat(&message.from, now) {
            debug!(
                node = %self.node,
                peer = %message.from,
                "sync message from an untracked sender"
            );
        }

        let outcome = lock(&self.engine).apply(message.entries);
        lock(&self.clock).merge(message.clock);

        let mut metrics = lock(&self.metrics);
        metrics.received += 1;
        metrics.merges += outcome.merged as u64;
        metrics.payload_errors += outcome.errors as u64;
        if outcome.changed {
            metrics.last_change_at = Some(now);
            metrics.convergence = None;
        } else if metrics.convergence.is_none() {
            if let Some(changed_at) = metrics.last_change_at {
                metrics.convergence = Some(now.saturating_duration_since(changed_at));
            }
        }
        drop(metrics);

        trace!(
            node = %self.node,
            from = %message.from,
            merged = outcome.merged,
            changed = outcome.changed,
            "applied remote snapshot"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
