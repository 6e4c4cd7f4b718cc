//! Cluster membership and liveness tracking.
//!
//! [`PeerManager`] owns the peer table: who we know, when we last heard
//! from them, and a [`PhiDetector`] per peer fed by message arrivals.
//! State transitions go out on a broadcast channel so the application can
//! react to failures without polling.
//!
//! The manager is plain state with no interior locking. The protocol owns
//! it behind a mutex, and tests drive it directly with fabricated clocks.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::Rng;
use rand::seq::SliceRandom;
use rumor_core::NodeId;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::detector::PhiDetector;

/// What the manager knows about one peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Peer identity.
    pub id: NodeId,
    /// Advertised address, opaque to the manager.
    pub address: String,
    /// Advertised port.
    pub port: u16,
    /// When we last heard from this peer.
    pub last_seen: Instant,
    /// Failure declarations since the peer was last heard from. Cleared
    /// by every heartbeat.
    pub failure_count: u32,
    /// False once the detector declares the peer failed, until it is
    /// heard from again.
    pub alive: bool,
}

/// Membership transitions, broadcast to subscribers.
///
/// `Failed` and `Recovered` fire exactly once per transition; a peer
/// already marked down is not re-announced on every sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A peer was added to the table.
    Joined { id: NodeId },
    /// A peer was explicitly removed.
    Removed { id: NodeId },
    /// The detector crossed its threshold for a live peer.
    Failed { id: NodeId, phi: f64 },
    /// A failed peer was heard from again.
    Recovered { id: NodeId },
}

/// Counts and suspicion summary for a quick health readout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeerMetrics {
    /// Peers in the table.
    pub total: usize,
    /// Peers currently considered alive.
    pub alive: usize,
    /// Peers currently considered failed.
    pub failed: usize,
    /// Mean phi across every tracked peer, 0.0 for an empty table.
    pub mean_phi: f64,
}

#[derive(Debug)]
struct PeerState {
    info: PeerInfo,
    detector: PhiDetector,
}

/// Tracks every known peer with a per-peer failure detector.
#[derive(Debug)]
pub struct PeerManager {
    self_id: NodeId,
    detector: DetectorConfig,
    peers: BTreeMap<NodeId, PeerState>,
    events: broadcast::Sender<PeerEvent>,
}

impl PeerManager {
    /// New manager for the node identified by `self_id`.
    #[must_use]
    pub fn new(self_id: NodeId, detector: DetectorConfig, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            self_id,
            detector,
            peers: BTreeMap::new(),
            events,
        }
    }

    /// The local node's id. Never present in the peer table.
    #[must_use]
    pub const fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    /// Subscribes to membership transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    /// Adds a peer, or refreshes one already known.
    ///
    /// Re-introducing a known peer updates its address, refreshes
    /// `last_seen`, and revives it if it was failed (emitting
    /// [`PeerEvent::Recovered`] once), keeping its detector history.
    /// Returns true only when the peer is new; the local node is never
    /// tracked.
    pub fn add_peer(&mut self, id: NodeId, address: impl Into<String>, port: u16) -> bool {
        if id == self.self_id {
            debug!(%id, "refusing to track the local node as a peer");
            return false;
        }
        if let Some(state) = self.peers.get_mut(&id) {
            state.info.address = address.into();
            state.info.port = port;
            state.info.last_seen = Instant::now();
            if !state.info.alive {
                state.info.alive = true;
                state.info.failure_count = 0;
                let _ = self.events.send(PeerEvent::Recovered { id });
            }
            return false;
        }
        let state = PeerState {
            info: PeerInfo {
                id: id.clone(),
                address: address.into(),
                port,
                last_seen: Instant::now(),
                failure_count: 0,
                alive: true,
            },
            detector: PhiDetector::new(self.detector.window, self.detector.min_std_dev_ms),
        };
        self.peers.insert(id.clone(), state);
        let _ = self.events.send(PeerEvent::Joined { id });
        true
    }

    /// Seeds the table from a static peer list, returning how many were
    /// actually added.
    pub fn bootstrap<I>(&mut self, seeds: I) -> usize
    where
        I: IntoIterator<Item = (NodeId, String, u16)>,
    {
        seeds
            .into_iter()
            .filter(|(id, address, port)| self.add_peer(id.clone(), address.clone(), *port))
            .count()
    }

    /// Drops a peer from the table.
    pub fn remove_peer(&mut self, id: &NodeId) -> bool {
        if self.peers.remove(id).is_none() {
            return false;
        }
        let _ = self.events.send(PeerEvent::Removed { id: id.clone() });
        true
    }

    /// Records a message arrival from `id` at `now`.
    ///
    /// Feeds the peer's detector, refreshes `last_seen`, clears the
    /// failure tally, and revives a failed peer (emitting
    /// [`PeerEvent::Recovered`] once). Returns false for unknown
    /// senders.
    pub fn record_heartbeat(&mut self, id: &NodeId, now: Instant) -> bool {
        let Some(state) = self.peers.get_mut(id) else {
            return false;
        };
        let interval = now.saturating_duration_since(state.info.last_seen);
        state.detector.record(duration_ms(interval));
        state.info.last_seen = now;
        state.info.failure_count = 0;
        if !state.info.alive {
            state.info.alive = true;
            let _ = self.events.send(PeerEvent::Recovered { id: id.clone() });
        }
        true
    }

    /// Checks every live peer's suspicion level at `now` and marks those
    /// past the threshold as failed, returning their ids.
    ///
    /// A peer with fewer than two recorded intervals is never suspected;
    /// a freshly joined peer has to be heard from before it can fail.
    pub fn sweep(&mut self, now: Instant) -> Vec<NodeId> {
        let mut newly_failed = Vec::new();
        for state in self.peers.values_mut() {
            if !state.info.alive {
                continue;
            }
            let elapsed = now.saturating_duration_since(state.info.last_seen);
            let phi = state.detector.phi(duration_ms(elapsed));
            if phi > self.detector.threshold {
                state.info.alive = false;
                state.info.failure_count += 1;
                let _ = self.events.send(PeerEvent::Failed {
                    id: state.info.id.clone(),
                    phi,
                });
                newly_failed.push(state.info.id.clone());
            }
        }
        newly_failed
    }

    /// Current suspicion level for `id` at `now`.
    #[must_use]
    pub fn phi(&self, id: &NodeId, now: Instant) -> Option<f64> {
        let state = self.peers.get(id)?;
        let elapsed = now.saturating_duration_since(state.info.last_seen);
        Some(state.detector.phi(duration_ms(elapsed)))
    }

    /// Draws up to `count` distinct live peers, skipping `exclude`.
    ///
    /// Partial Fisher-Yates over the live set, so every eligible peer is
    /// equally likely.
    pub fn random_peers<R: Rng>(
        &self,
        count: usize,
        exclude: &[NodeId],
        rng: &mut R,
    ) -> Vec<NodeId> {
        let mut candidates: Vec<NodeId> = self
            .peers
            .values()
            .filter(|state| state.info.alive && !exclude.contains(&state.info.id))
            .map(|state| state.info.id.clone())
            .collect();
        let (chosen, _) = candidates.partial_shuffle(rng, count);
        chosen.to_vec()
    }

    /// Ids of all peers currently considered alive, in id order.
    #[must_use]
    pub fn alive_peers(&self) -> Vec<NodeId> {
        self.peers
            .values()
            .filter(|state| state.info.alive)
            .map(|state| state.info.id.clone())
            .collect()
    }

    /// Looks up one peer.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&PeerInfo> {
        self.peers.get(id).map(|state| &state.info)
    }

    /// Snapshot of every tracked peer, in id order.
    #[must_use]
    pub fn all_peers(&self) -> Vec<PeerInfo> {
        self.peers.values().map(|state| state.info.clone()).collect()
    }

    /// Number of tracked peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peers are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Membership counts and the mean suspicion level at `now`.
    #[must_use]
    pub fn metrics(&self, now: Instant) -> PeerMetrics {
        let total = self.peers.len();
        let alive = self.peers.values().filter(|state| state.info.alive).count();
        let mean_phi = if total == 0 {
            0.0
        } else {
            let sum: f64 = self
                .peers
                .values()
                .map(|state| {
                    let elapsed = now.saturating_duration_since(state.info.last_seen);
                    state.detector.phi(duration_ms(elapsed))
                })
                .sum();
            sum / total as f64
        };
        PeerMetrics {
            total,
            alive,
            failed: total - alive,
            mean_phi,
        }
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
