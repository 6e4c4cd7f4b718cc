//! Deterministic simulation harness for rumor's replication layer.
//!
//! A run is fully described by its [`SimulationConfig`]: the same seed
//! replays the same mutations, faults, and deliveries and lands on the
//! same end states. Rounds stand in for time. A faulty phase mutates
//! replicas and gossips their snapshots through a lossy
//! [`network::SimulatedNetwork`]; a fault-free drain phase then
//! broadcasts until every replica has caught up, and
//! [`oracle::ConvergenceOracle`] judges the result. Because replicas
//! exchange full state, a drained run must converge no matter what the
//! faulty phase dropped.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` on harness entry points.
//! - **Logging**: `tracing` macros (`debug!`, `trace!`).

pub mod campaign;
pub mod clock;
pub mod network;
pub mod oracle;
pub mod replica;

use anyhow::{Result, bail};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rumor_core::NodeId;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::ClockConfig;
use crate::network::{DeliverOutcome, FaultConfig, SimulatedNetwork, chance};
use crate::replica::{ReplicaState, SimReplica};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters for one simulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for every random decision in the run.
    pub seed: u64,
    /// Number of replicas.
    pub node_count: usize,
    /// Rounds in the faulty phase.
    pub rounds: u64,
    /// Fault-free rounds appended so in-flight state lands everywhere.
    pub drain_rounds: u64,
    /// Gossip targets per replica per faulty round.
    pub fanout: usize,
    /// Chance (percent) that a replica mutates in a given round.
    pub mutate_rate_percent: u8,
    /// Network fault profile for the faulty phase.
    pub fault: FaultConfig,
    /// Per-replica wall clock skew profile.
    pub clock: ClockConfig,
}

impl SimulationConfig {
    /// Five replicas, thirty faulty rounds, default faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            node_count: 5,
            rounds: 30,
            drain_rounds: 8,
            fanout: 2,
            mutate_rate_percent: 60,
            fault: FaultConfig::default(),
            clock: ClockConfig::default(),
        }
    }

    /// Validates parameters before a run.
    ///
    /// # Errors
    ///
    /// Returns an error when a parameter is out of range, or when the
    /// drain is too short for the slowest possible message to land
    /// inside the run.
    pub fn validate(&self) -> Result<()> {
        if self.node_count < 2 {
            bail!("node_count must be at least 2");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.fanout == 0 {
            bail!("fanout must be > 0");
        }
        if self.mutate_rate_percent > 100 {
            bail!("mutate_rate_percent must be at most 100");
        }
        if self.drain_rounds <= u64::from(self.fault.max_delay_rounds) {
            bail!(
                "drain_rounds ({}) must exceed max_delay_rounds ({})",
                self.drain_rounds,
                self.fault.max_delay_rounds
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// One observable simulation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Round the step happened in.
    pub round: u64,
    /// What happened.
    pub kind: TraceEventKind,
}

/// The kinds of step a trace records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    /// A replica mutated one of its roots.
    Mutate {
        /// The mutating replica.
        node: NodeId,
        /// The root that changed.
        key: String,
    },
    /// A snapshot was handed to the network.
    Send {
        /// Sending replica.
        from: NodeId,
        /// Addressed replica.
        to: NodeId,
        /// Lost before enqueue.
        dropped: bool,
        /// Enqueued twice.
        duplicated: bool,
        /// Rounds the network will sit on it.
        delay_rounds: u8,
    },
    /// A snapshot reached its destination.
    Deliver {
        /// Receiving replica.
        to: NodeId,
        /// Replica whose state arrived.
        from: NodeId,
    },
    /// A replica was cut off from, or reconnected to, the network.
    PartitionToggled {
        /// The affected replica.
        node: NodeId,
        /// True when now isolated.
        isolated: bool,
    },
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Final state of every replica, in index order.
    pub states: Vec<ReplicaState>,
    /// Ordered log of everything that happened.
    pub trace: Vec<TraceEvent>,
    /// Whether all replicas ended identical.
    pub converged: bool,
    /// First drain round at which all replicas were identical.
    pub converged_at_round: Option<u64>,
    /// Send attempts handed to the network.
    pub messages_sent: u64,
    /// Sends lost to drops or partitions.
    pub messages_dropped: u64,
    /// Sends the network enqueued twice.
    pub messages_duplicated: u64,
    /// Matured messages handed to replicas.
    pub messages_delivered: u64,
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Drives replicas, network, and faults from a single seed.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    replicas: Vec<SimReplica>,
    network: SimulatedNetwork,
    rng: StdRng,
    trace: Vec<TraceEvent>,
}

impl Simulator {
    /// Builds replicas and the network from a validated config.
    ///
    /// # Errors
    ///
    /// Returns an error when the config fails validation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let replicas = (0..config.node_count)
            .map(|i| {
                SimReplica::new(
                    NodeId::new(format!("node-{i}")),
                    config.clock.assign(&mut rng),
                )
            })
            .collect();
        Ok(Self {
            config,
            replicas,
            network: SimulatedNetwork::new(config.fault),
            rng,
            trace: Vec::new(),
        })
    }

    /// Runs the faulty phase plus the drain, returning the full record.
    ///
    /// # Errors
    ///
    /// Returns an error if a scripted mutation cannot be applied, which
    /// means the harness itself is broken.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let total_rounds = self.config.rounds + self.config.drain_rounds;
        let mut sent = 0_u64;
        let mut dropped = 0_u64;
        let mut duplicated = 0_u64;
        let mut delivered = 0_u64;
        let mut converged_at = None;

        for round in 0..total_rounds {
            let draining = round >= self.config.rounds;
            if round == self.config.rounds {
                debug!(round, "drain phase: faults off, partitions healed");
                self.network.heal_all();
                self.network.set_fault(FaultConfig::none());
            }

            if !draining {
                self.toggle_partition(round);
                self.mutate_round(round)?;
            }

            self.gossip_round(round, draining, &mut sent, &mut dropped, &mut duplicated);
            delivered += self.deliver_round(round);

            if draining && converged_at.is_none() && self.all_converged() {
                converged_at = Some(round);
            }
        }

        let converged = converged_at.is_some();
        debug!(converged, sent, dropped, duplicated, "run finished");
        Ok(SimulationResult {
            states: self.replicas.iter().map(SimReplica::state).collect(),
            trace: std::mem::take(&mut self.trace),
            converged,
            converged_at_round: converged_at,
            messages_sent: sent,
            messages_dropped: dropped,
            messages_duplicated: duplicated,
            messages_delivered: delivered,
        })
    }

    /// Each faulty round one replica may flip between isolated and
    /// reachable.
    fn toggle_partition(&mut self, round: u64) {
        if !chance(&mut self.rng, self.config.fault.partition_rate_percent) {
            return;
        }
        let index = self.rng.gen_range(0..self.replicas.len());
        let isolated = !self.network.is_partitioned(index);
        self.network.set_partitioned(index, isolated);
        self.trace.push(TraceEvent {
            round,
            kind: TraceEventKind::PartitionToggled {
                node: self.replicas[index].node().clone(),
                isolated,
            },
        });
    }

    fn mutate_round(&mut self, round: u64) -> Result<()> {
        for index in 0..self.replicas.len() {
            if !chance(&mut self.rng, self.config.mutate_rate_percent) {
                continue;
            }
            let key = self.replicas[index].mutate(round, &mut self.rng)?;
            trace!(round, node = %self.replicas[index].node(), key, "mutated");
            self.trace.push(TraceEvent {
                round,
                kind: TraceEventKind::Mutate {
                    node: self.replicas[index].node().clone(),
                    key: key.to_owned(),
                },
            });
        }
        Ok(())
    }

    /// Faulty rounds gossip each snapshot to `fanout` random peers;
    /// drain rounds broadcast so every gap closes.
    fn gossip_round(
        &mut self,
        round: u64,
        draining: bool,
        sent: &mut u64,
        dropped: &mut u64,
        duplicated: &mut u64,
    ) {
        for from in 0..self.replicas.len() {
            let targets = self.pick_targets(from, draining);
            if targets.is_empty() {
                continue;
            }
            let message = self.replicas[from].sync_message();
            for to in targets {
                let outcome =
                    self.network
                        .send(from, to, message.clone(), round, &mut self.rng);
                *sent += 1;
                if outcome.dropped {
                    *dropped += 1;
                }
                if outcome.duplicated {
                    *duplicated += 1;
                }
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Send {
                        from: self.replicas[from].node().clone(),
                        to: self.replicas[to].node().clone(),
                        dropped: outcome.dropped,
                        duplicated: outcome.duplicated,
                        delay_rounds: outcome.delay_rounds,
                    },
                });
            }
        }
    }

    fn pick_targets(&mut self, from: usize, draining: bool) -> Vec<usize> {
        let mut candidates: Vec<usize> = (0..self.replicas.len())
            .filter(|&index| index != from)
            .collect();
        if draining {
            return candidates;
        }
        let take = self.config.fanout.min(candidates.len());
        let (chosen, _) = candidates.partial_shuffle(&mut self.rng, take);
        chosen.to_vec()
    }

    fn deliver_round(&mut self, round: u64) -> u64 {
        let DeliverOutcome { delivered, .. } = self.network.deliver_ready(round, &mut self.rng);
        let count = delivered.len() as u64;
        for delivery in delivered {
            let from = delivery.message.from.clone();
            let to = self.replicas[delivery.to].node().clone();
            self.replicas[delivery.to].absorb(delivery.message);
            self.trace.push(TraceEvent {
                round,
                kind: TraceEventKind::Deliver { to, from },
            });
        }
        count
    }

    /// True when every replica holds identical tagged state.
    fn all_converged(&self) -> bool {
        let mut replicas = self.replicas.iter();
        let Some(first) = replicas.next() else {
            return true;
        };
        let canonical = first.state();
        replicas.all(|replica| replica.state().entries == canonical.entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
