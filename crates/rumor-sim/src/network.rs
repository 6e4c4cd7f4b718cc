//! Deterministic fault-injecting network model.
//!
//! Messages are held in a pending queue with a per-send delivery round.
//! Drops, duplicates, delays, reordering, and partitions all come from
//! the seeded rng, so a seed fully determines every fault the run sees.

use std::collections::BTreeSet;

use rand::Rng;
use rumor_gossip::SyncMessage;
use serde::{Deserialize, Serialize};

/// Fault injection configuration for simulated delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    /// Percentage of sends dropped.
    pub drop_rate_percent: u8,
    /// Percentage of sends duplicated.
    pub duplicate_rate_percent: u8,
    /// Percentage chance of reordering ready messages at each tick.
    pub reorder_rate_percent: u8,
    /// Percentage chance per round to toggle a random partition.
    pub partition_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 2,
            drop_rate_percent: 5,
            duplicate_rate_percent: 3,
            reorder_rate_percent: 5,
            partition_rate_percent: 2,
        }
    }
}

impl FaultConfig {
    /// A fault-free network, used for the drain phase.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_delay_rounds: 0,
            drop_rate_percent: 0,
            duplicate_rate_percent: 0,
            reorder_rate_percent: 0,
            partition_rate_percent: 0,
        }
    }
}

/// Bernoulli trial with integer percent.
pub(crate) fn chance<R: Rng>(rng: &mut R, percent: u8) -> bool {
    if percent == 0 {
        return false;
    }
    if percent >= 100 {
        return true;
    }
    rng.gen_range(0..100) < percent
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingMessage {
    deliver_at_round: u64,
    to: usize,
    message: SyncMessage,
}

/// Result of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// Message dropped before enqueue.
    pub dropped: bool,
    /// Message was enqueued twice.
    pub duplicated: bool,
    /// Delay in rounds assigned to the enqueue.
    pub delay_rounds: u8,
}

/// One matured message addressed to a replica index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Destination replica index.
    pub to: usize,
    /// The snapshot being delivered.
    pub message: SyncMessage,
}

/// Result of delivering all ready messages for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome {
    /// Messages matured this round, in delivery order.
    pub delivered: Vec<Delivery>,
    /// Whether delivery order was shuffled.
    pub reordered: bool,
}

/// Deterministic lossy network between replica indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedNetwork {
    pending: Vec<PendingMessage>,
    partitioned: BTreeSet<usize>,
    fault: FaultConfig,
}

impl SimulatedNetwork {
    /// New network with the given fault profile.
    #[must_use]
    pub fn new(fault: FaultConfig) -> Self {
        Self {
            pending: Vec::new(),
            partitioned: BTreeSet::new(),
            fault,
        }
    }

    /// Current fault profile.
    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    /// Swaps the fault profile, e.g. to go fault-free for a drain.
    pub fn set_fault(&mut self, fault: FaultConfig) {
        self.fault = fault;
    }

    /// Isolates or reconnects one replica.
    pub fn set_partitioned(&mut self, node: usize, isolated: bool) {
        if isolated {
            self.partitioned.insert(node);
        } else {
            self.partitioned.remove(&node);
        }
    }

    /// True while `node` is cut off.
    #[must_use]
    pub fn is_partitioned(&self, node: usize) -> bool {
        self.partitioned.contains(&node)
    }

    /// Reconnects every partitioned replica.
    pub fn heal_all(&mut self) {
        self.partitioned.clear();
    }

    /// Messages still in flight.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Attempts to enqueue `message` from replica `from` to replica `to`
    /// at `round`, applying drop, delay, and duplication faults.
    #[must_use]
    pub fn send<R: Rng>(
        &mut self,
        from: usize,
        to: usize,
        message: SyncMessage,
        round: u64,
        rng: &mut R,
    ) -> SendOutcome {
        if self.is_partitioned(from)
            || self.is_partitioned(to)
            || chance(rng, self.fault.drop_rate_percent)
        {
            return SendOutcome {
                dropped: true,
                duplicated: false,
                delay_rounds: 0,
            };
        }

        let delay = rng.gen_range(0..=self.fault.max_delay_rounds);
        let deliver_at_round = round.saturating_add(u64::from(delay));
        let duplicated = chance(rng, self.fault.duplicate_rate_percent);

        if duplicated {
            self.pending.push(PendingMessage {
                deliver_at_round,
                to,
                message: message.clone(),
            });
        }
        self.pending.push(PendingMessage {
            deliver_at_round,
            to,
            message,
        });

        SendOutcome {
            dropped: false,
            duplicated,
            delay_rounds: delay,
        }
    }

    /// Releases every message whose delivery round has arrived.
    #[must_use]
    pub fn deliver_ready<R: Rng>(&mut self, round: u64, rng: &mut R) -> DeliverOutcome {
        let mut ready = Vec::new();
        let mut future = Vec::new();
        for pending in self.pending.drain(..) {
            if pending.deliver_at_round <= round {
                ready.push(Delivery {
                    to: pending.to,
                    message: pending.message,
                });
            } else {
                future.push(pending);
            }
        }
        self.pending = future;

        let reordered = ready.len() > 1 && chance(rng, self.fault.reorder_rate_percent);
        if reordered {
            ready.reverse();
        }

        DeliverOutcome {
            delivered: ready,
            reordered,
        }
    }
}
