//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with one parameter set, collecting pass/fail
//! verdicts and naming the first failing seed so it can be replayed
//! with its trace intact.

use std::ops::Range;

use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::ClockConfig;
use crate::network::FaultConfig;
use crate::oracle::{ConvergenceOracle, InvariantViolation, OracleResult};
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: how many seeds to run, and the
/// simulation parameters each seed runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    /// Replicas per seed.
    pub node_count: usize,
    /// Faulty rounds per seed.
    pub rounds: u64,
    /// Fault-free drain rounds per seed.
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

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            node_count: 5,
            rounds: 24,
            drain_rounds: 8,
            fanout: 2,
            mutate_rate_percent: 60,
            fault: FaultConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

impl CampaignConfig {
    /// The [`SimulationConfig`] for one seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            node_count: self.node_count,
            rounds: self.rounds,
            drain_rounds: self.drain_rounds,
            fanout: self.fanout,
            mutate_rate_percent: self.mutate_rate_percent,
            fault: self.fault,
            clock: self.clock,
        }
    }

    /// Validates the campaign before running it.
    ///
    /// # Errors
    ///
    /// Returns an error when the seed range is empty or the per-seed
    /// parameters fail [`SimulationConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    /// The seed that failed.
    pub seed: u64,
    /// Rendered invariant violations.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Total seeds executed.
    pub seeds_run: usize,
    /// Seeds that passed every invariant.
    pub seeds_passed: usize,
    /// First failing seed, for prioritized replay.
    pub first_failure: Option<u64>,
    /// Every seed failure with rendered violations.
    pub failures: Vec<SeedFailure>,
}

impl CampaignReport {
    /// True when every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Full record from replaying one seed.
#[derive(Debug, Clone)]
pub struct SeedReplay {
    /// The simulation result with full trace and final states.
    pub result: SimulationResult,
    /// Oracle verdict over the final states.
    pub oracle: OracleResult,
}

/// Runs every seed in the configured range.
///
/// # Errors
///
/// Returns an error when validation fails or a simulation itself
/// errors. Invariant violations are collected in the report, not
/// returned as errors.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut seeds_run = 0_usize;
    let mut seeds_passed = 0_usize;
    let mut first_failure = None;
    let mut failures = Vec::new();

    for seed in config.seed_range.clone() {
        seeds_run += 1;
        match run_single_seed(seed, config)? {
            Ok(()) => seeds_passed += 1,
            Err(violations) => {
                debug!(seed, count = violations.len(), "seed failed");
                if first_failure.is_none() {
                    first_failure = Some(seed);
                }
                failures.push(SeedFailure {
                    seed,
                    violations: violations.iter().map(format_violation).collect(),
                });
            }
        }
    }

    info!(seeds_run, seeds_passed, "campaign finished");
    Ok(CampaignReport {
        seeds_run,
        seeds_passed,
        first_failure,
        failures,
    })
}

/// Runs one seed; `Ok(Ok(()))` on pass, `Ok(Err(violations))` when the
/// oracle finds broken invariants.
///
/// # Errors
///
/// Returns an `anyhow::Error` only when the simulation itself cannot
/// run. The inner result distinguishes pass from violation.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;

    // Offset keeps the oracle's shuffles decoupled from sim randomness.
    let mut oracle_rng = StdRng::seed_from_u64(seed.wrapping_add(0xDEAD));
    let verdict = ConvergenceOracle::check_all(&result.states, &mut oracle_rng);

    if verdict.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(verdict.violations))
    }
}

/// Replays one seed with the full trace kept, for digging into a
/// failure out of a campaign report.
///
/// # Errors
///
/// Returns an error when config validation or the simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SeedReplay> {
    config.validate()?;
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;

    let mut oracle_rng = StdRng::seed_from_u64(seed.wrapping_add(0xDEAD));
    let oracle = ConvergenceOracle::check_all(&result.states, &mut oracle_rng);

    Ok(SeedReplay { result, oracle })
}

/// Renders an invariant violation for reports and logs.
fn format_violation(violation: &InvariantViolation) -> String {
    match violation {
        InvariantViolation::Convergence {
            node_a,
            node_b,
            keys,
        } => {
            format!("convergence: {node_a} and {node_b} disagree on {keys:?}")
        }
        InvariantViolation::Idempotence { node, keys } => {
            format!("idempotence: re-applying {node}'s own snapshot moved {keys:?}")
        }
        InvariantViolation::Commutativity {
            permutation_index,
            keys,
        } => {
            format!("commutativity: permutation {permutation_index} diverges on {keys:?}")
        }
    }
}
