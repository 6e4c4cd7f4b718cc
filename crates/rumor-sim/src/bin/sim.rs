#![forbid(unsafe_code)]

use std::env;

use anyhow::{Context as _, Result, bail};
use rumor_sim::campaign::{CampaignConfig, replay_seed, run_campaign};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> Result<()> {
    init_tracing();

    let config = CampaignConfig::default();
    match env::args().nth(1) {
        Some(raw) => {
            let seed: u64 = raw
                .parse()
                .with_context(|| format!("not a seed: {raw}"))?;
            let replay = replay_seed(seed, &config)?;
            println!(
                "seed {seed}: trace_events={} converged={} converged_at={:?} oracle_passed={}",
                replay.result.trace.len(),
                replay.result.converged,
                replay.result.converged_at_round,
                replay.oracle.passed
            );
            for violation in &replay.oracle.violations {
                println!("  violation: {violation:?}");
            }
            Ok(())
        }
        None => {
            let report = run_campaign(&config)?;
            println!(
                "campaign complete: seeds_run={} seeds_passed={} first_failure={:?}",
                report.seeds_run, report.seeds_passed, report.first_failure
            );
            if report.all_passed() {
                Ok(())
            } else {
                bail!("{} seeds failed invariant checks", report.failures.len());
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RUMOR_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "rumor_sim=debug,rumor_gossip=debug,info"
        } else {
            "rumor_sim=info,warn"
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}
