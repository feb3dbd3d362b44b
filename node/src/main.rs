// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vault Node
//!
//! Entry point for the `vault-node` binary. Parses CLI arguments, initializes
//! logging and metrics, and dispatches to one of four subcommands:
//!
//! - `simulate`: replay a scenario against a fresh in-memory deployment
//! - `tx-hash`: compute the time-lock hash of a call tuple
//! - `template`: print an example scenario
//! - `version`: print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;

use vault_contracts::TimeLock;
use vault_protocol::Address;

use cli::{Commands, VaultNodeCli};
use logging::LogFormat;
use metrics::VaultMetrics;
use scenario::{Scenario, Simulator, DEMO_SCENARIO};

fn main() -> Result<()> {
    let cli = VaultNodeCli::parse();

    match cli.command {
        Commands::Simulate(args) => simulate(args),
        Commands::TxHash(args) => tx_hash(args),
        Commands::Template => {
            print!("{DEMO_SCENARIO}");
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Deploys, replays the scenario, and prints the final state as JSON.
fn simulate(args: cli::SimulateArgs) -> Result<()> {
    logging::init_logging(&args.log_level, LogFormat::from_str_lossy(&args.log_format));

    let scenario = Scenario::load(&args.scenario)?;
    tracing::info!(
        scenario = %args.scenario.display(),
        strategies = scenario.strategies.len(),
        steps = scenario.steps.len(),
        "starting simulation"
    );

    let metrics = VaultMetrics::new();
    let mut simulator = Simulator::deploy(&scenario, metrics.clone())?;
    simulator.run(&scenario.steps)?;

    let summary = simulator.summary(args.events)?;
    let json = serde_json::to_string_pretty(&summary).context("failed to serialize summary")?;
    println!("{json}");

    if args.metrics {
        let text = metrics.encode().context("failed to encode metrics")?;
        print!("{text}");
    }

    tracing::info!(
        total_assets = summary.total_assets,
        price_per_share = summary.price_per_share,
        "simulation complete"
    );
    Ok(())
}

/// Prints the queue hash of `(target, value, payload, eta, nonce)`.
fn tx_hash(args: cli::TxHashArgs) -> Result<()> {
    let target = Address::from_hex(&args.target)
        .with_context(|| format!("invalid target address: {}", args.target))?;
    let payload = args.payload.strip_prefix("0x").unwrap_or(&args.payload);
    let payload = hex::decode(payload).context("payload is not valid hex")?;

    let hash = TimeLock::tx_hash(target, args.value, &payload, args.eta, args.nonce);
    println!("{hash}");
    Ok(())
}

fn print_version() {
    println!("vault-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
