//! # CLI Interface
//!
//! Defines the command-line argument structure for `vault-node` using
//! `clap` derive. Supports four subcommands: `simulate`, `tx-hash`,
//! `template`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vault scenario simulator.
///
/// Deploys a time-lock governed vault in memory, replays a JSON scenario of
/// deposits, allocations, yield and governance calls against it, and prints
/// the resulting state and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "vault-node",
    about = "Vault scenario simulator and governance tooling",
    version,
    propagate_version = true
)]
pub struct VaultNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the vault node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario file against a fresh deployment.
    Simulate(SimulateArgs),
    /// Compute the time-lock hash of a call tuple.
    TxHash(TxHashArgs),
    /// Print an example scenario to stdout.
    Template,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Path to the scenario file (JSON).
    #[arg(long, short = 's', env = "VAULT_SCENARIO")]
    pub scenario: PathBuf,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "VAULT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(
        long,
        env = "VAULT_LOG_LEVEL",
        default_value = "vault_node=info,vault_contracts=info"
    )]
    pub log_level: String,

    /// Print the Prometheus text exposition after the summary.
    #[arg(long)]
    pub metrics: bool,

    /// Include every emitted event in the summary.
    #[arg(long)]
    pub events: bool,
}

/// Arguments for the `tx-hash` subcommand.
#[derive(Parser, Debug)]
pub struct TxHashArgs {
    /// Target address, `0x`-prefixed hex.
    #[arg(long)]
    pub target: String,

    /// Value forwarded with the call.
    #[arg(long, default_value_t = 0)]
    pub value: u128,

    /// Call payload, hex (optionally `0x`-prefixed).
    #[arg(long, default_value = "")]
    pub payload: String,

    /// Earliest execution timestamp.
    #[arg(long)]
    pub eta: u64,

    /// Queue nonce.
    #[arg(long, default_value_t = 0)]
    pub nonce: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        VaultNodeCli::command().debug_assert();
    }

    #[test]
    fn parses_tx_hash_arguments() {
        let cli = VaultNodeCli::try_parse_from([
            "vault-node",
            "tx-hash",
            "--target",
            "0x0000000000000000000000000000000000000001",
            "--value",
            "1",
            "--payload",
            "0x1212",
            "--eta",
            "86400",
        ])
        .unwrap();
        match cli.command {
            Commands::TxHash(args) => {
                assert_eq!(args.value, 1);
                assert_eq!(args.payload, "0x1212");
                assert_eq!(args.eta, 86_400);
                assert_eq!(args.nonce, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
