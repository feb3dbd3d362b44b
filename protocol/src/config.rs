//! # Protocol Configuration & Constants
//!
//! Every magic number of the vault lives here. Governance delays, the basis
//! point scale and the allocation queue bound are security parameters:
//! changing one changes what a depositor can rely on, so they are constants
//! and not runtime knobs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Amount, Bps};

// ---------------------------------------------------------------------------
// Ratios
// ---------------------------------------------------------------------------

/// 100% expressed in basis points. The sum of all active debt ratios can
/// never exceed this.
pub const MAX_BPS: Bps = 10_000;

// ---------------------------------------------------------------------------
// Time Lock
// ---------------------------------------------------------------------------

/// One day in seconds.
pub const DAY_SECS: u64 = 24 * 3600;

/// Shortest delay a governance call may be queued with.
pub const MIN_DELAY: u64 = DAY_SECS;

/// Longest delay a governance call may be queued with.
pub const MAX_DELAY: u64 = 30 * DAY_SECS;

/// Window after `eta` during which a queued call stays executable.
pub const GRACE_PERIOD: u64 = 14 * DAY_SECS;

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Maximum number of strategies in the allocation queue. Bounds the
/// withdrawal pull loop.
pub const MAX_QUEUE: usize = 20;

/// Largest share of a strategy's total assets a single skim moves to the
/// vault. A skim leaves the strategy with at least 99% of its value.
pub const SKIM_MAX_BPS: Bps = 100;

// ---------------------------------------------------------------------------
// Chain Simulation
// ---------------------------------------------------------------------------

/// Seconds per simulated block.
pub const BLOCK_TIME_SECS: u64 = 12;

/// Blocks an account must wait between a deposit and a withdrawal.
pub const DEFAULT_BLOCK_DELAY: u64 = 1;

/// Prometheus namespace used by the node.
pub const METRICS_NAMESPACE: &str = "vault";

// ---------------------------------------------------------------------------
// Deployment Parameters
// ---------------------------------------------------------------------------

/// Errors raised by [`VaultParams::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Block delay must be at least one block.
    #[error("block delay must be > 0")]
    ZeroBlockDelay,

    /// The governance delay falls outside `[MIN_DELAY, MAX_DELAY]`.
    #[error("time lock delay {delay}s outside [{min}s, {max}s]")]
    DelayOutOfRange {
        /// Configured delay.
        delay: u64,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },
}

/// Deployment-time parameters for a vault and its governance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultParams {
    /// Maximum total assets the vault accepts.
    pub deposit_limit: Amount,
    /// Deposit/withdraw cooldown in blocks.
    pub block_delay: u64,
    /// Unpause the vault as part of bootstrap.
    pub start_unpaused: bool,
    /// Delay used when queueing bootstrap handoffs.
    pub time_lock_delay: u64,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            deposit_limit: Amount::MAX,
            block_delay: DEFAULT_BLOCK_DELAY,
            start_unpaused: true,
            time_lock_delay: MIN_DELAY,
        }
    }
}

impl VaultParams {
    /// Checks the parameters against protocol bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_delay == 0 {
            return Err(ConfigError::ZeroBlockDelay);
        }
        if !(MIN_DELAY..=MAX_DELAY).contains(&self.time_lock_delay) {
            return Err(ConfigError::DelayOutOfRange {
                delay: self.time_lock_delay,
                min: MIN_DELAY,
                max: MAX_DELAY,
            });
        }
        Ok(())
    }
}
