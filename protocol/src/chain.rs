//! # Simulated Chain Clock
//!
//! Components never read wall-clock time. Each call receives a
//! [`CallContext`] carrying the caller, the block timestamp and the block
//! number, and a [`Chain`] produces those contexts while tests and the
//! simulator advance time explicitly.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::BLOCK_TIME_SECS;
use crate::types::Address;

/// Caller identity and block environment of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// The account or component invoking the operation.
    pub caller: Address,
    /// Block timestamp in unix seconds.
    pub timestamp: u64,
    /// Block number.
    pub block: u64,
}

impl CallContext {
    /// Same block environment, different caller. Used when a component calls
    /// into another one.
    pub fn with_caller(&self, caller: Address) -> Self {
        Self { caller, ..*self }
    }
}

/// A monotonically advancing block clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    timestamp: u64,
    block: u64,
}

impl Chain {
    /// Starts a chain at `genesis_timestamp`, block 1.
    pub fn new(genesis_timestamp: u64) -> Self {
        Self {
            timestamp: genesis_timestamp,
            block: 1,
        }
    }

    /// Starts a chain at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now().timestamp().max(0) as u64)
    }

    /// Current block timestamp.
    pub fn now(&self) -> u64 {
        self.timestamp
    }

    /// Current block number.
    pub fn block_number(&self) -> u64 {
        self.block
    }

    /// Builds the context for a call made by `caller` in the current block.
    pub fn ctx(&self, caller: Address) -> CallContext {
        CallContext {
            caller,
            timestamp: self.timestamp,
            block: self.block,
        }
    }

    /// Advances time by `secs` and mines one block.
    pub fn sleep(&mut self, secs: u64) {
        self.timestamp = self.timestamp.saturating_add(secs);
        self.block = self.block.saturating_add(1);
    }

    /// Mines `blocks` blocks, [`BLOCK_TIME_SECS`] apart.
    pub fn mine(&mut self, blocks: u64) {
        self.block = self.block.saturating_add(blocks);
        self.timestamp = self
            .timestamp
            .saturating_add(blocks.saturating_mul(BLOCK_TIME_SECS));
    }
}
