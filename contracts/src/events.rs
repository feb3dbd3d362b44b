//! # Events
//!
//! Every state-changing operation records an [`Event`]. Components keep their
//! own [`EventLog`]; callers drain it with `take_events()` after a call.
//! Events are also logged through `tracing` at debug level as they are
//! emitted.

use serde::{Deserialize, Serialize};
use vault_protocol::{Address, Amount, Bps, TxHash};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome code carried by time-lock `Log` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOutcome {
    /// Entry was queued.
    Queued = 0,
    /// Entry was executed.
    Executed = 1,
    /// Entry was cancelled.
    Cancelled = 2,
}

impl LogOutcome {
    /// Numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Allocator reconciliation summary, emitted on every strategy report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportEvent {
    /// Realized gain.
    pub gain: Amount,
    /// Realized loss.
    pub loss: Amount,
    /// Amount pulled from the strategy back to the vault.
    pub free: Amount,
    /// Strategy total assets after reconciliation.
    pub total: Amount,
    /// Strategy debt after reconciliation.
    pub debt: Amount,
}

/// A recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Time-lock queue, execute or cancel.
    Log {
        tx_hash: TxHash,
        target: Address,
        value: Amount,
        payload: Vec<u8>,
        eta: u64,
        nonce: u64,
        outcome: LogOutcome,
    },
    SetNextAdmin { candidate: Address },
    AcceptAdmin { admin: Address },
    SetNextTimeLock { candidate: Address },
    AcceptTimeLock { time_lock: Address },
    SetGuardian { guardian: Address },
    SetKeeper { keeper: Address },
    SetFundManager { fund_manager: Address },
    SetDepositLimit { limit: Amount },
    SetBlockDelay { blocks: u64 },
    SetWhitelist { account: Address, approved: bool },
    SetPause { paused: bool },
    Deposit { account: Address, amount: Amount, shares: Amount },
    Withdraw { account: Address, shares: Amount, amount: Amount },
    ApproveStrategy { strategy: Address },
    RevokeStrategy { strategy: Address },
    AddStrategyToQueue { strategy: Address, position: usize },
    RemoveStrategyFromQueue { strategy: Address },
    SetQueue { queue: Vec<Address> },
    SetDebtRatio { strategy: Address, debt_ratio: Bps, total_debt_ratio: Bps },
    SetHarvestBounds { strategy: Address, min: Amount, max: Amount },
    Borrow { strategy: Address, amount: Amount },
    Repay { strategy: Address, amount: Amount },
    Report { strategy: Address, report: ReportEvent },
    Skim { strategy: Address, profit: Amount },
}

impl Event {
    /// Variant name, as used in metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Log { .. } => "Log",
            Event::SetNextAdmin { .. } => "SetNextAdmin",
            Event::AcceptAdmin { .. } => "AcceptAdmin",
            Event::SetNextTimeLock { .. } => "SetNextTimeLock",
            Event::AcceptTimeLock { .. } => "AcceptTimeLock",
            Event::SetGuardian { .. } => "SetGuardian",
            Event::SetKeeper { .. } => "SetKeeper",
            Event::SetFundManager { .. } => "SetFundManager",
            Event::SetDepositLimit { .. } => "SetDepositLimit",
            Event::SetBlockDelay { .. } => "SetBlockDelay",
            Event::SetWhitelist { .. } => "SetWhitelist",
            Event::SetPause { .. } => "SetPause",
            Event::Deposit { .. } => "Deposit",
            Event::Withdraw { .. } => "Withdraw",
            Event::ApproveStrategy { .. } => "ApproveStrategy",
            Event::RevokeStrategy { .. } => "RevokeStrategy",
            Event::AddStrategyToQueue { .. } => "AddStrategyToQueue",
            Event::RemoveStrategyFromQueue { .. } => "RemoveStrategyFromQueue",
            Event::SetQueue { .. } => "SetQueue",
            Event::SetDebtRatio { .. } => "SetDebtRatio",
            Event::SetHarvestBounds { .. } => "SetHarvestBounds",
            Event::Borrow { .. } => "Borrow",
            Event::Repay { .. } => "Repay",
            Event::Report { .. } => "Report",
            Event::Skim { .. } => "Skim",
        }
    }
}

/// Append-only buffer of emitted events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `event`.
    pub fn emit(&mut self, event: Event) {
        tracing::debug!(?event, "event");
        self.events.push(event);
    }

    /// Drains every recorded event.
    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Events recorded so far.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of undrained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` if nothing was emitted since the last drain.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops events recorded after `len` (used when rolling back a failed
    /// multi-step operation).
    pub(crate) fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}
