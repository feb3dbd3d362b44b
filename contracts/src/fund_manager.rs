//! # Fund Manager
//!
//! The allocator between the vault's idle reserve and its strategies. It
//! keeps, per strategy, a debt ratio (the share of total vault assets the
//! strategy may borrow) and the debt actually outstanding, and it is the only
//! component that moves funds between the reserve and strategy adapters.
//!
//! ## Accounting
//!
//! ```text
//! total_assets  = idle + total_debt
//! entitlement   = total_assets × debt_ratio / MAX_BPS
//! max_borrow    = min(entitlement − debt, idle, max_debt_per_harvest)
//! outstanding   = debt − entitlement            (when over-entitled)
//! ```
//!
//! Invariants maintained after every call:
//!
//! - `Σ debt_ratio(active) = total_debt_ratio ≤ MAX_BPS`
//! - `Σ debt = total_debt`
//! - the queue holds exactly the active strategies, each once
//!
//! ## Reports
//!
//! A strategy reports `(gain, loss, debt_payment)`. Loss is written off its
//! debt first and its ratio shrinks by the loss's share of total debt, so the
//! shortfall shows up in the vault's valuation instead of being carried as
//! phantom debt. The gain plus the debt payment is then pulled back to the
//! reserve as far as the strategy's liquid balance allows.
//!
//! Privileged configuration is reserved for the admin and the time lock;
//! approving a strategy is time-lock only.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use vault_protocol::config::{MAX_BPS, MAX_QUEUE, SKIM_MAX_BPS};
use vault_protocol::{Address, Amount, Bps, CallContext};

use crate::access::{ensure_any, AccessError, AdminHandoff, Role};
use crate::error::{CallFailure, ErrorKind};
use crate::events::{Event, EventLog, ReportEvent};
use crate::math::{self, MathError};
use crate::reserve::{Reserve, ReserveError};
use crate::strategy::{StrategyAdapter, StrategyError};
use crate::timelock::Governable;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during allocator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundManagerError {
    /// Role check or handoff failed.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Checked arithmetic failed.
    #[error(transparent)]
    Math(#[from] MathError),

    /// Idle reserve could not cover a movement.
    #[error(transparent)]
    Reserve(#[from] ReserveError),

    /// A strategy adapter rejected a call.
    #[error("strategy {strategy} failed: {source}")]
    Strategy {
        /// Strategy address.
        strategy: Address,
        /// Adapter error.
        source: StrategyError,
    },

    /// No adapter has been attached at this address.
    #[error("unknown strategy {0}")]
    UnknownStrategy(Address),

    /// An adapter is already attached at this address.
    #[error("strategy {0} already attached")]
    AlreadyAttached(Address),

    /// The strategy was built for another vault.
    #[error("strategy vault {actual} != {expected}")]
    VaultMismatch {
        /// This allocator's vault.
        expected: Address,
        /// The strategy's vault.
        actual: Address,
    },

    /// The strategy holds another asset.
    #[error("strategy token {actual} != {expected}")]
    TokenMismatch {
        /// This allocator's token.
        expected: Address,
        /// The strategy's token.
        actual: Address,
    },

    /// Strategy is already approved.
    #[error("strategy {0} already approved")]
    AlreadyApproved(Address),

    /// Strategy is not approved.
    #[error("strategy {0} not approved")]
    NotApproved(Address),

    /// Strategy is already in the queue.
    #[error("strategy {0} already active")]
    AlreadyActive(Address),

    /// Strategy is not in the queue.
    #[error("strategy {0} not active")]
    NotActive(Address),

    /// Queue holds [`MAX_QUEUE`] strategies already.
    #[error("queue full ({max} strategies)")]
    QueueFull {
        /// Queue capacity.
        max: usize,
    },

    /// Insert position past the end of the queue.
    #[error("queue position {position} out of range (len {len})")]
    PositionOutOfRange {
        /// Requested position.
        position: usize,
        /// Current queue length.
        len: usize,
    },

    /// Proposed order is not a permutation of the queue.
    #[error("new queue order is not a permutation of the current queue")]
    NotPermutation,

    /// `min_debt_per_harvest > max_debt_per_harvest`.
    #[error("invalid harvest bounds: min {min} > max {max}")]
    InvalidHarvestBounds {
        /// Minimum borrow per harvest.
        min: Amount,
        /// Maximum borrow per harvest.
        max: Amount,
    },

    /// Ratio change would push the total above [`MAX_BPS`].
    #[error("total debt ratio {total} > {max}")]
    DebtRatioExceeded {
        /// Resulting total.
        total: Bps,
        /// Limit.
        max: Bps,
    },

    /// Strategy still owes the vault.
    #[error("strategy {strategy} has outstanding debt {debt}")]
    OutstandingDebt {
        /// Strategy address.
        strategy: Address,
        /// Remaining debt.
        debt: Amount,
    },

    /// Reported loss exceeds recorded debt.
    #[error("loss {loss} > debt {debt}")]
    LossExceedsDebt {
        /// Reported loss.
        loss: Amount,
        /// Recorded debt.
        debt: Amount,
    },

    /// Reported gain exceeds the strategy's liquid balance.
    #[error("gain {gain} > liquid balance {liquid}")]
    GainExceedsLiquid {
        /// Reported gain.
        gain: Amount,
        /// Strategy liquid balance.
        liquid: Amount,
    },

    /// Debt payment exceeds what remains after the loss.
    #[error("debt payment {payment} > remaining debt {remaining}")]
    DebtPaymentExceedsDebt {
        /// Requested payment.
        payment: Amount,
        /// Debt after the loss.
        remaining: Amount,
    },

    /// Borrow capacity below the caller's minimum.
    #[error("borrow {borrow} < min {min_out}")]
    BorrowBelowMinimum {
        /// Amount that could be borrowed.
        borrow: Amount,
        /// Minimum the caller accepts.
        min_out: Amount,
    },
}

impl FundManagerError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Access(err) => err.kind(),
            Self::Math(err) => err.kind(),
            Self::Reserve(err) => err.kind(),
            Self::Strategy { source, .. } => source.kind(),
            Self::UnknownStrategy(_)
            | Self::VaultMismatch { .. }
            | Self::TokenMismatch { .. }
            | Self::PositionOutOfRange { .. }
            | Self::NotPermutation
            | Self::InvalidHarvestBounds { .. }
            | Self::DebtRatioExceeded { .. }
            | Self::LossExceedsDebt { .. }
            | Self::GainExceedsLiquid { .. }
            | Self::DebtPaymentExceedsDebt { .. }
            | Self::BorrowBelowMinimum { .. } => ErrorKind::Parameter,
            Self::AlreadyAttached(_)
            | Self::AlreadyApproved(_)
            | Self::NotApproved(_)
            | Self::AlreadyActive(_)
            | Self::NotActive(_)
            | Self::QueueFull { .. }
            | Self::OutstandingDebt { .. } => ErrorKind::State,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Allocator bookkeeping for one strategy. Never deleted once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// Approved by the time lock.
    pub approved: bool,
    /// In the allocation queue.
    pub active: bool,
    /// Share of total assets the strategy may borrow.
    pub debt_ratio: Bps,
    /// Amount currently lent to the strategy.
    pub debt: Amount,
    /// Smallest fresh borrow worth making on a report.
    pub min_debt_per_harvest: Amount,
    /// Largest borrow per call.
    pub max_debt_per_harvest: Amount,
    /// Cumulative realized gain.
    pub total_gain: Amount,
    /// Cumulative realized loss.
    pub total_loss: Amount,
    /// Timestamp of the last report.
    pub last_report: u64,
}

/// Arguments of a strategy report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Realized gain, held as liquid balance.
    pub gain: Amount,
    /// Realized loss.
    pub loss: Amount,
    /// Debt repaid out of the liquid balance.
    pub debt_payment: Amount,
    /// Borrow again if there is room.
    pub borrow: bool,
}

/// Result of pulling funds back for a vault withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recovery {
    /// Amount credited to the reserve.
    pub recovered: Amount,
    /// Debt the visited strategies could no longer back, written off as
    /// loss.
    pub loss: Amount,
}

/// Governance calls the time lock can dispatch to a fund manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundManagerCall {
    ApproveStrategy { strategy: Address },
    RevokeStrategy { strategy: Address },
    AddStrategyToQueue { strategy: Address, position: u64, min: Amount, max: Amount },
    RemoveStrategyFromQueue { strategy: Address },
    SetQueue { queue: Vec<Address> },
    SetDebtRatio { strategy: Address, debt_ratio: Bps },
    SetHarvestBounds { strategy: Address, min: Amount, max: Amount },
    SetKeeper { keeper: Address },
    SetNextAdmin { candidate: Address },
    SetNextTimeLock { candidate: Address },
    AcceptTimeLock,
}

impl FundManagerCall {
    /// Encodes the call as a time-lock payload.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
}

#[derive(Debug, Clone, Default)]
struct Ledger {
    records: HashMap<Address, StrategyRecord>,
    queue: Vec<Address>,
    total_debt_ratio: Bps,
    total_debt: Amount,
}

// ---------------------------------------------------------------------------
// FundManager
// ---------------------------------------------------------------------------

/// Strategy registry and debt ledger for one vault.
#[derive(Debug)]
pub struct FundManager {
    address: Address,
    vault: Address,
    token: Address,
    admin: AdminHandoff,
    time_lock: AdminHandoff,
    keeper: Address,
    ledger: Ledger,
    adapters: HashMap<Address, Box<dyn StrategyAdapter>>,
    events: EventLog,
}

impl FundManager {
    /// Deploys an allocator for `vault` and `token`. The deployer holds the
    /// admin, time-lock and keeper roles until they are handed off.
    pub fn new(address: Address, vault: Address, token: Address, deployer: Address) -> Self {
        Self {
            address,
            vault,
            token,
            admin: AdminHandoff::new(Role::Admin, deployer),
            time_lock: AdminHandoff::new(Role::TimeLock, deployer),
            keeper: deployer,
            ledger: Ledger::default(),
            adapters: HashMap::new(),
            events: EventLog::new(),
        }
    }

    // -- views --------------------------------------------------------------

    /// Deployment address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Vault this allocator serves.
    pub fn vault(&self) -> Address {
        self.vault
    }

    /// Underlying asset.
    pub fn token(&self) -> Address {
        self.token
    }

    /// Current admin.
    pub fn admin(&self) -> Address {
        self.admin.current()
    }

    /// Current time lock.
    pub fn time_lock(&self) -> Address {
        self.time_lock.current()
    }

    /// Time-lock candidate awaiting acceptance.
    pub fn next_time_lock(&self) -> Option<Address> {
        self.time_lock.pending()
    }

    /// Current keeper.
    pub fn keeper(&self) -> Address {
        self.keeper
    }

    /// Record for `strategy`, if it was ever approved.
    pub fn strategy(&self, strategy: &Address) -> Option<&StrategyRecord> {
        self.ledger.records.get(strategy)
    }

    /// Adapter attached at `strategy`.
    pub fn adapter(&self, strategy: &Address) -> Option<&dyn StrategyAdapter> {
        self.adapters.get(strategy).map(|adapter| &**adapter)
    }

    /// Strategies in allocation order.
    pub fn queue(&self) -> &[Address] {
        &self.ledger.queue
    }

    /// Position of `strategy` in the queue.
    pub fn queue_position(&self, strategy: &Address) -> Option<usize> {
        self.ledger.queue.iter().position(|s| s == strategy)
    }

    /// Sum of active debt ratios.
    pub fn total_debt_ratio(&self) -> Bps {
        self.ledger.total_debt_ratio
    }

    /// Sum of strategy debts.
    pub fn total_debt(&self) -> Amount {
        self.ledger.total_debt
    }

    /// Recomputes the ratio sum from the records.
    pub fn debt_ratio_sum(&self) -> Bps {
        self.ledger
            .records
            .values()
            .filter(|record| record.active)
            .map(|record| record.debt_ratio)
            .sum()
    }

    /// Value held by active strategies, as they report it.
    pub fn strategy_assets(&self) -> Amount {
        self.ledger
            .queue
            .iter()
            .filter_map(|s| self.adapters.get(s))
            .map(|adapter| adapter.total_assets())
            .fold(0, Amount::saturating_add)
    }

    /// Drains emitted events.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take()
    }

    /// Verifies the ledger invariants. Returns a description of the first
    /// violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let ratio_sum = self.debt_ratio_sum();
        if ratio_sum != self.ledger.total_debt_ratio {
            return Err(format!(
                "ratio sum {ratio_sum} != total {}",
                self.ledger.total_debt_ratio
            ));
        }
        if ratio_sum > MAX_BPS {
            return Err(format!("total debt ratio {ratio_sum} > {MAX_BPS}"));
        }
        let debt_sum = self
            .ledger
            .records
            .values()
            .fold(0, |acc: Amount, record| acc.saturating_add(record.debt));
        if debt_sum != self.ledger.total_debt {
            return Err(format!(
                "debt sum {debt_sum} != total {}",
                self.ledger.total_debt
            ));
        }
        let unique: HashSet<_> = self.ledger.queue.iter().collect();
        let active = self.ledger.records.values().filter(|r| r.active).count();
        if unique.len() != self.ledger.queue.len() || active != self.ledger.queue.len() {
            return Err("queue does not match active strategies".into());
        }
        Ok(())
    }

    // -- borrow capacity ----------------------------------------------------

    fn entitlement(&self, debt_ratio: Bps, idle: Amount) -> Result<Amount, FundManagerError> {
        let total_assets = math::add(idle, self.ledger.total_debt)?;
        Ok(math::bps_of(total_assets, debt_ratio)?)
    }

    /// How much `strategy` may borrow right now given `idle` reserve.
    ///
    /// Zero for unknown or inactive strategies and for strategies at or over
    /// their entitlement.
    pub fn calc_max_borrow(
        &self,
        strategy: &Address,
        idle: Amount,
    ) -> Result<Amount, FundManagerError> {
        let Some(record) = self.ledger.records.get(strategy).filter(|r| r.active) else {
            return Ok(0);
        };
        let entitlement = self.entitlement(record.debt_ratio, idle)?;
        if record.debt >= entitlement {
            return Ok(0);
        }
        Ok((entitlement - record.debt)
            .min(idle)
            .min(record.max_debt_per_harvest))
    }

    /// Debt `strategy` carries above its entitlement.
    pub fn calc_outstanding_debt(
        &self,
        strategy: &Address,
        idle: Amount,
    ) -> Result<Amount, FundManagerError> {
        let Some(record) = self.ledger.records.get(strategy) else {
            return Ok(0);
        };
        let entitlement = self.entitlement(record.debt_ratio, idle)?;
        Ok(record.debt.saturating_sub(entitlement))
    }

    // -- registry -----------------------------------------------------------

    /// Stages an adapter so governance can approve it by address.
    pub fn attach_strategy(
        &mut self,
        adapter: Box<dyn StrategyAdapter>,
    ) -> Result<Address, FundManagerError> {
        let strategy = adapter.address();
        if self.adapters.contains_key(&strategy) {
            return Err(FundManagerError::AlreadyAttached(strategy));
        }
        self.adapters.insert(strategy, adapter);
        Ok(strategy)
    }

    /// Approves an attached strategy. Time lock only.
    ///
    /// # Errors
    ///
    /// Returns [`FundManagerError::VaultMismatch`] or
    /// [`FundManagerError::TokenMismatch`] if the adapter was built for
    /// another vault or asset, and [`FundManagerError::AlreadyApproved`] on a
    /// second approval.
    pub fn approve_strategy(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
    ) -> Result<(), FundManagerError> {
        self.time_lock.ensure(&ctx.caller)?;

        let adapter = self
            .adapters
            .get(&strategy)
            .ok_or(FundManagerError::UnknownStrategy(strategy))?;
        if adapter.vault() != self.vault {
            return Err(FundManagerError::VaultMismatch {
                expected: self.vault,
                actual: adapter.vault(),
            });
        }
        if adapter.token() != self.token {
            return Err(FundManagerError::TokenMismatch {
                expected: self.token,
                actual: adapter.token(),
            });
        }

        let record = self.ledger.records.entry(strategy).or_default();
        if record.approved {
            return Err(FundManagerError::AlreadyApproved(strategy));
        }
        record.approved = true;

        info!(%strategy, "strategy approved");
        self.events.emit(Event::ApproveStrategy { strategy });
        Ok(())
    }

    /// Withdraws approval from an inactive strategy.
    pub fn revoke_strategy(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
    ) -> Result<(), FundManagerError> {
        self.ensure_governance(&ctx.caller)?;
        let record = self.approved_mut(&strategy)?;
        if record.active {
            return Err(FundManagerError::AlreadyActive(strategy));
        }
        record.approved = false;

        info!(%strategy, "strategy revoked");
        self.events.emit(Event::RevokeStrategy { strategy });
        Ok(())
    }

    /// Activates an approved strategy at `position` in the queue.
    pub fn add_strategy_to_queue(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
        position: usize,
        min_debt_per_harvest: Amount,
        max_debt_per_harvest: Amount,
    ) -> Result<(), FundManagerError> {
        self.ensure_governance(&ctx.caller)?;

        let len = self.ledger.queue.len();
        if len >= MAX_QUEUE {
            return Err(FundManagerError::QueueFull { max: MAX_QUEUE });
        }
        if position > len {
            return Err(FundManagerError::PositionOutOfRange { position, len });
        }
        if min_debt_per_harvest > max_debt_per_harvest {
            return Err(FundManagerError::InvalidHarvestBounds {
                min: min_debt_per_harvest,
                max: max_debt_per_harvest,
            });
        }

        let record = self.approved_mut(&strategy)?;
        if record.active {
            return Err(FundManagerError::AlreadyActive(strategy));
        }
        record.active = true;
        record.min_debt_per_harvest = min_debt_per_harvest;
        record.max_debt_per_harvest = max_debt_per_harvest;
        self.ledger.queue.insert(position, strategy);

        info!(%strategy, position, "strategy added to queue");
        self.events
            .emit(Event::AddStrategyToQueue { strategy, position });
        Ok(())
    }

    /// Deactivates a strategy that no longer owes anything. Its ratio is
    /// released.
    pub fn remove_strategy_from_queue(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
    ) -> Result<(), FundManagerError> {
        self.ensure_governance(&ctx.caller)?;

        let record = self.active_mut(&strategy)?;
        if record.debt > 0 {
            return Err(FundManagerError::OutstandingDebt {
                strategy,
                debt: record.debt,
            });
        }
        let released = record.debt_ratio;
        record.debt_ratio = 0;
        record.active = false;
        self.ledger.total_debt_ratio -= released;
        self.ledger.queue.retain(|s| *s != strategy);

        info!(%strategy, "strategy removed from queue");
        self.events.emit(Event::RemoveStrategyFromQueue { strategy });
        Ok(())
    }

    /// Reorders the queue. `order` must contain exactly the current entries.
    pub fn set_queue(
        &mut self,
        ctx: &CallContext,
        order: Vec<Address>,
    ) -> Result<(), FundManagerError> {
        self.ensure_governance(&ctx.caller)?;

        let current: HashSet<_> = self.ledger.queue.iter().collect();
        let proposed: HashSet<_> = order.iter().collect();
        if order.len() != self.ledger.queue.len()
            || proposed.len() != order.len()
            || proposed != current
        {
            return Err(FundManagerError::NotPermutation);
        }
        self.ledger.queue = order.clone();

        self.events.emit(Event::SetQueue { queue: order });
        Ok(())
    }

    /// Sets the debt ratio of an active strategy.
    ///
    /// # Errors
    ///
    /// Returns [`FundManagerError::DebtRatioExceeded`] if the resulting total
    /// would exceed [`MAX_BPS`].
    pub fn set_debt_ratio(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
        debt_ratio: Bps,
    ) -> Result<(), FundManagerError> {
        self.ensure_governance(&ctx.caller)?;

        let previous = self.active_mut(&strategy)?.debt_ratio;
        let total = (self.ledger.total_debt_ratio - previous).saturating_add(debt_ratio);
        if total > MAX_BPS {
            return Err(FundManagerError::DebtRatioExceeded {
                total,
                max: MAX_BPS,
            });
        }
        self.active_mut(&strategy)?.debt_ratio = debt_ratio;
        self.ledger.total_debt_ratio = total;

        info!(%strategy, debt_ratio, total_debt_ratio = total, "debt ratio set");
        self.events.emit(Event::SetDebtRatio {
            strategy,
            debt_ratio,
            total_debt_ratio: total,
        });
        Ok(())
    }

    /// Sets the per-call borrow bounds of an approved strategy.
    pub fn set_harvest_bounds(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
        min: Amount,
        max: Amount,
    ) -> Result<(), FundManagerError> {
        self.ensure_governance(&ctx.caller)?;
        if min > max {
            return Err(FundManagerError::InvalidHarvestBounds { min, max });
        }
        let record = self.approved_mut(&strategy)?;
        record.min_debt_per_harvest = min;
        record.max_debt_per_harvest = max;

        self.events
            .emit(Event::SetHarvestBounds { strategy, min, max });
        Ok(())
    }

    /// Replaces the keeper.
    pub fn set_keeper(&mut self, ctx: &CallContext, keeper: Address) -> Result<(), FundManagerError> {
        self.ensure_governance(&ctx.caller)?;
        self.keeper = keeper;
        self.events.emit(Event::SetKeeper { keeper });
        Ok(())
    }

    // -- role handoffs ------------------------------------------------------

    /// Proposes a new admin. Admin only.
    pub fn set_next_admin(
        &mut self,
        ctx: &CallContext,
        candidate: Address,
    ) -> Result<(), FundManagerError> {
        self.admin.ensure(&ctx.caller)?;
        self.admin.propose(candidate)?;
        self.events.emit(Event::SetNextAdmin { candidate });
        Ok(())
    }

    /// Completes an admin handoff. Candidate only.
    pub fn accept_admin(&mut self, ctx: &CallContext) -> Result<(), FundManagerError> {
        let admin = self.admin.accept(&ctx.caller)?;
        info!(%admin, "fund manager admin accepted");
        self.events.emit(Event::AcceptAdmin { admin });
        Ok(())
    }

    /// Proposes a new time lock. Current time lock only.
    pub fn set_next_time_lock(
        &mut self,
        ctx: &CallContext,
        candidate: Address,
    ) -> Result<(), FundManagerError> {
        self.time_lock.ensure(&ctx.caller)?;
        self.time_lock.propose(candidate)?;
        self.events.emit(Event::SetNextTimeLock { candidate });
        Ok(())
    }

    /// Completes a time-lock handoff. Candidate only.
    pub fn accept_time_lock(&mut self, ctx: &CallContext) -> Result<(), FundManagerError> {
        let time_lock = self.time_lock.accept(&ctx.caller)?;
        info!(%time_lock, "fund manager time lock accepted");
        self.events.emit(Event::AcceptTimeLock { time_lock });
        Ok(())
    }

    // -- fund movements -----------------------------------------------------

    /// Lends up to `max_in` from the reserve to `strategy`.
    ///
    /// Callable by the strategy itself, the keeper, the admin or the time
    /// lock. Fails if less than `min_out` can be lent.
    pub fn allocate(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
        max_in: Amount,
        min_out: Amount,
        reserve: &mut Reserve,
    ) -> Result<Amount, FundManagerError> {
        ensure_any(
            Role::Keeper,
            &ctx.caller,
            &[strategy, self.keeper, self.admin(), self.time_lock()],
        )?;
        self.active_mut(&strategy)?;

        let borrow = max_in.min(self.calc_max_borrow(&strategy, reserve.balance())?);
        if borrow < min_out {
            return Err(FundManagerError::BorrowBelowMinimum { borrow, min_out });
        }
        if borrow == 0 {
            return Ok(0);
        }

        self.atomically(reserve, |fm, reserve| fm.lend(strategy, borrow, reserve))?;
        info!(%strategy, borrow, "funds allocated");
        Ok(borrow)
    }

    /// Reconciles a report from the calling strategy.
    ///
    /// # Errors
    ///
    /// Rejects the report without any change if the caller is not an active
    /// strategy, if `loss` exceeds its debt, if `gain` exceeds its liquid
    /// balance, or if `debt_payment` exceeds the debt left after the loss.
    pub fn report(
        &mut self,
        ctx: &CallContext,
        request: ReportRequest,
        reserve: &mut Reserve,
    ) -> Result<ReportEvent, FundManagerError> {
        let strategy = ctx.caller;
        let record = match self.ledger.records.get(&strategy) {
            Some(record) if record.active => *record,
            _ => {
                return Err(AccessError::Unauthorized {
                    role: Role::Strategy,
                    caller: strategy,
                }
                .into())
            }
        };
        let liquid = self.adapter_ref(&strategy)?.liquid_balance();

        let ReportRequest {
            gain,
            loss,
            debt_payment,
            borrow,
        } = request;
        if loss > record.debt {
            return Err(FundManagerError::LossExceedsDebt {
                loss,
                debt: record.debt,
            });
        }
        if gain > liquid {
            return Err(FundManagerError::GainExceedsLiquid { gain, liquid });
        }
        let remaining = record.debt - loss;
        if debt_payment > remaining {
            return Err(FundManagerError::DebtPaymentExceedsDebt {
                payment: debt_payment,
                remaining,
            });
        }

        let event = self.atomically(reserve, |fm, reserve| {
            if loss > 0 {
                fm.realize_loss(strategy, loss)?;
            }

            let free = math::add(gain, debt_payment)?.min(liquid);
            let released = fm.pull(strategy, free)?;
            let repaid = released.saturating_sub(gain);
            reserve.credit(released)?;
            fm.settle(strategy, repaid)?;

            let record = fm.record_mut(&strategy)?;
            record.total_gain = math::add(record.total_gain, gain)?;
            record.last_report = ctx.timestamp;

            if borrow {
                fm.fresh_borrow(strategy, reserve)?;
            }

            Ok(ReportEvent {
                gain,
                loss,
                free: released,
                total: fm.adapter_ref(&strategy)?.total_assets(),
                debt: fm.record_mut(&strategy)?.debt,
            })
        })?;

        info!(
            %strategy,
            gain = event.gain,
            loss = event.loss,
            free = event.free,
            total = event.total,
            debt = event.debt,
            "strategy report"
        );
        self.events.emit(Event::Report {
            strategy,
            report: event,
        });
        Ok(event)
    }

    /// Keeper path: asks the adapter what to report and reports on its
    /// behalf.
    pub fn harvest(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
        borrow: bool,
        reserve: &mut Reserve,
    ) -> Result<ReportEvent, FundManagerError> {
        ensure_any(
            Role::Keeper,
            &ctx.caller,
            &[self.keeper, self.admin(), self.time_lock()],
        )?;
        let debt = self.active_mut(&strategy)?.debt;
        let outstanding = self.calc_outstanding_debt(&strategy, reserve.balance())?;

        let report = self
            .adapter_mut(&strategy)?
            .report(debt, outstanding)
            .map_err(|source| FundManagerError::Strategy { strategy, source })?;

        self.report(
            &ctx.with_caller(strategy),
            ReportRequest {
                gain: report.gain,
                loss: report.loss,
                debt_payment: report.debt_payment,
                borrow,
            },
            reserve,
        )
    }

    /// Moves a strategy's surplus above its debt to the reserve, at most
    /// [`SKIM_MAX_BPS`] of the strategy's total assets per call. Debt and
    /// ratios are untouched. Anyone may call this.
    pub fn skim(
        &mut self,
        _ctx: &CallContext,
        strategy: Address,
        reserve: &mut Reserve,
    ) -> Result<Amount, FundManagerError> {
        let debt = self.approved_mut(&strategy)?.debt;
        let total = self.adapter_ref(&strategy)?.total_assets();
        let cap = math::bps_of(total, SKIM_MAX_BPS)?;

        let profit = self.atomically(reserve, |fm, reserve| {
            let profit = fm
                .adapter_mut(&strategy)?
                .skim(debt, cap)
                .map_err(|source| FundManagerError::Strategy { strategy, source })?;
            reserve.credit(profit)?;
            let record = fm.record_mut(&strategy)?;
            record.total_gain = math::add(record.total_gain, profit)?;
            Ok(profit)
        })?;

        info!(%strategy, profit, cap, "strategy skimmed");
        self.events.emit(Event::Skim { strategy, profit });
        Ok(profit)
    }

    /// Pulls up to `amount` back into the reserve, visiting strategies in
    /// queue order. Vault only.
    ///
    /// When a strategy releases less than asked and its remaining assets no
    /// longer cover its remaining debt (exit fees, unreported losses), the
    /// uncovered part is realized as a loss and counts toward `amount`. The
    /// vault charges that loss to the withdrawer. Anything else left short
    /// is missing liquidity and only reduces `recovered`.
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        amount: Amount,
        reserve: &mut Reserve,
    ) -> Result<Recovery, FundManagerError> {
        ensure_any(Role::Vault, &ctx.caller, &[self.vault])?;

        self.atomically(reserve, |fm, reserve| {
            let mut recovery = Recovery::default();
            for strategy in fm.ledger.queue.clone() {
                let covered = math::add(recovery.recovered, recovery.loss)?;
                if covered >= amount {
                    break;
                }
                let debt = fm.record_mut(&strategy)?.debt;
                let want = (amount - covered).min(debt);
                if want == 0 {
                    continue;
                }
                let released = match fm.pull(strategy, want) {
                    Ok(released) => released,
                    Err(err) => {
                        warn!(%strategy, %err, "strategy withdrawal failed, skipping");
                        continue;
                    }
                };
                reserve.credit(released)?;

                // `pull` never returns more than `want`, and `want <= debt`.
                let backing = fm.adapter_ref(&strategy)?.total_assets();
                let unbacked = (debt - released).saturating_sub(backing);
                let loss = (want - released).min(unbacked);
                if loss > 0 {
                    fm.realize_loss(strategy, loss)?;
                }
                fm.settle(strategy, released)?;

                recovery.recovered = math::add(recovery.recovered, released)?;
                recovery.loss = math::add(recovery.loss, loss)?;
            }
            Ok(recovery)
        })
    }

    // -- internals ----------------------------------------------------------

    fn ensure_governance(&self, caller: &Address) -> Result<(), AccessError> {
        ensure_any(Role::Admin, caller, &[self.admin(), self.time_lock()])
    }

    fn record_mut(&mut self, strategy: &Address) -> Result<&mut StrategyRecord, FundManagerError> {
        self.ledger
            .records
            .get_mut(strategy)
            .ok_or(FundManagerError::NotApproved(*strategy))
    }

    fn approved_mut(
        &mut self,
        strategy: &Address,
    ) -> Result<&mut StrategyRecord, FundManagerError> {
        match self.ledger.records.get_mut(strategy) {
            Some(record) if record.approved => Ok(record),
            _ => Err(FundManagerError::NotApproved(*strategy)),
        }
    }

    fn active_mut(&mut self, strategy: &Address) -> Result<&mut StrategyRecord, FundManagerError> {
        match self.ledger.records.get_mut(strategy) {
            Some(record) if record.active => Ok(record),
            _ => Err(FundManagerError::NotActive(*strategy)),
        }
    }

    fn adapter_ref(&self, strategy: &Address) -> Result<&dyn StrategyAdapter, FundManagerError> {
        self.adapter(strategy)
            .ok_or(FundManagerError::UnknownStrategy(*strategy))
    }

    fn adapter_mut(
        &mut self,
        strategy: &Address,
    ) -> Result<&mut Box<dyn StrategyAdapter>, FundManagerError> {
        self.adapters
            .get_mut(strategy)
            .ok_or(FundManagerError::UnknownStrategy(*strategy))
    }

    /// Runs `op`, restoring the ledger, the reserve and the event log if it
    /// fails.
    ///
    /// Adapter state is not restored. Adapter calls inside `op` must come
    /// after every fallible check they depend on, so that only checked
    /// arithmetic overflow after `pull`, `lend` or `skim` can leave an adapter
    /// ahead of the restored ledger.
    fn atomically<T>(
        &mut self,
        reserve: &mut Reserve,
        op: impl FnOnce(&mut Self, &mut Reserve) -> Result<T, FundManagerError>,
    ) -> Result<T, FundManagerError> {
        let ledger = self.ledger.clone();
        let saved_reserve = *reserve;
        let events = self.events.len();

        let result = op(self, reserve);
        if result.is_err() {
            self.ledger = ledger;
            *reserve = saved_reserve;
            self.events.truncate(events);
        }
        result
    }

    /// Moves `amount` from the reserve into `strategy` and records the debt.
    fn lend(
        &mut self,
        strategy: Address,
        amount: Amount,
        reserve: &mut Reserve,
    ) -> Result<(), FundManagerError> {
        let record = self.record_mut(&strategy)?;
        let debt = math::add(record.debt, amount)?;
        let total_debt = math::add(self.ledger.total_debt, amount)?;
        reserve.debit(amount)?;

        self.adapter_mut(&strategy)?
            .deposit(amount)
            .map_err(|source| FundManagerError::Strategy { strategy, source })?;

        self.record_mut(&strategy)?.debt = debt;
        self.ledger.total_debt = total_debt;
        self.events.emit(Event::Borrow { strategy, amount });
        Ok(())
    }

    /// Asks `strategy` to release `amount`; returns what it released.
    fn pull(&mut self, strategy: Address, amount: Amount) -> Result<Amount, FundManagerError> {
        if amount == 0 {
            return Ok(0);
        }
        let released = self
            .adapter_mut(&strategy)?
            .withdraw(amount)
            .map_err(|source| FundManagerError::Strategy { strategy, source })?;
        Ok(released.min(amount))
    }

    /// Writes `repaid` off the strategy's debt.
    fn settle(&mut self, strategy: Address, repaid: Amount) -> Result<(), FundManagerError> {
        if repaid == 0 {
            return Ok(());
        }
        let record = self.record_mut(&strategy)?;
        record.debt = math::sub(record.debt, repaid)?;
        self.ledger.total_debt = math::sub(self.ledger.total_debt, repaid)?;
        self.events.emit(Event::Repay {
            strategy,
            amount: repaid,
        });
        Ok(())
    }

    /// Writes off `loss` and shrinks the strategy's ratio by the loss's share
    /// of total debt.
    fn realize_loss(&mut self, strategy: Address, loss: Amount) -> Result<(), FundManagerError> {
        let total_debt = self.ledger.total_debt;
        let total_ratio = self.ledger.total_debt_ratio;
        let ratio = self.record_mut(&strategy)?.debt_ratio;

        let share = math::mul_div(loss, Amount::from(total_ratio), total_debt)?;
        // Bounded by `ratio`, so it fits in a Bps.
        let ratio_change = share.min(Amount::from(ratio)) as Bps;

        let record = self.record_mut(&strategy)?;
        record.debt = math::sub(record.debt, loss)?;
        record.debt_ratio -= ratio_change;
        record.total_loss = math::add(record.total_loss, loss)?;
        self.ledger.total_debt = math::sub(total_debt, loss)?;
        self.ledger.total_debt_ratio -= ratio_change;

        warn!(%strategy, loss, ratio_change, "strategy loss realized");
        Ok(())
    }

    /// Lends more to `strategy` if there is room and the amount clears its
    /// minimum. A refusing adapter only skips the borrow.
    fn fresh_borrow(
        &mut self,
        strategy: Address,
        reserve: &mut Reserve,
    ) -> Result<(), FundManagerError> {
        let available = self.calc_max_borrow(&strategy, reserve.balance())?;
        let minimum = self.record_mut(&strategy)?.min_debt_per_harvest;
        if available == 0 || available < minimum {
            return Ok(());
        }
        match self.lend(strategy, available, reserve) {
            Err(FundManagerError::Strategy { source, .. }) => {
                warn!(%strategy, %source, "strategy refused fresh borrow");
                Ok(())
            }
            other => other,
        }
    }

    fn apply(&mut self, ctx: &CallContext, call: FundManagerCall) -> Result<(), FundManagerError> {
        match call {
            FundManagerCall::ApproveStrategy { strategy } => self.approve_strategy(ctx, strategy),
            FundManagerCall::RevokeStrategy { strategy } => self.revoke_strategy(ctx, strategy),
            FundManagerCall::AddStrategyToQueue {
                strategy,
                position,
                min,
                max,
            } => {
                let position = usize::try_from(position).unwrap_or(usize::MAX);
                self.add_strategy_to_queue(ctx, strategy, position, min, max)
            }
            FundManagerCall::RemoveStrategyFromQueue { strategy } => {
                self.remove_strategy_from_queue(ctx, strategy)
            }
            FundManagerCall::SetQueue { queue } => self.set_queue(ctx, queue),
            FundManagerCall::SetDebtRatio {
                strategy,
                debt_ratio,
            } => self.set_debt_ratio(ctx, strategy, debt_ratio),
            FundManagerCall::SetHarvestBounds { strategy, min, max } => {
                self.set_harvest_bounds(ctx, strategy, min, max)
            }
            FundManagerCall::SetKeeper { keeper } => self.set_keeper(ctx, keeper),
            FundManagerCall::SetNextAdmin { candidate } => self.set_next_admin(ctx, candidate),
            FundManagerCall::SetNextTimeLock { candidate } => {
                self.set_next_time_lock(ctx, candidate)
            }
            FundManagerCall::AcceptTimeLock => self.accept_time_lock(ctx),
        }
    }
}

impl Governable for FundManager {
    fn address(&self) -> Address {
        self.address
    }

    fn dispatch(
        &mut self,
        ctx: &CallContext,
        value: Amount,
        payload: &[u8],
    ) -> Result<(), CallFailure> {
        if value != 0 {
            return Err(CallFailure::value_not_accepted(value));
        }
        let call: FundManagerCall =
            bincode::deserialize(payload).map_err(CallFailure::malformed)?;
        self.apply(ctx, call)
            .map_err(|err| CallFailure::new(err.kind(), err))
    }
}
