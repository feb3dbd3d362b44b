//! # Strategy Adapters
//!
//! A strategy borrows idle capital from the allocator and puts it to work
//! somewhere else. How it earns yield is its own business; the allocator
//! only drives it through [`StrategyAdapter`]:
//!
//! - `deposit` hands borrowed funds to the strategy,
//! - `withdraw` asks for funds back and returns what was actually released,
//! - `report` computes gain, loss and the debt payment it can make, freeing
//!   liquidity for them,
//! - `skim` releases surplus above the recorded debt, up to a cap.
//!
//! An adapter that returns `Err` must leave its own state untouched.
//!
//! [`HoldStrategy`] is the reference adapter: it keeps a liquid balance and
//! supplies the rest to a [`YieldPool`], a shared handle the simulator and
//! tests use to accrue yield, slash principal or charge an exit fee.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vault_protocol::config::MAX_BPS;
use vault_protocol::{Address, Amount, Bps};

use crate::error::ErrorKind;
use crate::math;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by strategy adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// Nothing above the recorded debt to skim.
    #[error("no surplus: total assets {total}, debt {debt}")]
    NoSurplus {
        /// Strategy total assets.
        total: Amount,
        /// Debt recorded by the allocator.
        debt: Amount,
    },

    /// The yield source cannot cover the request.
    #[error("pool shortfall: requested {requested}, available {available}")]
    PoolShortfall {
        /// Amount requested.
        requested: Amount,
        /// Amount held by the pool.
        available: Amount,
    },

    /// Exit fee above 100%.
    #[error("invalid exit fee: {0} bps")]
    InvalidFee(Bps),

    /// Balance arithmetic overflowed.
    #[error("strategy balance overflow")]
    Overflow,
}

impl StrategyError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StrategyError::NoSurplus { .. } | StrategyError::PoolShortfall { .. } => {
                ErrorKind::State
            }
            StrategyError::InvalidFee(_) => ErrorKind::Parameter,
            StrategyError::Overflow => ErrorKind::Arithmetic,
        }
    }
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// What a strategy tells the allocator when it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrategyReport {
    /// Assets above recorded debt, available as liquid balance.
    pub gain: Amount,
    /// Shortfall below recorded debt.
    pub loss: Amount,
    /// Debt the strategy is ready to repay out of its liquid balance.
    pub debt_payment: Amount,
}

/// Capability the allocator drives.
pub trait StrategyAdapter: std::fmt::Debug + Send {
    /// Strategy address.
    fn address(&self) -> Address;

    /// Vault this strategy was built for.
    fn vault(&self) -> Address;

    /// Underlying asset.
    fn token(&self) -> Address;

    /// Everything the strategy controls, valued in the underlying asset.
    fn total_assets(&self) -> Amount;

    /// Portion of [`total_assets`](Self::total_assets) transferable right now.
    fn liquid_balance(&self) -> Amount;

    /// Receives `amount` of borrowed funds.
    fn deposit(&mut self, amount: Amount) -> Result<(), StrategyError>;

    /// Releases up to `amount`, returning what was actually released.
    fn withdraw(&mut self, amount: Amount) -> Result<Amount, StrategyError>;

    /// Computes the report for a strategy carrying `debt`, of which
    /// `outstanding` is over its entitlement, and frees liquidity for the
    /// gain and debt payment.
    fn report(&mut self, debt: Amount, outstanding: Amount)
        -> Result<StrategyReport, StrategyError>;

    /// Releases the surplus above `debt`, at most `max`, returning the
    /// amount released.
    fn skim(&mut self, debt: Amount, max: Amount) -> Result<Amount, StrategyError> {
        let total = self.total_assets();
        let surplus = total.saturating_sub(debt).min(max);
        if surplus == 0 {
            return Err(StrategyError::NoSurplus { total, debt });
        }
        self.withdraw(surplus)
    }
}

// ---------------------------------------------------------------------------
// YieldPool
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PoolBook {
    balance: Amount,
    exit_fee_bps: Bps,
}

/// Shared handle to a toy yield source.
#[derive(Debug, Clone, Default)]
pub struct YieldPool {
    inner: Arc<Mutex<PoolBook>>,
}

impl YieldPool {
    /// An empty pool with no exit fee.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance credited to the depositor.
    pub fn balance(&self) -> Amount {
        self.inner.lock().balance
    }

    /// Current exit fee.
    pub fn exit_fee_bps(&self) -> Bps {
        self.inner.lock().exit_fee_bps
    }

    /// Charges `bps` on every redemption.
    pub fn set_exit_fee(&self, bps: Bps) -> Result<(), StrategyError> {
        if bps > MAX_BPS {
            return Err(StrategyError::InvalidFee(bps));
        }
        self.inner.lock().exit_fee_bps = bps;
        Ok(())
    }

    /// Adds yield.
    pub fn accrue(&self, amount: Amount) -> Result<(), StrategyError> {
        let mut book = self.inner.lock();
        book.balance = book
            .balance
            .checked_add(amount)
            .ok_or(StrategyError::Overflow)?;
        Ok(())
    }

    /// Destroys principal. Returns the amount actually lost.
    pub fn slash(&self, amount: Amount) -> Amount {
        let mut book = self.inner.lock();
        let lost = amount.min(book.balance);
        book.balance -= lost;
        lost
    }

    fn supply(&self, amount: Amount) -> Result<(), StrategyError> {
        self.accrue(amount)
    }

    /// Redeems `amount` of pool balance; returns the amount net of the exit
    /// fee.
    fn redeem(&self, amount: Amount) -> Result<Amount, StrategyError> {
        let mut book = self.inner.lock();
        if amount > book.balance {
            return Err(StrategyError::PoolShortfall {
                requested: amount,
                available: book.balance,
            });
        }
        let fee = math::bps_of(amount, book.exit_fee_bps).map_err(|_| StrategyError::Overflow)?;
        book.balance -= amount;
        Ok(amount - fee)
    }
}

// ---------------------------------------------------------------------------
// HoldStrategy
// ---------------------------------------------------------------------------

/// Keeps `buffer_bps` of every deposit liquid and supplies the rest to its
/// pool.
#[derive(Debug, Clone)]
pub struct HoldStrategy {
    address: Address,
    vault: Address,
    token: Address,
    buffer_bps: Bps,
    liquid: Amount,
    pool: YieldPool,
}

impl HoldStrategy {
    /// Creates a strategy for `vault` holding `token`.
    pub fn new(address: Address, vault: Address, token: Address, pool: YieldPool) -> Self {
        Self {
            address,
            vault,
            token,
            buffer_bps: 0,
            liquid: 0,
            pool,
        }
    }

    /// Fraction of each deposit kept liquid.
    pub fn with_buffer(mut self, buffer_bps: Bps) -> Self {
        self.buffer_bps = buffer_bps.min(MAX_BPS);
        self
    }

    /// Handle to the underlying pool.
    pub fn pool(&self) -> &YieldPool {
        &self.pool
    }

    /// Tokens sent straight to the strategy (airdrops, rewards).
    pub fn receive(&mut self, amount: Amount) -> Result<(), StrategyError> {
        self.liquid = self
            .liquid
            .checked_add(amount)
            .ok_or(StrategyError::Overflow)?;
        Ok(())
    }

    /// Moves up to `amount` from the pool into the liquid balance.
    fn unwind(&mut self, amount: Amount) -> Result<(), StrategyError> {
        let amount = amount.min(self.pool.balance());
        if amount == 0 {
            return Ok(());
        }
        let released = self.pool.redeem(amount)?;
        // Redeemed funds came out of the pool, so they fit.
        self.liquid += released;
        Ok(())
    }
}

impl StrategyAdapter for HoldStrategy {
    fn address(&self) -> Address {
        self.address
    }

    fn vault(&self) -> Address {
        self.vault
    }

    fn token(&self) -> Address {
        self.token
    }

    fn total_assets(&self) -> Amount {
        self.liquid.saturating_add(self.pool.balance())
    }

    fn liquid_balance(&self) -> Amount {
        self.liquid
    }

    fn deposit(&mut self, amount: Amount) -> Result<(), StrategyError> {
        let keep = math::bps_of(amount, self.buffer_bps).map_err(|_| StrategyError::Overflow)?;
        let liquid = self
            .liquid
            .checked_add(keep)
            .ok_or(StrategyError::Overflow)?;
        self.pool.supply(amount - keep)?;
        self.liquid = liquid;
        Ok(())
    }

    fn withdraw(&mut self, amount: Amount) -> Result<Amount, StrategyError> {
        if amount > self.liquid {
            self.unwind(amount - self.liquid)?;
        }
        let released = amount.min(self.liquid);
        self.liquid -= released;
        Ok(released)
    }

    fn report(
        &mut self,
        debt: Amount,
        outstanding: Amount,
    ) -> Result<StrategyReport, StrategyError> {
        let profit = self.total_assets().saturating_sub(debt);
        let wanted = profit.saturating_add(outstanding.min(debt));
        if wanted > self.liquid {
            self.unwind(wanted - self.liquid)?;
        }

        // Exit fees may have shrunk the total while unwinding.
        let total = self.total_assets();
        let (gain, loss) = if total >= debt {
            (total - debt, 0)
        } else {
            (0, debt - total)
        };
        let gain = gain.min(self.liquid);
        let debt_payment = outstanding
            .min(self.liquid - gain)
            .min(debt - loss);

        Ok(StrategyReport {
            gain,
            loss,
            debt_payment,
        })
    }
}
