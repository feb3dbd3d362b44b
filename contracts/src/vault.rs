//! # Vault
//!
//! The capital ledger depositors interact with. Deposits mint receipt shares
//! at the current price, withdrawals burn them and pay out of the idle
//! reserve first, then out of strategies through the fund manager.
//!
//! ```text
//! total_assets = idle + fund_manager.total_debt
//! shares_out   = amount × supply / total_assets   (1:1 on the first deposit)
//! amount_out   = shares × total_assets / supply
//! ```
//!
//! ## Roles
//!
//! - **admin** and **time lock**: configuration. Both start as the deployer
//!   and are handed off with a propose/accept pair.
//! - **guardian**: may pause, never unpause.
//!
//! A new vault is paused with a zero deposit limit. Withdrawals stay open
//! while paused.
//!
//! ## Fund manager binding
//!
//! An allocator instance is staged with [`Vault::attach_fund_manager`] and
//! becomes active only through [`Vault::set_fund_manager`], which the time
//! lock calls. The outgoing allocator must have repaid all its debt.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use vault_protocol::{Address, Amount, Bps, CallContext};

use crate::access::{ensure_any, AccessError, AdminHandoff, Role};
use crate::error::{CallFailure, ErrorKind};
use crate::events::{Event, EventLog, ReportEvent};
use crate::fund_manager::{FundManager, FundManagerError, ReportRequest};
use crate::math::{self, MathError};
use crate::receipt::{ReceiptError, ReceiptToken};
use crate::reserve::{Reserve, ReserveError};

/// Number of shares [`Vault::price_per_share`] prices.
pub const PRICE_UNIT: Amount = 1_000_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Role check or handoff failed.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Checked arithmetic failed.
    #[error(transparent)]
    Math(#[from] MathError),

    /// Idle reserve could not cover a movement.
    #[error(transparent)]
    Reserve(#[from] ReserveError),

    /// Receipt token rejected a mint or burn.
    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    /// Allocator call failed.
    #[error(transparent)]
    FundManager(#[from] FundManagerError),

    /// Deposits are paused.
    #[error("vault is paused")]
    Paused,

    /// Zero deposit, zero shares, or a withdrawal worth nothing.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The account acted too recently.
    #[error("{account} must wait until block {next_block}")]
    BlockDelay {
        /// Account that acted.
        account: Address,
        /// First block it may act again.
        next_block: u64,
    },

    /// Deposit would push total assets above the limit.
    #[error("deposit limit exceeded: {total} > {limit}")]
    DepositLimit {
        /// Total assets after the deposit.
        total: Amount,
        /// Current limit.
        limit: Amount,
    },

    /// The deposit is too small to mint a single share.
    #[error("deposit of {amount} mints zero shares")]
    ZeroShares {
        /// Deposited amount.
        amount: Amount,
    },

    /// Shares exist but back nothing, so a price cannot be computed.
    #[error("shares outstanding with zero total assets")]
    ZeroTotalAssets,

    /// Holder owns fewer shares than requested.
    #[error("insufficient shares: balance {balance}, requested {requested}")]
    InsufficientShares {
        /// Holder balance.
        balance: Amount,
        /// Shares requested.
        requested: Amount,
    },

    /// Nothing could be paid out.
    #[error("no liquidity to pay {requested}")]
    NoLiquidity {
        /// Amount owed.
        requested: Amount,
    },

    /// Block delay of zero.
    #[error("block delay must be greater than zero")]
    ZeroBlockDelay,

    /// The guardian tried to unpause.
    #[error("guardian may only pause")]
    GuardianCannotUnpause,

    /// The receipt token is not minted by this vault.
    #[error("receipt token minter {actual} != vault {expected}")]
    ReceiptMinterMismatch {
        /// The vault's address.
        expected: Address,
        /// The token's minter.
        actual: Address,
    },

    /// No fund manager bound.
    #[error("no fund manager")]
    NoFundManager,

    /// A fund manager with this address is already staged or bound.
    #[error("fund manager {0} already attached")]
    FundManagerAttached(Address),

    /// No fund manager staged at this address.
    #[error("fund manager {0} not attached")]
    FundManagerNotAttached(Address),

    /// Candidate is already the bound fund manager.
    #[error("fund manager {0} is already current")]
    SameFundManager(Address),

    /// Candidate manages another asset.
    #[error("fund manager token {actual} != {expected}")]
    TokenMismatch {
        /// Vault token.
        expected: Address,
        /// Candidate's token.
        actual: Address,
    },

    /// Candidate was built for another vault.
    #[error("fund manager vault {actual} != {expected}")]
    VaultMismatch {
        /// This vault.
        expected: Address,
        /// Candidate's vault.
        actual: Address,
    },

    /// The outgoing fund manager still has funds in strategies.
    #[error("outgoing fund manager has debt {debt}")]
    OutgoingDebt {
        /// Outstanding debt.
        debt: Amount,
    },
}

impl VaultError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Access(err) => err.kind(),
            Self::Math(err) => err.kind(),
            Self::Reserve(err) => err.kind(),
            Self::Receipt(err) => err.kind(),
            Self::FundManager(err) => err.kind(),
            Self::GuardianCannotUnpause => ErrorKind::Authorization,
            Self::BlockDelay { .. } => ErrorKind::Timing,
            Self::ZeroAmount
            | Self::DepositLimit { .. }
            | Self::ZeroShares { .. }
            | Self::ZeroBlockDelay
            | Self::ReceiptMinterMismatch { .. }
            | Self::FundManagerNotAttached(_)
            | Self::SameFundManager(_)
            | Self::TokenMismatch { .. }
            | Self::VaultMismatch { .. } => ErrorKind::Parameter,
            Self::Paused
            | Self::ZeroTotalAssets
            | Self::InsufficientShares { .. }
            | Self::NoLiquidity { .. }
            | Self::NoFundManager
            | Self::FundManagerAttached(_)
            | Self::OutgoingDebt { .. } => ErrorKind::State,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Snapshot of the vault's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Underlying asset.
    pub token: Address,
    /// Receipt token.
    pub receipt_token: Address,
    /// Bound fund manager.
    pub fund_manager: Option<Address>,
    /// Sum of active strategy debt ratios.
    pub total_debt_ratio: Bps,
    /// Maximum total assets accepted through deposits.
    pub deposit_limit: Amount,
    /// Deposits paused.
    pub paused: bool,
    /// Blocks an account must wait between actions.
    pub block_delay: u64,
    /// Current admin.
    pub admin: Address,
    /// Current time lock.
    pub time_lock: Address,
    /// Current guardian.
    pub guardian: Address,
}

/// Governance calls the time lock can dispatch to a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultCall {
    SetDepositLimit { limit: Amount },
    SetBlockDelay { blocks: u64 },
    SetWhitelist { account: Address, approved: bool },
    SetGuardian { guardian: Address },
    SetPause { paused: bool },
    SetNextAdmin { candidate: Address },
    SetNextTimeLock { candidate: Address },
    AcceptTimeLock,
    SetFundManager { fund_manager: Address },
}

impl VaultCall {
    /// Encodes the call as a time-lock payload.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Pooled-capital vault over a single asset.
#[derive(Debug)]
pub struct Vault {
    address: Address,
    token: Address,
    receipt: Box<dyn ReceiptToken>,
    reserve: Reserve,
    admin: AdminHandoff,
    time_lock: AdminHandoff,
    guardian: Address,
    deposit_limit: Amount,
    paused: bool,
    block_delay: u64,
    last_action: HashMap<Address, u64>,
    whitelist: HashSet<Address>,
    fund_manager: Option<FundManager>,
    staged: HashMap<Address, FundManager>,
    events: EventLog,
}

impl Vault {
    /// Deploys a paused vault with a zero deposit limit. The deployer holds
    /// the admin, time-lock and guardian roles.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::ReceiptMinterMismatch`] unless `receipt` is
    /// minted by `address`.
    pub fn new(
        address: Address,
        token: Address,
        receipt: Box<dyn ReceiptToken>,
        deployer: Address,
    ) -> Result<Self, VaultError> {
        if receipt.minter() != address {
            return Err(VaultError::ReceiptMinterMismatch {
                expected: address,
                actual: receipt.minter(),
            });
        }
        Ok(Self {
            address,
            token,
            receipt,
            reserve: Reserve::new(),
            admin: AdminHandoff::new(Role::Admin, deployer),
            time_lock: AdminHandoff::new(Role::TimeLock, deployer),
            guardian: deployer,
            deposit_limit: 0,
            paused: true,
            block_delay: vault_protocol::config::DEFAULT_BLOCK_DELAY,
            last_action: HashMap::new(),
            whitelist: HashSet::new(),
            fund_manager: None,
            staged: HashMap::new(),
            events: EventLog::new(),
        })
    }

    // -- views --------------------------------------------------------------

    /// Deployment address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Underlying asset.
    pub fn token(&self) -> Address {
        self.token
    }

    /// Current admin.
    pub fn admin(&self) -> Address {
        self.admin.current()
    }

    /// Admin candidate awaiting acceptance.
    pub fn next_admin(&self) -> Option<Address> {
        self.admin.pending()
    }

    /// Current time lock.
    pub fn time_lock(&self) -> Address {
        self.time_lock.current()
    }

    /// Time-lock candidate awaiting acceptance.
    pub fn next_time_lock(&self) -> Option<Address> {
        self.time_lock.pending()
    }

    /// Current guardian.
    pub fn guardian(&self) -> Address {
        self.guardian
    }

    /// Receipt token.
    pub fn receipt(&self) -> &dyn ReceiptToken {
        &*self.receipt
    }

    /// Shares held by `account`.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.receipt.balance_of(account)
    }

    /// Idle reserve.
    pub fn idle(&self) -> Amount {
        self.reserve.balance()
    }

    /// Funds lent to strategies.
    pub fn total_debt(&self) -> Amount {
        self.fund_manager
            .as_ref()
            .map_or(0, |fm| fm.total_debt())
    }

    /// Idle reserve plus strategy debt.
    pub fn total_assets(&self) -> Amount {
        self.idle().saturating_add(self.total_debt())
    }

    /// Value of `shares` at the current price.
    pub fn share_value(&self, shares: Amount) -> Result<Amount, VaultError> {
        let supply = self.receipt.total_supply();
        if supply == 0 {
            return Ok(shares);
        }
        Ok(math::mul_div(shares, self.total_assets(), supply)?)
    }

    /// Value of [`PRICE_UNIT`] shares.
    pub fn price_per_share(&self) -> Result<Amount, VaultError> {
        self.share_value(PRICE_UNIT)
    }

    /// `true` if `account` bypasses the block delay.
    pub fn is_whitelisted(&self, account: &Address) -> bool {
        self.whitelist.contains(account)
    }

    /// Block of `account`'s last deposit or withdrawal.
    pub fn last_action_block(&self, account: &Address) -> Option<u64> {
        self.last_action.get(account).copied()
    }

    /// Configuration snapshot.
    pub fn config(&self) -> VaultConfig {
        VaultConfig {
            token: self.token,
            receipt_token: self.receipt.address(),
            fund_manager: self.fund_manager.as_ref().map(|fm| fm.address()),
            total_debt_ratio: self
                .fund_manager
                .as_ref()
                .map_or(0, |fm| fm.total_debt_ratio()),
            deposit_limit: self.deposit_limit,
            paused: self.paused,
            block_delay: self.block_delay,
            admin: self.admin(),
            time_lock: self.time_lock(),
            guardian: self.guardian,
        }
    }

    /// Bound fund manager.
    pub fn fund_manager(&self) -> Option<&FundManager> {
        self.fund_manager.as_ref()
    }

    /// Bound fund manager, mutably. Used to attach strategies and to hand it
    /// to the time lock as a call target.
    pub fn fund_manager_mut(&mut self) -> Option<&mut FundManager> {
        self.fund_manager.as_mut()
    }

    /// Fund manager staged at `address`.
    pub fn staged_fund_manager(&self, address: &Address) -> Option<&FundManager> {
        self.staged.get(address)
    }

    /// Drains events from the vault and its bound fund manager.
    pub fn take_events(&mut self) -> Vec<Event> {
        let mut events = self.events.take();
        if let Some(fm) = self.fund_manager.as_mut() {
            events.extend(fm.take_events());
        }
        events
    }

    /// Verifies the allocator ledger and the debt-ratio bound.
    pub fn check_invariants(&self) -> Result<(), String> {
        match &self.fund_manager {
            Some(fm) => fm.check_invariants(),
            None => Ok(()),
        }
    }

    // -- depositor entry points ---------------------------------------------

    /// Deposits `amount` for the caller and returns the shares minted.
    ///
    /// # Errors
    ///
    /// Fails while paused, for a zero amount, inside the caller's block-delay
    /// window, above the deposit limit, and when the deposit would mint zero
    /// shares.
    pub fn deposit(&mut self, ctx: &CallContext, amount: Amount) -> Result<Amount, VaultError> {
        if self.paused {
            return Err(VaultError::Paused);
        }
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.check_block_delay(ctx)?;

        let total = self.total_assets();
        let after = math::add(total, amount)?;
        if after > self.deposit_limit {
            return Err(VaultError::DepositLimit {
                total: after,
                limit: self.deposit_limit,
            });
        }

        let supply = self.receipt.total_supply();
        let shares = if supply == 0 {
            amount
        } else if total == 0 {
            return Err(VaultError::ZeroTotalAssets);
        } else {
            math::mul_div(amount, supply, total)?
        };
        if shares == 0 {
            return Err(VaultError::ZeroShares { amount });
        }

        let mut reserve = self.reserve;
        reserve.credit(amount)?;
        self.receipt.mint(&self.address, &ctx.caller, shares)?;
        self.reserve = reserve;
        self.last_action.insert(ctx.caller, ctx.block);

        info!(account = %ctx.caller, amount, shares, "deposit");
        self.events.emit(Event::Deposit {
            account: ctx.caller,
            amount,
            shares,
        });
        Ok(shares)
    }

    /// Redeems `shares` and returns the amount paid.
    ///
    /// Pays from the idle reserve first, then pulls from strategies in queue
    /// order. Debt a strategy could no longer back while paying out is
    /// realized as a loss and deducted from what the withdrawer is owed, and
    /// all `shares` are burned. If strategies still cannot cover the rest,
    /// pays what is available and burns only the shares that amount (plus
    /// the realized loss) is worth. Callers should compare the result with
    /// [`share_value`](Self::share_value).
    ///
    /// Shares of a vault whose total assets are zero are burned for nothing.
    pub fn withdraw(&mut self, ctx: &CallContext, shares: Amount) -> Result<Amount, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let balance = self.receipt.balance_of(&ctx.caller);
        if balance < shares {
            return Err(VaultError::InsufficientShares {
                balance,
                requested: shares,
            });
        }
        self.check_block_delay(ctx)?;

        let supply = self.receipt.total_supply();
        let total = self.total_assets();
        let value = math::mul_div(shares, total, supply)?;
        if value == 0 && total > 0 {
            return Err(VaultError::ZeroAmount);
        }

        let idle = self.reserve.balance();
        let mut loss = 0;
        if value > idle {
            if let Some(fm) = self.fund_manager.as_mut() {
                let recovery =
                    fm.withdraw(&ctx.with_caller(self.address), value - idle, &mut self.reserve)?;
                loss = recovery.loss;
            }
        }

        let owed = math::sub(value, loss)?;
        let paid = owed.min(self.reserve.balance());
        if paid == 0 && owed > 0 {
            return Err(VaultError::NoLiquidity { requested: value });
        }
        let burned = if paid == owed {
            shares
        } else {
            math::mul_div_ceil(math::add(paid, loss)?, supply, total)?.min(shares)
        };

        self.receipt.burn(&self.address, &ctx.caller, burned)?;
        self.reserve.debit(paid)?;
        self.last_action.insert(ctx.caller, ctx.block);

        info!(
            account = %ctx.caller,
            shares = burned,
            amount = paid,
            requested = value,
            loss,
            "withdraw"
        );
        self.events.emit(Event::Withdraw {
            account: ctx.caller,
            shares: burned,
            amount: paid,
        });
        Ok(paid)
    }

    // -- configuration ------------------------------------------------------

    /// Sets the deposit limit. Admin or time lock.
    pub fn set_deposit_limit(&mut self, ctx: &CallContext, limit: Amount) -> Result<(), VaultError> {
        self.ensure_governance(&ctx.caller)?;
        self.deposit_limit = limit;
        info!(limit, "deposit limit set");
        self.events.emit(Event::SetDepositLimit { limit });
        Ok(())
    }

    /// Sets the per-account cooldown in blocks. Admin or time lock.
    pub fn set_block_delay(&mut self, ctx: &CallContext, blocks: u64) -> Result<(), VaultError> {
        self.ensure_governance(&ctx.caller)?;
        if blocks == 0 {
            return Err(VaultError::ZeroBlockDelay);
        }
        self.block_delay = blocks;
        self.events.emit(Event::SetBlockDelay { blocks });
        Ok(())
    }

    /// Exempts `account` from the block delay. Admin or time lock.
    pub fn set_whitelist(
        &mut self,
        ctx: &CallContext,
        account: Address,
        approved: bool,
    ) -> Result<(), VaultError> {
        self.ensure_governance(&ctx.caller)?;
        if approved {
            self.whitelist.insert(account);
        } else {
            self.whitelist.remove(&account);
        }
        self.events.emit(Event::SetWhitelist { account, approved });
        Ok(())
    }

    /// Replaces the guardian. Admin or time lock.
    pub fn set_guardian(&mut self, ctx: &CallContext, guardian: Address) -> Result<(), VaultError> {
        self.ensure_governance(&ctx.caller)?;
        self.guardian = guardian;
        self.events.emit(Event::SetGuardian { guardian });
        Ok(())
    }

    /// Pauses or unpauses deposits. The guardian may only pause.
    pub fn set_pause(&mut self, ctx: &CallContext, paused: bool) -> Result<(), VaultError> {
        if self.ensure_governance(&ctx.caller).is_err() {
            if ctx.caller != self.guardian {
                return Err(AccessError::Unauthorized {
                    role: Role::Guardian,
                    caller: ctx.caller,
                }
                .into());
            }
            if !paused {
                return Err(VaultError::GuardianCannotUnpause);
            }
        }
        self.paused = paused;
        info!(paused, caller = %ctx.caller, "pause set");
        self.events.emit(Event::SetPause { paused });
        Ok(())
    }

    /// Proposes a new admin. Admin only.
    pub fn set_next_admin(&mut self, ctx: &CallContext, candidate: Address) -> Result<(), VaultError> {
        self.admin.ensure(&ctx.caller)?;
        self.admin.propose(candidate)?;
        info!(%candidate, "vault admin proposed");
        self.events.emit(Event::SetNextAdmin { candidate });
        Ok(())
    }

    /// Completes an admin handoff. Candidate only.
    pub fn accept_admin(&mut self, ctx: &CallContext) -> Result<(), VaultError> {
        let admin = self.admin.accept(&ctx.caller)?;
        info!(%admin, "vault admin accepted");
        self.events.emit(Event::AcceptAdmin { admin });
        Ok(())
    }

    /// Proposes a new time lock. Current time lock only.
    pub fn set_next_time_lock(
        &mut self,
        ctx: &CallContext,
        candidate: Address,
    ) -> Result<(), VaultError> {
        self.time_lock.ensure(&ctx.caller)?;
        self.time_lock.propose(candidate)?;
        info!(%candidate, "vault time lock proposed");
        self.events.emit(Event::SetNextTimeLock { candidate });
        Ok(())
    }

    /// Completes a time-lock handoff. Candidate only, normally as a delayed
    /// call executed by the new time lock.
    pub fn accept_time_lock(&mut self, ctx: &CallContext) -> Result<(), VaultError> {
        let time_lock = self.time_lock.accept(&ctx.caller)?;
        info!(%time_lock, "vault time lock accepted");
        self.events.emit(Event::AcceptTimeLock { time_lock });
        Ok(())
    }

    /// Stages a fund manager so the time lock can bind it by address.
    pub fn attach_fund_manager(&mut self, fund_manager: FundManager) -> Result<Address, VaultError> {
        let address = fund_manager.address();
        let bound = self.fund_manager.as_ref().map(|fm| fm.address());
        if bound == Some(address) || self.staged.contains_key(&address) {
            return Err(VaultError::FundManagerAttached(address));
        }
        self.staged.insert(address, fund_manager);
        Ok(address)
    }

    /// Binds the staged fund manager at `address`. Time lock only.
    ///
    /// # Errors
    ///
    /// Rejects the current fund manager, unknown addresses, candidates for
    /// another token or vault, and any switch while the outgoing fund manager
    /// still has debt.
    pub fn set_fund_manager(&mut self, ctx: &CallContext, address: Address) -> Result<(), VaultError> {
        self.time_lock.ensure(&ctx.caller)?;

        if let Some(current) = &self.fund_manager {
            if current.address() == address {
                return Err(VaultError::SameFundManager(address));
            }
        }
        let candidate = self
            .staged
            .get(&address)
            .ok_or(VaultError::FundManagerNotAttached(address))?;
        if candidate.token() != self.token {
            return Err(VaultError::TokenMismatch {
                expected: self.token,
                actual: candidate.token(),
            });
        }
        if candidate.vault() != self.address {
            return Err(VaultError::VaultMismatch {
                expected: self.address,
                actual: candidate.vault(),
            });
        }
        if let Some(current) = &self.fund_manager {
            if current.total_debt() > 0 {
                return Err(VaultError::OutgoingDebt {
                    debt: current.total_debt(),
                });
            }
        }

        let incoming = self
            .staged
            .remove(&address)
            .ok_or(VaultError::FundManagerNotAttached(address))?;
        if let Some(outgoing) = self.fund_manager.replace(incoming) {
            self.staged.insert(outgoing.address(), outgoing);
        }

        info!(fund_manager = %address, "fund manager set");
        self.events.emit(Event::SetFundManager {
            fund_manager: address,
        });
        Ok(())
    }

    // -- allocator entry points ---------------------------------------------

    /// Borrow capacity of `strategy` against the current idle reserve.
    pub fn calc_max_borrow(&self, strategy: &Address) -> Result<Amount, VaultError> {
        let fm = self.fund_manager.as_ref().ok_or(VaultError::NoFundManager)?;
        Ok(fm.calc_max_borrow(strategy, self.reserve.balance())?)
    }

    /// Debt `strategy` carries above its entitlement.
    pub fn calc_outstanding_debt(&self, strategy: &Address) -> Result<Amount, VaultError> {
        let fm = self.fund_manager.as_ref().ok_or(VaultError::NoFundManager)?;
        Ok(fm.calc_outstanding_debt(strategy, self.reserve.balance())?)
    }

    /// See [`FundManager::allocate`].
    pub fn allocate(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
        max_in: Amount,
        min_out: Amount,
    ) -> Result<Amount, VaultError> {
        let fm = self.fund_manager.as_mut().ok_or(VaultError::NoFundManager)?;
        Ok(fm.allocate(ctx, strategy, max_in, min_out, &mut self.reserve)?)
    }

    /// See [`FundManager::report`].
    pub fn report(
        &mut self,
        ctx: &CallContext,
        request: ReportRequest,
    ) -> Result<ReportEvent, VaultError> {
        let fm = self.fund_manager.as_mut().ok_or(VaultError::NoFundManager)?;
        Ok(fm.report(ctx, request, &mut self.reserve)?)
    }

    /// See [`FundManager::harvest`].
    pub fn harvest(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
        borrow: bool,
    ) -> Result<ReportEvent, VaultError> {
        let fm = self.fund_manager.as_mut().ok_or(VaultError::NoFundManager)?;
        Ok(fm.harvest(ctx, strategy, borrow, &mut self.reserve)?)
    }

    /// See [`FundManager::skim`].
    pub fn skim(&mut self, ctx: &CallContext, strategy: Address) -> Result<Amount, VaultError> {
        let fm = self.fund_manager.as_mut().ok_or(VaultError::NoFundManager)?;
        Ok(fm.skim(ctx, strategy, &mut self.reserve)?)
    }

    // -- internals ----------------------------------------------------------

    fn ensure_governance(&self, caller: &Address) -> Result<(), AccessError> {
        ensure_any(Role::Admin, caller, &[self.admin(), self.time_lock()])
    }

    fn check_block_delay(&self, ctx: &CallContext) -> Result<(), VaultError> {
        if self.whitelist.contains(&ctx.caller) {
            return Ok(());
        }
        if let Some(last) = self.last_action.get(&ctx.caller) {
            let next_block = last.saturating_add(self.block_delay);
            if ctx.block < next_block {
                return Err(VaultError::BlockDelay {
                    account: ctx.caller,
                    next_block,
                });
            }
        }
        Ok(())
    }

    fn apply(&mut self, ctx: &CallContext, call: VaultCall) -> Result<(), VaultError> {
        match call {
            VaultCall::SetDepositLimit { limit } => self.set_deposit_limit(ctx, limit),
            VaultCall::SetBlockDelay { blocks } => self.set_block_delay(ctx, blocks),
            VaultCall::SetWhitelist { account, approved } => {
                self.set_whitelist(ctx, account, approved)
            }
            VaultCall::SetGuardian { guardian } => self.set_guardian(ctx, guardian),
            VaultCall::SetPause { paused } => self.set_pause(ctx, paused),
            VaultCall::SetNextAdmin { candidate } => self.set_next_admin(ctx, candidate),
            VaultCall::SetNextTimeLock { candidate } => self.set_next_time_lock(ctx, candidate),
            VaultCall::AcceptTimeLock => self.accept_time_lock(ctx),
            VaultCall::SetFundManager { fund_manager } => self.set_fund_manager(ctx, fund_manager),
        }
    }
}

impl crate::timelock::Governable for Vault {
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
        let call: VaultCall = bincode::deserialize(payload).map_err(CallFailure::malformed)?;
        self.apply(ctx, call)
            .map_err(|err| CallFailure::new(err.kind(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::ShareToken;

    fn ctx(caller: Address, block: u64) -> CallContext {
        CallContext {
            caller,
            timestamp: 1_000 + block * 12,
            block,
        }
    }

    fn open_vault() -> (Vault, Address) {
        let deployer = Address::from_label("deployer");
        let address = Address::from_label("vault");
        let receipt = ShareToken::new(Address::from_label("share"), "Share", "SHR", address);
        let mut vault =
            Vault::new(address, Address::from_label("token"), Box::new(receipt), deployer)
                .unwrap();
        vault.set_pause(&ctx(deployer, 1), false).unwrap();
        vault.set_deposit_limit(&ctx(deployer, 1), Amount::MAX).unwrap();
        (vault, deployer)
    }

    #[test]
    fn new_vault_is_paused_with_zero_limit() {
        let deployer = Address::from_label("deployer");
        let address = Address::from_label("vault");
        let receipt = ShareToken::new(Address::from_label("share"), "Share", "SHR", address);
        let mut vault =
            Vault::new(address, Address::from_label("token"), Box::new(receipt), deployer)
                .unwrap();
        assert!(vault.config().paused);
        assert_eq!(vault.config().deposit_limit, 0);
        assert_eq!(
            vault.deposit(&ctx(deployer, 1), 1),
            Err(VaultError::Paused)
        );
    }

    #[test]
    fn receipt_must_be_minted_by_vault() {
        let receipt = ShareToken::new(
            Address::from_label("share"),
            "Share",
            "SHR",
            Address::from_label("someone-else"),
        );
        let err = Vault::new(
            Address::from_label("vault"),
            Address::from_label("token"),
            Box::new(receipt),
            Address::from_label("deployer"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);
    }

    #[test]
    fn first_deposit_mints_one_to_one_then_pro_rata() {
        let (mut vault, _) = open_vault();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        assert_eq!(vault.deposit(&ctx(alice, 2), 1_000).unwrap(), 1_000);
        assert_eq!(vault.deposit(&ctx(bob, 2), 500).unwrap(), 500);
        assert_eq!(vault.total_assets(), 1_500);
        assert_eq!(vault.receipt().total_supply(), 1_500);
        assert_eq!(vault.price_per_share().unwrap(), PRICE_UNIT);
    }

    #[test]
    fn deposit_limit_is_enforced() {
        let (mut vault, deployer) = open_vault();
        vault.set_deposit_limit(&ctx(deployer, 1), 100).unwrap();
        let alice = Address::from_label("alice");
        vault.deposit(&ctx(alice, 2), 100).unwrap();
        assert!(matches!(
            vault.deposit(&ctx(alice, 3), 1),
            Err(VaultError::DepositLimit { .. })
        ));
    }

    #[test]
    fn block_delay_applies_unless_whitelisted() {
        let (mut vault, deployer) = open_vault();
        let alice = Address::from_label("alice");
        vault.deposit(&ctx(alice, 5), 10).unwrap();
        let err = vault.withdraw(&ctx(alice, 5), 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timing);

        vault.set_whitelist(&ctx(deployer, 5), alice, true).unwrap();
        assert_eq!(vault.withdraw(&ctx(alice, 5), 10).unwrap(), 10);
    }

    #[test]
    fn guardian_can_pause_but_not_unpause() {
        let (mut vault, deployer) = open_vault();
        let guardian = Address::from_label("guardian");
        vault.set_guardian(&ctx(deployer, 1), guardian).unwrap();

        vault.set_pause(&ctx(guardian, 1), true).unwrap();
        assert_eq!(
            vault.set_pause(&ctx(guardian, 1), false),
            Err(VaultError::GuardianCannotUnpause)
        );
        let err = vault
            .set_pause(&ctx(Address::from_label("eve"), 1), true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn withdraw_allowed_while_paused() {
        let (mut vault, deployer) = open_vault();
        let alice = Address::from_label("alice");
        vault.deposit(&ctx(alice, 1), 10).unwrap();
        vault.set_pause(&ctx(deployer, 2), true).unwrap();
        assert_eq!(vault.withdraw(&ctx(alice, 2), 4).unwrap(), 4);
        assert_eq!(vault.balance_of(&alice), 6);
    }

    #[test]
    fn admin_handoff_rules() {
        let (mut vault, deployer) = open_vault();
        let next = Address::from_label("next");

        let err = vault
            .set_next_admin(&ctx(next, 1), next)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        let err = vault.set_next_admin(&ctx(deployer, 1), deployer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);

        vault.set_next_admin(&ctx(deployer, 1), next).unwrap();
        assert_eq!(vault.next_admin(), Some(next));
        assert!(vault
            .take_events()
            .contains(&Event::SetNextAdmin { candidate: next }));
        vault.accept_admin(&ctx(next, 2)).unwrap();
        assert_eq!(vault.admin(), next);
    }

    #[test]
    fn dispatch_rejects_value_and_garbage() {
        use crate::timelock::Governable;
        let (mut vault, deployer) = open_vault();
        let payload = VaultCall::SetDepositLimit { limit: 5 }.encode().unwrap();
        let c = ctx(deployer, 1);
        assert_eq!(
            vault.dispatch(&c, 1, &payload).unwrap_err().kind,
            ErrorKind::Parameter
        );
        assert!(vault.dispatch(&c, 0, &[0xff; 3]).is_err());
        vault.dispatch(&c, 0, &payload).unwrap();
        assert_eq!(vault.config().deposit_limit, 5);
    }
}
