//! # Deployment
//!
//! Wires a time lock, a vault, its receipt token and a fund manager into the
//! governed-by chain:
//!
//! 1. The deployer builds every component and temporarily holds the vault's
//!    and fund manager's time-lock role, which lets it bind the fund manager
//!    and apply [`VaultParams`] without waiting.
//! 2. [`Deployment::begin_handoff`] proposes the real time lock on both
//!    components and queues their `AcceptTimeLock` calls.
//! 3. After the delay, [`Deployment::complete_handoff`] executes them. From
//!    then on every privileged change to either component goes through the
//!    queue.
//!
//! [`Deployment::queue`] and [`Deployment::execute`] route later governance
//! calls to the right component.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use vault_protocol::config::{ConfigError, VaultParams};
use vault_protocol::{Address, CallContext, TxHash};

use crate::error::ErrorKind;
use crate::fund_manager::{FundManager, FundManagerCall, FundManagerError};
use crate::receipt::ShareToken;
use crate::timelock::{TimeLock, TimeLockError};
use crate::vault::{Vault, VaultCall, VaultError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while deploying or governing a deployment.
#[derive(Debug, Error)]
pub enum DeploymentError {
    /// Deployment parameters are invalid.
    #[error("invalid parameters: {0}")]
    Config(#[from] ConfigError),

    /// A vault call failed.
    #[error("vault: {0}")]
    Vault(#[from] VaultError),

    /// A fund manager call failed.
    #[error("fund manager: {0}")]
    FundManager(#[from] FundManagerError),

    /// A time-lock call failed.
    #[error("time lock: {0}")]
    TimeLock(#[from] TimeLockError),

    /// A governance payload could not be encoded.
    #[error("payload encoding: {0}")]
    Encode(#[from] bincode::Error),

    /// The vault has no fund manager to govern.
    #[error("no fund manager bound")]
    NoFundManager,

    /// [`Deployment::begin_handoff`] was already called.
    #[error("time-lock handoff already started")]
    HandoffStarted,

    /// [`Deployment::complete_handoff`] without a started handoff.
    #[error("no time-lock handoff pending")]
    NoHandoff,
}

impl DeploymentError {
    /// Classifies the error, looking through wrapped component errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Vault(err) => err.kind(),
            Self::FundManager(err) => err.kind(),
            Self::TimeLock(err) => err.kind(),
            Self::Config(_) | Self::Encode(_) => ErrorKind::Parameter,
            Self::NoFundManager | Self::HandoffStarted | Self::NoHandoff => ErrorKind::State,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Component a governance call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The vault.
    Vault,
    /// The vault's bound fund manager.
    FundManager,
    /// The time lock itself.
    TimeLock,
}

/// A call sitting in the time lock, with everything needed to execute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCall {
    /// Component addressed.
    pub target: Target,
    /// Queue hash.
    pub tx_hash: TxHash,
    /// Encoded call.
    pub payload: Vec<u8>,
    /// Earliest execution time.
    pub eta: u64,
    /// Queue nonce.
    pub nonce: u64,
}

/// Role holders besides the deployer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    /// Emergency pauser.
    pub guardian: Address,
    /// Harvest trigger.
    pub keeper: Address,
}

/// A deployed vault system.
#[derive(Debug)]
pub struct Deployment {
    /// The time lock governing the vault and fund manager.
    pub time_lock: TimeLock,
    /// The vault, owning its fund manager.
    pub vault: Vault,
    params: VaultParams,
    handoff: Option<Vec<QueuedCall>>,
    next_nonce: u64,
}

impl Deployment {
    /// Deploys every component and applies `params`. `ctx.caller` is the
    /// deployer and becomes the time-lock admin.
    pub fn deploy(
        ctx: &CallContext,
        token: Address,
        roles: Roles,
        params: VaultParams,
    ) -> Result<Self, DeploymentError> {
        params.validate()?;
        let deployer = ctx.caller;

        let time_lock_address = Address::derive(&deployer, "time-lock");
        let vault_address = Address::derive(&deployer, "vault");
        let share_address = Address::derive(&deployer, "share");
        let fund_manager_address = Address::derive(&deployer, "fund-manager");

        let time_lock = TimeLock::new(time_lock_address, deployer);
        let receipt = ShareToken::new(share_address, "Vault Share", "vSHR", vault_address);
        let mut vault = Vault::new(vault_address, token, Box::new(receipt), deployer)?;

        let mut fund_manager =
            FundManager::new(fund_manager_address, vault_address, token, deployer);
        fund_manager.set_keeper(ctx, roles.keeper)?;
        vault.attach_fund_manager(fund_manager)?;
        vault.set_fund_manager(ctx, fund_manager_address)?;

        vault.set_block_delay(ctx, params.block_delay)?;
        vault.set_deposit_limit(ctx, params.deposit_limit)?;
        vault.set_guardian(ctx, roles.guardian)?;
        if params.start_unpaused {
            vault.set_pause(ctx, false)?;
        }

        info!(
            vault = %vault_address,
            time_lock = %time_lock_address,
            fund_manager = %fund_manager_address,
            "vault deployed"
        );
        Ok(Self {
            time_lock,
            vault,
            params,
            handoff: None,
            next_nonce: 0,
        })
    }

    /// Deployment parameters.
    pub fn params(&self) -> &VaultParams {
        &self.params
    }

    /// Bound fund manager.
    pub fn fund_manager(&self) -> Result<&FundManager, DeploymentError> {
        self.vault.fund_manager().ok_or(DeploymentError::NoFundManager)
    }

    /// Bound fund manager, mutably.
    pub fn fund_manager_mut(&mut self) -> Result<&mut FundManager, DeploymentError> {
        self.vault
            .fund_manager_mut()
            .ok_or(DeploymentError::NoFundManager)
    }

    /// Address of `target`.
    pub fn target_address(&self, target: Target) -> Result<Address, DeploymentError> {
        Ok(match target {
            Target::Vault => self.vault.address(),
            Target::FundManager => self.fund_manager()?.address(),
            Target::TimeLock => self.time_lock.address(),
        })
    }

    /// Queues `payload` for `target` with the configured delay and a fresh
    /// nonce.
    pub fn queue(
        &mut self,
        ctx: &CallContext,
        target: Target,
        payload: Vec<u8>,
    ) -> Result<QueuedCall, DeploymentError> {
        let address = self.target_address(target)?;
        let nonce = self.next_nonce;
        let delay = self.params.time_lock_delay;
        let tx_hash = self
            .time_lock
            .queue(ctx, address, 0, &payload, delay, nonce)?;
        self.next_nonce += 1;
        Ok(QueuedCall {
            target,
            tx_hash,
            payload,
            eta: ctx.timestamp + delay,
            nonce,
        })
    }

    /// Executes a previously queued call.
    pub fn execute(&mut self, ctx: &CallContext, call: &QueuedCall) -> Result<TxHash, DeploymentError> {
        let QueuedCall {
            payload, eta, nonce, ..
        } = call;
        let tx_hash = match call.target {
            Target::Vault => {
                self.time_lock
                    .execute(ctx, &mut self.vault, 0, payload, *eta, *nonce)?
            }
            Target::FundManager => {
                let fm = self
                    .vault
                    .fund_manager_mut()
                    .ok_or(DeploymentError::NoFundManager)?;
                self.time_lock.execute(ctx, fm, 0, payload, *eta, *nonce)?
            }
            Target::TimeLock => self.time_lock.execute_self(ctx, 0, payload, *eta, *nonce)?,
        };
        Ok(tx_hash)
    }

    /// Proposes the time lock on the vault and fund manager and queues both
    /// acceptances. Returns the eta after which
    /// [`complete_handoff`](Self::complete_handoff) may run.
    pub fn begin_handoff(&mut self, ctx: &CallContext) -> Result<u64, DeploymentError> {
        if self.handoff.is_some() {
            return Err(DeploymentError::HandoffStarted);
        }
        let time_lock = self.time_lock.address();
        self.vault.set_next_time_lock(ctx, time_lock)?;
        self.fund_manager_mut()?.set_next_time_lock(ctx, time_lock)?;

        let vault_call = self.queue(ctx, Target::Vault, VaultCall::AcceptTimeLock.encode()?)?;
        let fm_call = self.queue(
            ctx,
            Target::FundManager,
            FundManagerCall::AcceptTimeLock.encode()?,
        )?;
        let eta = vault_call.eta.max(fm_call.eta);
        self.handoff = Some(vec![vault_call, fm_call]);
        Ok(eta)
    }

    /// Executes the queued acceptances.
    pub fn complete_handoff(&mut self, ctx: &CallContext) -> Result<(), DeploymentError> {
        let calls = self.handoff.clone().ok_or(DeploymentError::NoHandoff)?;
        for call in &calls {
            if self.time_lock.queued(&call.tx_hash) {
                self.execute(ctx, call)?;
            }
        }
        self.handoff = None;
        info!(time_lock = %self.time_lock.address(), "time lock handoff complete");
        Ok(())
    }

    /// `true` once both components answer to the time lock.
    pub fn is_governed(&self) -> bool {
        let time_lock = self.time_lock.address();
        self.vault.time_lock() == time_lock
            && self
                .vault
                .fund_manager()
                .is_some_and(|fm| fm.time_lock() == time_lock)
    }
}
