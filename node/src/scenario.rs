//! # Scenario Simulator
//!
//! Replays a JSON scenario against an in-memory deployment:
//!
//! 1. Deploy a vault, fund manager and time lock, then hand governance to the
//!    time lock.
//! 2. Attach every strategy of the scenario and activate it through queued,
//!    delayed governance calls.
//! 3. Apply the steps in order. Governance steps are queued, the chain is
//!    advanced past the delay, and the call is executed. A step may declare
//!    the error kind it is expected to fail with.
//!
//! The ledger invariants are checked after every step.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vault_contracts::strategy::StrategyError;
use vault_contracts::{
    Deployment, DeploymentError, ErrorKind, Event, FundManagerCall, HoldStrategy, Roles,
    Target, VaultCall, VaultError, YieldPool,
};
use vault_protocol::config::VaultParams;
use vault_protocol::{Address, Amount, Bps, Chain};

use crate::metrics::VaultMetrics;

/// Example scenario shipped with the binary.
pub const DEMO_SCENARIO: &str = include_str!("../scenarios/demo.json");

const DEPLOYER: &str = "deployer";
const GUARDIAN: &str = "guardian";
const KEEPER: &str = "keeper";

// ---------------------------------------------------------------------------
// Scenario File
// ---------------------------------------------------------------------------

/// A scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Timestamp of the first simulated block.
    #[serde(default = "default_genesis")]
    pub genesis_timestamp: u64,
    /// Deployment parameters.
    #[serde(default)]
    pub params: VaultParams,
    /// Label of the underlying asset.
    #[serde(default = "default_token")]
    pub token: String,
    /// Strategies activated before the first step.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    /// Steps to replay.
    #[serde(default)]
    pub steps: Vec<StepEntry>,
}

fn default_genesis() -> u64 {
    1_700_000_000
}

fn default_token() -> String {
    "token".into()
}

fn unbounded() -> Amount {
    Amount::MAX
}

fn yes() -> bool {
    true
}

impl Scenario {
    /// Reads and parses a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid scenario {}", path.display()))
    }

    /// Parses scenario JSON.
    pub fn parse(raw: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(raw)?;
        scenario.params.validate()?;
        Ok(scenario)
    }
}

/// A strategy to deploy and activate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// Label; also the strategy's address seed.
    pub name: String,
    /// Initial debt ratio.
    pub debt_ratio: Bps,
    /// Share of each deposit the strategy keeps liquid.
    #[serde(default)]
    pub buffer_bps: Bps,
    /// Exit fee charged by the strategy's pool.
    #[serde(default)]
    pub exit_fee_bps: Bps,
    /// Smallest fresh borrow per report.
    #[serde(default)]
    pub min_debt_per_harvest: Amount,
    /// Largest borrow per call.
    #[serde(default = "unbounded")]
    pub max_debt_per_harvest: Amount,
}

/// One step, optionally expected to fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEntry {
    /// The action.
    #[serde(flatten)]
    pub step: Step,
    /// Kind of error the step must be rejected with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_error: Option<ErrorKind>,
}

/// Scenario actions. Accounts and strategies are referred to by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Deposit into the vault.
    Deposit { account: String, amount: Amount },
    /// Redeem shares; all of the account's shares when omitted.
    Withdraw {
        account: String,
        #[serde(default)]
        shares: Option<Amount>,
    },
    /// Keeper lends to a strategy.
    Allocate {
        strategy: String,
        #[serde(default)]
        max_in: Option<Amount>,
        #[serde(default)]
        min_out: Amount,
    },
    /// Yield accrues in a strategy's pool.
    Accrue { strategy: String, amount: Amount },
    /// Principal is lost in a strategy's pool.
    Slash { strategy: String, amount: Amount },
    /// The pool changes its exit fee.
    SetExitFee { strategy: String, bps: Bps },
    /// Keeper harvests a strategy.
    Harvest {
        strategy: String,
        #[serde(default = "yes")]
        borrow: bool,
    },
    /// Anyone skims a strategy's surplus.
    Skim { strategy: String },
    /// Advance the clock by `seconds` (one block).
    Advance { seconds: u64 },
    /// Mine `blocks` blocks.
    Mine { blocks: u64 },
    /// Guardian pauses deposits.
    GuardianPause,
    /// Governed: set a strategy's debt ratio.
    SetDebtRatio { strategy: String, debt_ratio: Bps },
    /// Governed: set a strategy's borrow bounds.
    SetHarvestBounds {
        strategy: String,
        min: Amount,
        max: Amount,
    },
    /// Governed: deactivate a strategy.
    RemoveStrategy { strategy: String },
    /// Governed: set the deposit limit.
    SetDepositLimit { limit: Amount },
    /// Governed: pause or unpause.
    SetPause { paused: bool },
    /// Governed: set the per-account block delay.
    SetBlockDelay { blocks: u64 },
    /// Governed: exempt an account from the block delay.
    Whitelist { account: String, approved: bool },
}

impl Step {
    /// Short action name for logs and errors.
    pub fn action(&self) -> &'static str {
        match self {
            Step::Deposit { .. } => "deposit",
            Step::Withdraw { .. } => "withdraw",
            Step::Allocate { .. } => "allocate",
            Step::Accrue { .. } => "accrue",
            Step::Slash { .. } => "slash",
            Step::SetExitFee { .. } => "set_exit_fee",
            Step::Harvest { .. } => "harvest",
            Step::Skim { .. } => "skim",
            Step::Advance { .. } => "advance",
            Step::Mine { .. } => "mine",
            Step::GuardianPause => "guardian_pause",
            Step::SetDebtRatio { .. } => "set_debt_ratio",
            Step::SetHarvestBounds { .. } => "set_harvest_bounds",
            Step::RemoveStrategy { .. } => "remove_strategy",
            Step::SetDepositLimit { .. } => "set_deposit_limit",
            Step::SetPause { .. } => "set_pause",
            Step::SetBlockDelay { .. } => "set_block_delay",
            Step::Whitelist { .. } => "whitelist",
        }
    }
}

/// Kind of a step failure, if it came from a contract.
fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    if let Some(err) = err.downcast_ref::<VaultError>() {
        return Some(err.kind());
    }
    if let Some(err) = err.downcast_ref::<DeploymentError>() {
        return Some(err.kind());
    }
    err.downcast_ref::<StrategyError>().map(StrategyError::kind)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// State of the deployment after a run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub timestamp: u64,
    pub block: u64,
    pub vault: Address,
    pub time_lock: Address,
    pub total_assets: Amount,
    pub idle: Amount,
    pub total_debt: Amount,
    pub total_debt_ratio: Bps,
    pub share_supply: Amount,
    pub price_per_share: Amount,
    pub strategies: Vec<StrategySummary>,
    pub accounts: Vec<AccountSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
}

/// Per-strategy ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct StrategySummary {
    pub name: String,
    pub address: Address,
    pub active: bool,
    pub debt_ratio: Bps,
    pub debt: Amount,
    pub assets: Amount,
    pub total_gain: Amount,
    pub total_loss: Amount,
}

/// Per-depositor position.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub name: String,
    pub address: Address,
    pub shares: Amount,
    pub value: Amount,
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StrategyHandle {
    address: Address,
    pool: YieldPool,
}

/// A deployment plus the clock and fixtures driving it.
pub struct Simulator {
    chain: Chain,
    deployment: Deployment,
    strategies: BTreeMap<String, StrategyHandle>,
    accounts: BTreeMap<String, Address>,
    events: Vec<Event>,
    metrics: VaultMetrics,
}

impl Simulator {
    /// Deploys the scenario's system and activates its strategies.
    pub fn deploy(scenario: &Scenario, metrics: VaultMetrics) -> Result<Self> {
        let mut chain = Chain::new(scenario.genesis_timestamp);
        let deployer = Address::from_label(DEPLOYER);
        let roles = Roles {
            guardian: Address::from_label(GUARDIAN),
            keeper: Address::from_label(KEEPER),
        };

        let mut deployment = Deployment::deploy(
            &chain.ctx(deployer),
            Address::from_label(&scenario.token),
            roles,
            scenario.params.clone(),
        )
        .context("deployment failed")?;

        let eta = deployment.begin_handoff(&chain.ctx(deployer))?;
        chain.sleep(eta.saturating_sub(chain.now()));
        deployment.complete_handoff(&chain.ctx(deployer))?;

        let mut simulator = Self {
            chain,
            deployment,
            strategies: BTreeMap::new(),
            accounts: BTreeMap::new(),
            events: Vec::new(),
            metrics,
        };
        for config in &scenario.strategies {
            simulator
                .add_strategy(config)
                .with_context(|| format!("failed to activate strategy `{}`", config.name))?;
        }
        simulator.collect();
        info!(
            vault = %simulator.deployment.vault.address(),
            strategies = simulator.strategies.len(),
            "simulation deployed"
        );
        Ok(simulator)
    }

    /// Applies every step, stopping at the first unexpected outcome.
    pub fn run(&mut self, steps: &[StepEntry]) -> Result<()> {
        for (index, entry) in steps.iter().enumerate() {
            let action = entry.step.action();
            let outcome = self.apply(&entry.step);
            self.collect();

            match (outcome, entry.expect_error) {
                (Ok(()), None) => {
                    self.metrics.steps_processed_total.inc();
                    info!(step = index, action, "step applied");
                }
                (Ok(()), Some(kind)) => {
                    bail!("step {index} ({action}) succeeded, expected a {kind} error")
                }
                (Err(err), Some(kind)) if error_kind(&err) == Some(kind) => {
                    self.metrics.step_failures_total.inc();
                    info!(step = index, action, %kind, error = %err, "step rejected as expected");
                }
                (Err(err), _) => {
                    self.metrics.step_failures_total.inc();
                    warn!(step = index, action, error = %err, "step failed");
                    return Err(err.context(format!("step {index} ({action}) failed")));
                }
            }

            self.deployment
                .vault
                .check_invariants()
                .map_err(|violation| anyhow!("invariant violated after step {index}: {violation}"))?;
        }
        Ok(())
    }

    /// Snapshot of the deployment.
    pub fn summary(&self, include_events: bool) -> Result<Summary> {
        let vault = &self.deployment.vault;
        let fm = self.deployment.fund_manager()?;

        let strategies = self
            .strategies
            .iter()
            .map(|(name, handle)| {
                let record = fm.strategy(&handle.address).copied().unwrap_or_default();
                StrategySummary {
                    name: name.clone(),
                    address: handle.address,
                    active: record.active,
                    debt_ratio: record.debt_ratio,
                    debt: record.debt,
                    assets: fm
                        .adapter(&handle.address)
                        .map_or(0, |adapter| adapter.total_assets()),
                    total_gain: record.total_gain,
                    total_loss: record.total_loss,
                }
            })
            .collect();

        let accounts = self
            .accounts
            .iter()
            .map(|(name, address)| {
                let shares = vault.balance_of(address);
                Ok(AccountSummary {
                    name: name.clone(),
                    address: *address,
                    shares,
                    value: vault.share_value(shares)?,
                })
            })
            .collect::<Result<Vec<_>, VaultError>>()?;

        Ok(Summary {
            timestamp: self.chain.now(),
            block: self.chain.block_number(),
            vault: vault.address(),
            time_lock: self.deployment.time_lock.address(),
            total_assets: vault.total_assets(),
            idle: vault.idle(),
            total_debt: vault.total_debt(),
            total_debt_ratio: fm.total_debt_ratio(),
            share_supply: vault.receipt().total_supply(),
            price_per_share: vault.price_per_share()?,
            strategies,
            accounts,
            events: include_events.then(|| self.events.clone()),
        })
    }

    // -- steps --------------------------------------------------------------

    fn apply(&mut self, step: &Step) -> Result<()> {
        let keeper = Address::from_label(KEEPER);
        match step {
            Step::Deposit { account, amount } => {
                let caller = self.account(account);
                self.deployment
                    .vault
                    .deposit(&self.chain.ctx(caller), *amount)?;
            }
            Step::Withdraw { account, shares } => {
                let caller = self.account(account);
                let shares = shares.unwrap_or_else(|| self.deployment.vault.balance_of(&caller));
                let requested = self.deployment.vault.share_value(shares)?;
                let paid = self
                    .deployment
                    .vault
                    .withdraw(&self.chain.ctx(caller), shares)?;
                if paid < requested {
                    warn!(account = %account, paid, requested, "partial withdrawal");
                }
            }
            Step::Allocate {
                strategy,
                max_in,
                min_out,
            } => {
                let address = self.strategy(strategy)?.address;
                let lent = self.deployment.vault.allocate(
                    &self.chain.ctx(keeper),
                    address,
                    max_in.unwrap_or(Amount::MAX),
                    *min_out,
                )?;
                info!(strategy = %strategy, lent, "allocated");
            }
            Step::Accrue { strategy, amount } => {
                self.strategy(strategy)?.pool.accrue(*amount)?;
            }
            Step::Slash { strategy, amount } => {
                self.strategy(strategy)?.pool.slash(*amount);
            }
            Step::SetExitFee { strategy, bps } => {
                self.strategy(strategy)?.pool.set_exit_fee(*bps)?;
            }
            Step::Harvest { strategy, borrow } => {
                let address = self.strategy(strategy)?.address;
                self.deployment
                    .vault
                    .harvest(&self.chain.ctx(keeper), address, *borrow)?;
            }
            Step::Skim { strategy } => {
                let address = self.strategy(strategy)?.address;
                let caller = Address::from_label("skimmer");
                self.deployment
                    .vault
                    .skim(&self.chain.ctx(caller), address)?;
            }
            Step::Advance { seconds } => self.chain.sleep(*seconds),
            Step::Mine { blocks } => self.chain.mine(*blocks),
            Step::GuardianPause => {
                let guardian = Address::from_label(GUARDIAN);
                self.deployment
                    .vault
                    .set_pause(&self.chain.ctx(guardian), true)?;
            }
            Step::SetDebtRatio {
                strategy,
                debt_ratio,
            } => {
                let strategy = self.strategy(strategy)?.address;
                let call = FundManagerCall::SetDebtRatio {
                    strategy,
                    debt_ratio: *debt_ratio,
                };
                self.enact(vec![(Target::FundManager, call.encode()?)])?;
            }
            Step::SetHarvestBounds { strategy, min, max } => {
                let strategy = self.strategy(strategy)?.address;
                let call = FundManagerCall::SetHarvestBounds {
                    strategy,
                    min: *min,
                    max: *max,
                };
                self.enact(vec![(Target::FundManager, call.encode()?)])?;
            }
            Step::RemoveStrategy { strategy } => {
                let strategy = self.strategy(strategy)?.address;
                let call = FundManagerCall::RemoveStrategyFromQueue { strategy };
                self.enact(vec![(Target::FundManager, call.encode()?)])?;
            }
            Step::SetDepositLimit { limit } => {
                let call = VaultCall::SetDepositLimit { limit: *limit };
                self.enact(vec![(Target::Vault, call.encode()?)])?;
            }
            Step::SetPause { paused } => {
                let call = VaultCall::SetPause { paused: *paused };
                self.enact(vec![(Target::Vault, call.encode()?)])?;
            }
            Step::SetBlockDelay { blocks } => {
                let call = VaultCall::SetBlockDelay { blocks: *blocks };
                self.enact(vec![(Target::Vault, call.encode()?)])?;
            }
            Step::Whitelist { account, approved } => {
                let account = self.account(account);
                let call = VaultCall::SetWhitelist {
                    account,
                    approved: *approved,
                };
                self.enact(vec![(Target::Vault, call.encode()?)])?;
            }
        }
        Ok(())
    }

    fn add_strategy(&mut self, strategy: &StrategyConfig) -> Result<()> {
        if self.strategies.contains_key(&strategy.name) {
            bail!("duplicate strategy `{}`", strategy.name);
        }
        let vault = self.deployment.vault.address();
        let token = self.deployment.vault.token();
        let address = Address::from_label(&strategy.name);
        let pool = YieldPool::new();
        pool.set_exit_fee(strategy.exit_fee_bps)?;

        let adapter =
            HoldStrategy::new(address, vault, token, pool.clone()).with_buffer(strategy.buffer_bps);
        let fm = self.deployment.fund_manager_mut()?;
        fm.attach_strategy(Box::new(adapter))
            .map_err(DeploymentError::from)?;
        let position = fm.queue().len() as u64;

        self.enact(vec![
            (
                Target::FundManager,
                FundManagerCall::ApproveStrategy { strategy: address }.encode()?,
            ),
            (
                Target::FundManager,
                FundManagerCall::AddStrategyToQueue {
                    strategy: address,
                    position,
                    min: strategy.min_debt_per_harvest,
                    max: strategy.max_debt_per_harvest,
                }
                .encode()?,
            ),
            (
                Target::FundManager,
                FundManagerCall::SetDebtRatio {
                    strategy: address,
                    debt_ratio: strategy.debt_ratio,
                }
                .encode()?,
            ),
        ])?;

        self.strategies
            .insert(strategy.name.clone(), StrategyHandle { address, pool });
        Ok(())
    }

    /// Queues `calls`, waits out the delay and executes them in order.
    fn enact(&mut self, calls: Vec<(Target, Vec<u8>)>) -> Result<(), DeploymentError> {
        let admin = Address::from_label(DEPLOYER);
        let mut queued = Vec::with_capacity(calls.len());
        for (target, payload) in calls {
            queued.push(self.deployment.queue(&self.chain.ctx(admin), target, payload)?);
        }
        self.chain.sleep(self.deployment.params().time_lock_delay);
        for call in &queued {
            self.deployment.execute(&self.chain.ctx(admin), call)?;
        }
        Ok(())
    }

    fn account(&mut self, name: &str) -> Address {
        *self
            .accounts
            .entry(name.to_string())
            .or_insert_with(|| Address::from_label(name))
    }

    fn strategy(&self, name: &str) -> Result<&StrategyHandle> {
        self.strategies
            .get(name)
            .ok_or_else(|| anyhow!("unknown strategy `{name}`"))
    }

    /// Drains contract events into the run log and the metrics.
    fn collect(&mut self) {
        let mut events = self.deployment.time_lock.take_events();
        events.extend(self.deployment.vault.take_events());
        self.metrics.record_events(&events);
        self.metrics.observe(&self.deployment.vault);
        self.events.extend(events);
    }
}
