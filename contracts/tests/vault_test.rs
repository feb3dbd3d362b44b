//! Integration tests for the vault.
//!
//! Exercises deposits and withdrawals against strategies through a bound
//! fund manager, the fund manager switch rules and the role handoffs.

use vault_contracts::receipt::ShareToken;
use vault_contracts::strategy::StrategyError;
use vault_contracts::{
    ErrorKind, Event, FundManager, HoldStrategy, StrategyAdapter, StrategyReport, Vault,
    VaultError, YieldPool,
};
use vault_protocol::{Address, Amount, Chain};

fn deployer() -> Address {
    Address::from_label("deployer")
}

fn token() -> Address {
    Address::from_label("token")
}

fn vault_address() -> Address {
    Address::from_label("vault")
}

/// Helper: an unpaused vault without limit, governed by the deployer.
fn open_vault(chain: &Chain) -> Vault {
    let receipt = ShareToken::new(Address::from_label("share"), "Share", "SHR", vault_address());
    let mut vault = Vault::new(vault_address(), token(), Box::new(receipt), deployer()).unwrap();
    let ctx = chain.ctx(deployer());
    vault.set_pause(&ctx, false).unwrap();
    vault.set_deposit_limit(&ctx, Amount::MAX).unwrap();
    vault
}

/// Helper: binds a fund manager running one strategy at `debt_ratio`.
/// Returns the strategy address and its pool.
fn bind_strategy(vault: &mut Vault, chain: &Chain, debt_ratio: u32) -> (Address, YieldPool) {
    let pool = YieldPool::new();
    let strategy = Address::from_label("strategy");
    let adapter = HoldStrategy::new(strategy, vault_address(), token(), pool.clone());
    bind_adapter(vault, chain, Box::new(adapter), debt_ratio);
    (strategy, pool)
}

/// Helper: binds a fund manager running `adapter` at `debt_ratio`.
fn bind_adapter(
    vault: &mut Vault,
    chain: &Chain,
    adapter: Box<dyn StrategyAdapter>,
    debt_ratio: u32,
) {
    let ctx = chain.ctx(deployer());
    let fm_address = Address::from_label("fund-manager");
    let mut fm = FundManager::new(fm_address, vault_address(), token(), deployer());

    let strategy = fm.attach_strategy(adapter).unwrap();
    fm.approve_strategy(&ctx, strategy).unwrap();
    fm.add_strategy_to_queue(&ctx, strategy, 0, 0, Amount::MAX)
        .unwrap();
    fm.set_debt_ratio(&ctx, strategy, debt_ratio).unwrap();

    vault.attach_fund_manager(fm).unwrap();
    vault.set_fund_manager(&ctx, fm_address).unwrap();
}

/// Strategy whose funds stay locked: it holds them but never releases them.
#[derive(Debug)]
struct LockedStrategy {
    address: Address,
    locked: Amount,
}

impl LockedStrategy {
    fn new(address: Address) -> Self {
        Self { address, locked: 0 }
    }
}

impl StrategyAdapter for LockedStrategy {
    fn address(&self) -> Address {
        self.address
    }

    fn vault(&self) -> Address {
        vault_address()
    }

    fn token(&self) -> Address {
        token()
    }

    fn total_assets(&self) -> Amount {
        self.locked
    }

    fn liquid_balance(&self) -> Amount {
        0
    }

    fn deposit(&mut self, amount: Amount) -> Result<(), StrategyError> {
        self.locked += amount;
        Ok(())
    }

    fn withdraw(&mut self, _amount: Amount) -> Result<Amount, StrategyError> {
        Ok(0)
    }

    fn report(&mut self, _debt: Amount, _outstanding: Amount) -> Result<StrategyReport, StrategyError> {
        Ok(StrategyReport::default())
    }
}

// ---------------------------------------------------------------------------
// Deposit / Withdraw Tests
// ---------------------------------------------------------------------------

#[test]
fn first_deposit_mints_one_to_one() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let alice = Address::from_label("alice");

    let shares = vault.deposit(&chain.ctx(alice), 1_000).unwrap();
    assert_eq!(shares, 1_000);
    assert_eq!(vault.balance_of(&alice), 1_000);
    assert_eq!(vault.idle(), 1_000);
    assert_eq!(vault.price_per_share().unwrap(), 1_000_000);
}

#[test]
fn later_deposit_is_priced_by_total_assets() {
    let mut chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let (strategy, pool) = bind_strategy(&mut vault, &chain, 5_000);
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");

    vault.deposit(&chain.ctx(alice), 1_000).unwrap();
    vault
        .allocate(&chain.ctx(deployer()), strategy, Amount::MAX, 0)
        .unwrap();

    // Realize 100 of yield so a share is worth 1.1.
    pool.accrue(100).unwrap();
    chain.mine(1);
    vault
        .harvest(&chain.ctx(deployer()), strategy, false)
        .unwrap();
    assert_eq!(vault.total_assets(), 1_100);

    let shares = vault.deposit(&chain.ctx(bob), 1_100).unwrap();
    assert_eq!(shares, 1_000);
    assert_eq!(vault.receipt().total_supply(), 2_000);
}

#[test]
fn withdraw_pulls_from_strategy() {
    let mut chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let (strategy, pool) = bind_strategy(&mut vault, &chain, 8_000);
    let alice = Address::from_label("alice");

    vault.deposit(&chain.ctx(alice), 1_000).unwrap();
    let lent = vault
        .allocate(&chain.ctx(deployer()), strategy, Amount::MAX, 0)
        .unwrap();
    assert_eq!(lent, 800);
    assert_eq!(vault.idle(), 200);
    assert_eq!(pool.balance(), 800);

    chain.mine(1);
    let paid = vault.withdraw(&chain.ctx(alice), 1_000).unwrap();
    assert_eq!(paid, 1_000);
    assert_eq!(vault.balance_of(&alice), 0);
    assert_eq!(vault.total_debt(), 0);
    assert_eq!(vault.idle(), 0);
    vault.check_invariants().unwrap();
}

#[test]
fn unbacked_debt_is_charged_to_the_withdrawer() {
    let mut chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let (strategy, pool) = bind_strategy(&mut vault, &chain, 5_000);
    let alice = Address::from_label("alice");

    vault.deposit(&chain.ctx(alice), 1_000).unwrap();
    vault
        .allocate(&chain.ctx(deployer()), strategy, Amount::MAX, 0)
        .unwrap();

    // Half of the lent funds disappear before anyone reports it.
    assert_eq!(pool.slash(250), 250);

    chain.mine(1);
    let paid = vault.withdraw(&chain.ctx(alice), 1_000).unwrap();
    assert_eq!(paid, 750);
    assert_eq!(vault.balance_of(&alice), 0);
    assert_eq!(vault.receipt().total_supply(), 0);
    assert_eq!(vault.total_debt(), 0);
    assert_eq!(vault.idle(), 0);

    let record = *vault.fund_manager().unwrap().strategy(&strategy).unwrap();
    assert_eq!(record.total_loss, 250);
    assert_eq!(record.debt_ratio, 2_500);

    let withdrawals: Vec<_> = vault
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, Event::Withdraw { .. }))
        .collect();
    assert_eq!(
        withdrawals,
        vec![Event::Withdraw {
            account: alice,
            shares: 1_000,
            amount: 750,
        }]
    );
    vault.check_invariants().unwrap();
}

#[test]
fn exit_fee_on_withdraw_does_not_block_deposits() {
    let mut chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let (strategy, pool) = bind_strategy(&mut vault, &chain, 10_000);
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");

    vault.deposit(&chain.ctx(alice), 1_000).unwrap();
    vault
        .allocate(&chain.ctx(deployer()), strategy, Amount::MAX, 0)
        .unwrap();
    pool.set_exit_fee(100).unwrap();

    chain.mine(1);
    let paid = vault.withdraw(&chain.ctx(alice), 1_000).unwrap();
    assert_eq!(paid, 990);
    assert_eq!(vault.balance_of(&alice), 0);
    assert_eq!(vault.total_debt(), 0);

    chain.mine(1);
    vault
        .harvest(&chain.ctx(deployer()), strategy, false)
        .unwrap();
    assert_eq!(vault.total_assets(), 0);
    assert_eq!(vault.receipt().total_supply(), 0);

    assert_eq!(vault.deposit(&chain.ctx(bob), 500).unwrap(), 500);
    assert_eq!(vault.total_assets(), 500);
    assert_eq!(vault.share_value(500).unwrap(), 500);
    vault.check_invariants().unwrap();
}

#[test]
fn locked_funds_burn_only_what_was_paid() {
    let mut chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let strategy = Address::from_label("locked");
    bind_adapter(
        &mut vault,
        &chain,
        Box::new(LockedStrategy::new(strategy)),
        5_000,
    );
    let alice = Address::from_label("alice");

    vault.deposit(&chain.ctx(alice), 1_000).unwrap();
    vault
        .allocate(&chain.ctx(deployer()), strategy, Amount::MAX, 0)
        .unwrap();

    chain.mine(1);
    let paid = vault.withdraw(&chain.ctx(alice), 1_000).unwrap();
    assert_eq!(paid, 500);
    assert_eq!(vault.balance_of(&alice), 500);
    assert_eq!(vault.total_debt(), 500);
    assert_eq!(vault.idle(), 0);
    assert_eq!(vault.share_value(500).unwrap(), 500);

    let record = *vault.fund_manager().unwrap().strategy(&strategy).unwrap();
    assert_eq!(record.total_loss, 0);
    vault.check_invariants().unwrap();
}

#[test]
fn block_delay_applies_unless_whitelisted() {
    let mut chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let alice = Address::from_label("alice");

    vault.deposit(&chain.ctx(alice), 10).unwrap();
    let err = vault.deposit(&chain.ctx(alice), 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timing);
    assert!(vault.withdraw(&chain.ctx(alice), 10).is_err());

    vault
        .set_whitelist(&chain.ctx(deployer()), alice, true)
        .unwrap();
    vault.deposit(&chain.ctx(alice), 10).unwrap();

    vault
        .set_whitelist(&chain.ctx(deployer()), alice, false)
        .unwrap();
    chain.mine(1);
    vault.withdraw(&chain.ctx(alice), 20).unwrap();
}

#[test]
fn deposit_limit_counts_strategy_debt() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let (strategy, _pool) = bind_strategy(&mut vault, &chain, 10_000);
    vault
        .set_deposit_limit(&chain.ctx(deployer()), 1_000)
        .unwrap();

    vault
        .deposit(&chain.ctx(Address::from_label("alice")), 1_000)
        .unwrap();
    vault
        .allocate(&chain.ctx(deployer()), strategy, Amount::MAX, 0)
        .unwrap();
    assert_eq!(vault.idle(), 0);

    assert_eq!(
        vault.deposit(&chain.ctx(Address::from_label("bob")), 1),
        Err(VaultError::DepositLimit {
            total: 1_001,
            limit: 1_000,
        })
    );
}

#[test]
fn guardian_pauses_but_cannot_unpause() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let guardian = Address::from_label("guardian");
    vault
        .set_guardian(&chain.ctx(deployer()), guardian)
        .unwrap();

    vault.set_pause(&chain.ctx(guardian), true).unwrap();
    assert_eq!(
        vault.deposit(&chain.ctx(Address::from_label("alice")), 1),
        Err(VaultError::Paused)
    );
    assert_eq!(
        vault.set_pause(&chain.ctx(guardian), false),
        Err(VaultError::GuardianCannotUnpause)
    );
    vault.set_pause(&chain.ctx(deployer()), false).unwrap();
}

// ---------------------------------------------------------------------------
// Fund Manager Switch Tests
// ---------------------------------------------------------------------------

#[test]
fn set_fund_manager_requires_time_lock() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let fm = FundManager::new(
        Address::from_label("fm"),
        vault_address(),
        token(),
        deployer(),
    );
    let address = vault.attach_fund_manager(fm).unwrap();

    let err = vault
        .set_fund_manager(&chain.ctx(Address::from_label("user")), address)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn set_fund_manager_rejects_token_mismatch() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let fm = FundManager::new(
        Address::from_label("fm"),
        vault_address(),
        Address::from_label("other-token"),
        deployer(),
    );
    let address = vault.attach_fund_manager(fm).unwrap();

    assert!(matches!(
        vault.set_fund_manager(&chain.ctx(deployer()), address),
        Err(VaultError::TokenMismatch { .. })
    ));
    assert_eq!(vault.config().fund_manager, None);
}

#[test]
fn set_fund_manager_rejects_vault_mismatch() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let fm = FundManager::new(
        Address::from_label("fm"),
        Address::from_label("other-vault"),
        token(),
        deployer(),
    );
    let address = vault.attach_fund_manager(fm).unwrap();

    assert!(matches!(
        vault.set_fund_manager(&chain.ctx(deployer()), address),
        Err(VaultError::VaultMismatch { .. })
    ));
}

#[test]
fn set_fund_manager_binds_and_rejects_current() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    vault.take_events();
    let fm = FundManager::new(
        Address::from_label("fm"),
        vault_address(),
        token(),
        deployer(),
    );
    let address = vault.attach_fund_manager(fm).unwrap();

    vault
        .set_fund_manager(&chain.ctx(deployer()), address)
        .unwrap();
    assert_eq!(vault.config().fund_manager, Some(address));
    assert_eq!(
        vault.take_events(),
        vec![Event::SetFundManager {
            fund_manager: address
        }]
    );

    assert_eq!(
        vault.set_fund_manager(&chain.ctx(deployer()), address),
        Err(VaultError::SameFundManager(address))
    );
}

#[test]
fn switch_refused_while_outgoing_has_debt() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    let (strategy, _pool) = bind_strategy(&mut vault, &chain, 5_000);
    vault
        .deposit(&chain.ctx(Address::from_label("alice")), 1_000)
        .unwrap();
    vault
        .allocate(&chain.ctx(deployer()), strategy, Amount::MAX, 0)
        .unwrap();

    let next = FundManager::new(
        Address::from_label("fm-2"),
        vault_address(),
        token(),
        deployer(),
    );
    let address = vault.attach_fund_manager(next).unwrap();
    assert_eq!(
        vault.set_fund_manager(&chain.ctx(deployer()), address),
        Err(VaultError::OutgoingDebt { debt: 500 })
    );
    assert!(vault.staged_fund_manager(&address).is_some());
}

// ---------------------------------------------------------------------------
// Role Handoff Tests
// ---------------------------------------------------------------------------

#[test]
fn set_next_admin_rules() {
    let chain = Chain::new(1_000);
    let mut vault = open_vault(&chain);
    vault.take_events();
    let next = Address::from_label("next-admin");

    let err = vault
        .set_next_admin(&chain.ctx(Address::from_label("user")), next)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    assert!(vault
        .set_next_admin(&chain.ctx(deployer()), deployer())
        .is_err());

    vault.set_next_admin(&chain.ctx(deployer()), next).unwrap();
    assert_eq!(vault.next_admin(), Some(next));
    assert_eq!(
        vault.take_events(),
        vec![Event::SetNextAdmin { candidate: next }]
    );

    assert!(vault.accept_admin(&chain.ctx(deployer())).is_err());
    vault.accept_admin(&chain.ctx(next)).unwrap();
    assert_eq!(vault.admin(), next);
    assert_eq!(vault.next_admin(), None);
}
