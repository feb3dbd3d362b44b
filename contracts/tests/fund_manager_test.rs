//! Integration tests for the fund manager.
//!
//! Drives the allocator directly with an explicit reserve: strategy
//! approval, debt ratios, borrow capacity, reports, skims and the ledger
//! invariants that must hold after every call.

use vault_contracts::fund_manager::StrategyRecord;
use vault_contracts::reserve::Reserve;
use vault_contracts::{
    ErrorKind, Event, FundManager, FundManagerError, HoldStrategy, Recovery, ReportRequest,
    StrategyAdapter, YieldPool,
};
use vault_protocol::config::{MAX_BPS, MAX_QUEUE};
use vault_protocol::{Address, Amount, Chain};

fn governor() -> Address {
    Address::from_label("governor")
}

fn vault() -> Address {
    Address::from_label("vault")
}

fn token() -> Address {
    Address::from_label("token")
}

/// Helper: a fund manager governed by [`governor`] and a reserve holding
/// `idle`.
fn setup(idle: Amount) -> (FundManager, Reserve, Chain) {
    let fm = FundManager::new(Address::from_label("fm"), vault(), token(), governor());
    let mut reserve = Reserve::new();
    reserve.credit(idle).unwrap();
    (fm, reserve, Chain::new(10_000))
}

/// Helper: attaches, approves and activates a strategy at `debt_ratio`.
fn add(
    fm: &mut FundManager,
    chain: &Chain,
    label: &str,
    debt_ratio: u32,
) -> (Address, YieldPool) {
    add_with(fm, chain, label, debt_ratio, 0)
}

fn add_with(
    fm: &mut FundManager,
    chain: &Chain,
    label: &str,
    debt_ratio: u32,
    buffer_bps: u32,
) -> (Address, YieldPool) {
    let ctx = chain.ctx(governor());
    let pool = YieldPool::new();
    let strategy = Address::from_label(label);
    let adapter =
        HoldStrategy::new(strategy, vault(), token(), pool.clone()).with_buffer(buffer_bps);
    fm.attach_strategy(Box::new(adapter)).unwrap();
    fm.approve_strategy(&ctx, strategy).unwrap();
    let position = fm.queue().len();
    fm.add_strategy_to_queue(&ctx, strategy, position, 0, Amount::MAX)
        .unwrap();
    fm.set_debt_ratio(&ctx, strategy, debt_ratio).unwrap();
    (strategy, pool)
}

// ---------------------------------------------------------------------------
// Approval Tests
// ---------------------------------------------------------------------------

#[test]
fn approve_strategy_requires_time_lock() {
    let (mut fm, _reserve, chain) = setup(0);
    let strategy = Address::from_label("s");
    fm.attach_strategy(Box::new(HoldStrategy::new(
        strategy,
        vault(),
        token(),
        YieldPool::new(),
    )))
    .unwrap();

    let err = fm
        .approve_strategy(&chain.ctx(Address::from_label("user")), strategy)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(fm.strategy(&strategy).is_none());
}

#[test]
fn approve_strategy_rejects_foreign_vault_and_token() {
    let (mut fm, _reserve, chain) = setup(0);
    let ctx = chain.ctx(governor());

    let wrong_vault = Address::from_label("wrong-vault");
    fm.attach_strategy(Box::new(HoldStrategy::new(
        wrong_vault,
        Address::from_label("other-vault"),
        token(),
        YieldPool::new(),
    )))
    .unwrap();
    assert!(matches!(
        fm.approve_strategy(&ctx, wrong_vault),
        Err(FundManagerError::VaultMismatch { .. })
    ));

    let wrong_token = Address::from_label("wrong-token");
    fm.attach_strategy(Box::new(HoldStrategy::new(
        wrong_token,
        vault(),
        Address::from_label("other-token"),
        YieldPool::new(),
    )))
    .unwrap();
    assert!(matches!(
        fm.approve_strategy(&ctx, wrong_token),
        Err(FundManagerError::TokenMismatch { .. })
    ));
}

#[test]
fn approve_strategy_records_inactive_entry() {
    let (mut fm, _reserve, chain) = setup(0);
    let ctx = chain.ctx(governor());
    let strategy = Address::from_label("s");
    fm.attach_strategy(Box::new(HoldStrategy::new(
        strategy,
        vault(),
        token(),
        YieldPool::new(),
    )))
    .unwrap();

    fm.approve_strategy(&ctx, strategy).unwrap();
    assert_eq!(
        fm.strategy(&strategy),
        Some(&StrategyRecord {
            approved: true,
            ..StrategyRecord::default()
        })
    );
    assert_eq!(
        fm.take_events(),
        vec![Event::ApproveStrategy { strategy }]
    );

    assert_eq!(
        fm.approve_strategy(&ctx, strategy),
        Err(FundManagerError::AlreadyApproved(strategy))
    );
}

// ---------------------------------------------------------------------------
// Debt Ratio / Queue Tests
// ---------------------------------------------------------------------------

#[test]
fn total_debt_ratio_is_bounded() {
    let (mut fm, _reserve, chain) = setup(0);
    let (a, _) = add(&mut fm, &chain, "a", 6_000);
    let (b, _) = add(&mut fm, &chain, "b", 4_000);
    assert_eq!(fm.total_debt_ratio(), MAX_BPS);

    assert_eq!(
        fm.set_debt_ratio(&chain.ctx(governor()), b, 4_001),
        Err(FundManagerError::DebtRatioExceeded {
            total: 10_001,
            max: MAX_BPS,
        })
    );

    // Lowering one ratio frees room for the other.
    fm.set_debt_ratio(&chain.ctx(governor()), a, 1_000).unwrap();
    fm.set_debt_ratio(&chain.ctx(governor()), b, 9_000).unwrap();
    assert_eq!(fm.total_debt_ratio(), MAX_BPS);
    fm.check_invariants().unwrap();
}

#[test]
fn removing_strategy_releases_ratio() {
    let (mut fm, _reserve, chain) = setup(0);
    let (a, _) = add(&mut fm, &chain, "a", 3_000);
    let (b, _) = add(&mut fm, &chain, "b", 2_000);

    fm.remove_strategy_from_queue(&chain.ctx(governor()), a)
        .unwrap();
    assert_eq!(fm.total_debt_ratio(), 2_000);
    assert_eq!(fm.queue(), &[b]);
    let record = fm.strategy(&a).unwrap();
    assert!(record.approved);
    assert!(!record.active);
    fm.check_invariants().unwrap();

    // Inactive strategies can be revoked, active ones cannot.
    fm.revoke_strategy(&chain.ctx(governor()), a).unwrap();
    assert_eq!(
        fm.revoke_strategy(&chain.ctx(governor()), b),
        Err(FundManagerError::AlreadyActive(b))
    );
}

#[test]
fn removing_indebted_strategy_fails() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, _) = add(&mut fm, &chain, "a", 5_000);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();

    assert_eq!(
        fm.remove_strategy_from_queue(&chain.ctx(governor()), a),
        Err(FundManagerError::OutstandingDebt {
            strategy: a,
            debt: 500,
        })
    );
}

#[test]
fn queue_is_bounded_and_reordered_by_permutation_only() {
    let (mut fm, _reserve, chain) = setup(0);
    let ctx = chain.ctx(governor());
    let strategies: Vec<Address> = (0..MAX_QUEUE)
        .map(|i| add(&mut fm, &chain, &format!("s{i}"), 0).0)
        .collect();

    let extra = Address::from_label("extra");
    fm.attach_strategy(Box::new(HoldStrategy::new(
        extra,
        vault(),
        token(),
        YieldPool::new(),
    )))
    .unwrap();
    fm.approve_strategy(&ctx, extra).unwrap();
    assert_eq!(
        fm.add_strategy_to_queue(&ctx, extra, 0, 0, 0),
        Err(FundManagerError::QueueFull { max: MAX_QUEUE })
    );

    let mut reversed = strategies.clone();
    reversed.reverse();
    fm.set_queue(&ctx, reversed.clone()).unwrap();
    assert_eq!(fm.queue(), reversed.as_slice());

    let mut duplicated = strategies.clone();
    duplicated[0] = duplicated[1];
    assert_eq!(
        fm.set_queue(&ctx, duplicated),
        Err(FundManagerError::NotPermutation)
    );
    assert_eq!(
        fm.set_queue(&ctx, strategies[1..].to_vec()),
        Err(FundManagerError::NotPermutation)
    );
    fm.check_invariants().unwrap();
}

// ---------------------------------------------------------------------------
// Borrow Capacity Tests
// ---------------------------------------------------------------------------

#[test]
fn max_borrow_follows_ratio_idle_and_bounds() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, _) = add(&mut fm, &chain, "a", 3_000);
    let (b, _) = add(&mut fm, &chain, "b", 2_000);

    assert_eq!(fm.calc_max_borrow(&a, reserve.balance()).unwrap(), 300);
    assert_eq!(fm.calc_max_borrow(&b, reserve.balance()).unwrap(), 200);

    fm.set_harvest_bounds(&chain.ctx(governor()), a, 0, 50)
        .unwrap();
    assert_eq!(fm.calc_max_borrow(&a, reserve.balance()).unwrap(), 50);

    let lent = fm
        .allocate(&chain.ctx(governor()), b, Amount::MAX, 0, &mut reserve)
        .unwrap();
    assert_eq!(lent, 200);
    assert_eq!(fm.calc_max_borrow(&b, reserve.balance()).unwrap(), 0);
    assert_eq!(reserve.balance(), 800);
    assert_eq!(fm.total_debt(), 200);
}

#[test]
fn allocate_below_minimum_fails_without_change() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, pool) = add(&mut fm, &chain, "a", 1_000);

    assert_eq!(
        fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 101, &mut reserve),
        Err(FundManagerError::BorrowBelowMinimum {
            borrow: 100,
            min_out: 101,
        })
    );
    assert_eq!(reserve.balance(), 1_000);
    assert_eq!(pool.balance(), 0);
    assert_eq!(fm.strategy(&a).unwrap().debt, 0);
}

#[test]
fn strangers_cannot_allocate() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, _) = add(&mut fm, &chain, "a", 1_000);
    let err = fm
        .allocate(
            &chain.ctx(Address::from_label("user")),
            a,
            Amount::MAX,
            0,
            &mut reserve,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    // The strategy itself may pull its own allocation.
    assert_eq!(
        fm.allocate(&chain.ctx(a), a, Amount::MAX, 0, &mut reserve)
            .unwrap(),
        100
    );
}

// ---------------------------------------------------------------------------
// Report Tests
// ---------------------------------------------------------------------------

#[test]
fn report_gain_credits_reserve_and_keeps_debt() {
    let (mut fm, mut reserve, mut chain) = setup(1_000);
    // Fully liquid strategy so the gain can be paid out at once.
    let (a, pool) = add_with(&mut fm, &chain, "a", 5_000, MAX_BPS);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();
    fm.take_events();

    let gain = 40;
    pool.accrue(gain).unwrap();
    chain.sleep(3_600);
    let before = reserve.balance();

    let event = fm
        .report(
            &chain.ctx(a),
            ReportRequest {
                gain,
                ..ReportRequest::default()
            },
            &mut reserve,
        )
        .unwrap();

    assert!(event.gain >= gain);
    assert_eq!(event.loss, 0);
    assert!(event.free >= gain);
    assert_eq!(event.debt, 500);
    assert_eq!(reserve.balance(), before + gain);

    let record = fm.strategy(&a).unwrap();
    assert_eq!(record.debt, 500);
    assert_eq!(record.total_gain, gain);
    assert_eq!(record.last_report, chain.now());
    assert!(fm
        .take_events()
        .contains(&Event::Report {
            strategy: a,
            report: event,
        }));
    fm.check_invariants().unwrap();
}

#[test]
fn rejected_report_changes_nothing() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, _) = add(&mut fm, &chain, "a", 5_000);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();
    fm.take_events();
    let record = *fm.strategy(&a).unwrap();

    assert_eq!(
        fm.report(
            &chain.ctx(a),
            ReportRequest {
                loss: 501,
                ..ReportRequest::default()
            },
            &mut reserve,
        ),
        Err(FundManagerError::LossExceedsDebt {
            loss: 501,
            debt: 500,
        })
    );
    assert_eq!(
        fm.report(
            &chain.ctx(a),
            ReportRequest {
                gain: 1,
                ..ReportRequest::default()
            },
            &mut reserve,
        ),
        Err(FundManagerError::GainExceedsLiquid { gain: 1, liquid: 0 })
    );
    assert_eq!(fm.strategy(&a), Some(&record));
    assert_eq!(reserve.balance(), 500);
    assert!(fm.take_events().is_empty());
}

#[test]
fn only_active_strategy_may_report() {
    let (mut fm, mut reserve, chain) = setup(0);
    let err = fm
        .report(
            &chain.ctx(Address::from_label("impostor")),
            ReportRequest::default(),
            &mut reserve,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn harvested_loss_shrinks_debt_and_ratio() {
    let (mut fm, mut reserve, mut chain) = setup(1_000);
    let (a, pool) = add(&mut fm, &chain, "a", 5_000);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();

    pool.slash(200);
    chain.sleep(3_600);
    let event = fm
        .harvest(&chain.ctx(governor()), a, false, &mut reserve)
        .unwrap();

    assert_eq!(event.loss, 200);
    assert_eq!(event.gain, 0);
    let record = fm.strategy(&a).unwrap();
    assert_eq!(record.debt, 300);
    assert_eq!(record.total_loss, 200);
    // 200 of 500 total debt lost: 40% of the 5000 bps total.
    assert_eq!(record.debt_ratio, 3_000);
    assert_eq!(fm.total_debt_ratio(), 3_000);
    fm.check_invariants().unwrap();
}

#[test]
fn harvest_repays_debt_over_entitlement() {
    let (mut fm, mut reserve, mut chain) = setup(1_000);
    let (a, _) = add(&mut fm, &chain, "a", 5_000);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();

    fm.set_debt_ratio(&chain.ctx(governor()), a, 1_000).unwrap();
    assert_eq!(fm.calc_outstanding_debt(&a, reserve.balance()).unwrap(), 400);

    chain.sleep(3_600);
    let event = fm
        .harvest(&chain.ctx(governor()), a, false, &mut reserve)
        .unwrap();
    assert_eq!(event.free, 400);
    assert_eq!(event.debt, 100);
    assert_eq!(reserve.balance(), 900);
    assert_eq!(fm.calc_outstanding_debt(&a, reserve.balance()).unwrap(), 0);
}

#[test]
fn harvest_with_borrow_tops_up_to_entitlement() {
    let (mut fm, mut reserve, mut chain) = setup(1_000);
    let (a, _) = add(&mut fm, &chain, "a", 2_000);

    chain.sleep(3_600);
    let event = fm
        .harvest(&chain.ctx(governor()), a, true, &mut reserve)
        .unwrap();
    assert_eq!(event.debt, 200);
    assert_eq!(reserve.balance(), 800);
}

// ---------------------------------------------------------------------------
// Skim / Withdraw Tests
// ---------------------------------------------------------------------------

#[test]
fn skim_keeps_ninety_nine_percent_in_the_strategy() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, pool) = add(&mut fm, &chain, "a", 10_000);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();
    pool.accrue(1_000).unwrap();

    let before = fm.adapter(&a).unwrap().total_assets();
    assert_eq!(before, 2_000);
    let profit = fm
        .skim(&chain.ctx(Address::from_label("anyone")), a, &mut reserve)
        .unwrap();
    let after = fm.adapter(&a).unwrap().total_assets();

    assert!(profit > 0);
    assert_eq!(profit, 20);
    assert!(after * 100 >= before * 99);
    assert_eq!(reserve.balance(), profit);
    assert_eq!(fm.strategy(&a).unwrap().debt, 1_000);
    assert_eq!(fm.total_debt(), 1_000);
    assert!(fm
        .take_events()
        .contains(&Event::Skim { strategy: a, profit: 20 }));
    fm.check_invariants().unwrap();
}

#[test]
fn small_surplus_is_skimmed_whole() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, pool) = add(&mut fm, &chain, "a", 10_000);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();
    pool.accrue(5).unwrap();

    let profit = fm
        .skim(&chain.ctx(Address::from_label("anyone")), a, &mut reserve)
        .unwrap();
    assert_eq!(profit, 5);
    assert_eq!(fm.adapter(&a).unwrap().total_assets(), 1_000);
}

#[test]
fn skim_without_surplus_fails() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, _) = add(&mut fm, &chain, "a", 10_000);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();
    let err = fm
        .skim(&chain.ctx(governor()), a, &mut reserve)
        .unwrap_err();
    assert!(matches!(err, FundManagerError::Strategy { .. }));
    assert_eq!(reserve.balance(), 0);
}

#[test]
fn withdraw_visits_queue_in_order() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, _) = add(&mut fm, &chain, "a", 3_000);
    let (b, _) = add(&mut fm, &chain, "b", 3_000);
    let ctx = chain.ctx(governor());
    fm.allocate(&ctx, a, Amount::MAX, 0, &mut reserve).unwrap();
    fm.allocate(&ctx, b, Amount::MAX, 0, &mut reserve).unwrap();
    assert_eq!(reserve.balance(), 400);

    let recovery = fm
        .withdraw(&chain.ctx(vault()), 400, &mut reserve)
        .unwrap();
    assert_eq!(recovery.recovered, 400);
    assert_eq!(recovery.loss, 0);
    assert_eq!(fm.strategy(&a).unwrap().debt, 0);
    assert_eq!(fm.strategy(&b).unwrap().debt, 200);
    assert_eq!(reserve.balance(), 800);

    let err = fm
        .withdraw(&chain.ctx(governor()), 1, &mut reserve)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    fm.check_invariants().unwrap();
}

#[test]
fn withdraw_realizes_exit_fee_as_loss() {
    let (mut fm, mut reserve, chain) = setup(1_000);
    let (a, pool) = add(&mut fm, &chain, "a", 10_000);
    fm.allocate(&chain.ctx(governor()), a, Amount::MAX, 0, &mut reserve)
        .unwrap();
    pool.set_exit_fee(100).unwrap();

    let recovery = fm
        .withdraw(&chain.ctx(vault()), 1_000, &mut reserve)
        .unwrap();
    assert_eq!(
        recovery,
        Recovery {
            recovered: 990,
            loss: 10
        }
    );

    let record = fm.strategy(&a).unwrap();
    assert_eq!(record.debt, 0);
    assert_eq!(record.total_loss, 10);
    assert_eq!(record.debt_ratio, 9_900);
    assert_eq!(fm.total_debt(), 0);
    assert_eq!(reserve.balance(), 990);
    fm.check_invariants().unwrap();
}
