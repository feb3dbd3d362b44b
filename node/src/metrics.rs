//! # Prometheus Metrics
//!
//! Gauges mirroring the vault's capital ledger, plus counters for replayed
//! scenario steps and emitted contract events. Rendered in the Prometheus
//! text exposition format when the simulator is run with `--metrics`.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the [`METRICS_NAMESPACE`] prefix so they do not collide with any default
//! global registry consumers.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use vault_contracts::{Event, Vault};
use vault_protocol::config::METRICS_NAMESPACE;
use vault_protocol::Amount;

/// Holds all Prometheus metric handles for a simulation run.
#[derive(Clone)]
pub struct VaultMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Idle reserve plus strategy debt.
    pub total_assets: IntGauge,
    /// Idle reserve held by the vault.
    pub idle_balance: IntGauge,
    /// Funds lent to strategies.
    pub total_debt: IntGauge,
    /// Sum of active debt ratios, in basis points.
    pub total_debt_ratio: IntGauge,
    /// Outstanding receipt-token supply.
    pub share_supply: IntGauge,
    /// Value of one million shares.
    pub price_per_share: IntGauge,
    /// Strategies in the allocation queue.
    pub active_strategies: IntGauge,
    /// Scenario steps applied successfully.
    pub steps_processed_total: IntCounter,
    /// Scenario steps that were rejected.
    pub step_failures_total: IntCounter,
    /// Contract events, labelled by event name.
    pub events_total: IntCounterVec,
}

/// Saturating conversion for gauge values.
fn gauge_value(amount: Amount) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

impl VaultMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some(METRICS_NAMESPACE.into()), None)
            .expect("failed to create prometheus registry");

        let gauge = |name: &str, help: &str| {
            let gauge = IntGauge::new(name, help).expect("metric creation");
            registry
                .register(Box::new(gauge.clone()))
                .expect("metric registration");
            gauge
        };
        let total_assets = gauge("total_assets", "Idle reserve plus strategy debt");
        let idle_balance = gauge("idle_balance", "Idle reserve held by the vault");
        let total_debt = gauge("total_debt", "Funds lent to strategies");
        let total_debt_ratio = gauge("total_debt_ratio_bps", "Sum of active debt ratios");
        let share_supply = gauge("share_supply", "Outstanding receipt-token supply");
        let price_per_share = gauge("price_per_share", "Value of one million shares");
        let active_strategies = gauge("active_strategies", "Strategies in the allocation queue");

        let steps_processed_total = IntCounter::new(
            "steps_processed_total",
            "Scenario steps applied successfully",
        )
        .expect("metric creation");
        registry
            .register(Box::new(steps_processed_total.clone()))
            .expect("metric registration");

        let step_failures_total =
            IntCounter::new("step_failures_total", "Scenario steps that were rejected")
                .expect("metric creation");
        registry
            .register(Box::new(step_failures_total.clone()))
            .expect("metric registration");

        let events_total = IntCounterVec::new(
            Opts::new("events_total", "Contract events emitted, by event name"),
            &["event"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(events_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            total_assets,
            idle_balance,
            total_debt,
            total_debt_ratio,
            share_supply,
            price_per_share,
            active_strategies,
            steps_processed_total,
            step_failures_total,
            events_total,
        }
    }

    /// Refreshes every gauge from the vault's current state.
    pub fn observe(&self, vault: &Vault) {
        self.total_assets.set(gauge_value(vault.total_assets()));
        self.idle_balance.set(gauge_value(vault.idle()));
        self.total_debt.set(gauge_value(vault.total_debt()));
        self.share_supply
            .set(gauge_value(vault.receipt().total_supply()));
        if let Ok(price) = vault.price_per_share() {
            self.price_per_share.set(gauge_value(price));
        }
        let (ratio, active) = vault
            .fund_manager()
            .map_or((0, 0), |fm| (fm.total_debt_ratio(), fm.queue().len()));
        self.total_debt_ratio.set(i64::from(ratio));
        self.active_strategies
            .set(i64::try_from(active).unwrap_or(i64::MAX));
    }

    /// Counts `events` by name.
    pub fn record_events(&self, events: &[Event]) {
        for event in events {
            self.events_total.with_label_values(&[event.name()]).inc();
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for VaultMetrics {
    fn default() -> Self {
        Self::new()
    }
}
