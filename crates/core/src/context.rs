//! Engine wiring.
//!
//! Built once at startup from the configured clients and handed to the
//! scheduler and the status surface. Tests build it from fakes.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use lendforge_api::{PositionIndex, PriceReference};
use lendforge_chain::ChainState;

use crate::assets::AssetRegistry;
use crate::config::BotConfig;
use crate::executor::Liquidator;
use crate::jobs::{MonitorJob, PriceCheckJob, RiskyRecheckJob};
use crate::monitor::PositionMonitor;
use crate::price_check::PriceDeviationCheck;
use crate::scheduler::Scheduler;
use crate::status::StatusReport;
use crate::units;

pub struct EngineContext {
    pub config: BotConfig,
    pub registry: Arc<AssetRegistry>,
    pub index: Arc<dyn PositionIndex>,
    pub chain: Arc<dyn ChainState>,
    pub executor: Arc<Liquidator>,
    pub monitor: Arc<PositionMonitor>,
    pub price_check: Arc<PriceDeviationCheck>,
}

impl EngineContext {
    pub fn new(
        config: BotConfig,
        registry: AssetRegistry,
        index: Arc<dyn PositionIndex>,
        chain: Arc<dyn ChainState>,
        prices: Arc<dyn PriceReference>,
    ) -> Self {
        let registry = Arc::new(registry);
        let executor = Arc::new(Liquidator::from_config(
            chain.clone(),
            &config.profit,
            &config.execution,
        ));
        let monitor = Arc::new(PositionMonitor::new(
            index.clone(),
            chain.clone(),
            registry.clone(),
            executor.clone(),
            config.monitor.clone(),
        ));
        let price_check = Arc::new(PriceDeviationCheck::new(
            chain.clone(),
            prices,
            registry.clone(),
            config.price_check.clone(),
        ));

        Self {
            config,
            registry,
            index,
            chain,
            executor,
            monitor,
            price_check,
        }
    }

    /// Scheduler with the monitor, risky re-check and price check registered.
    pub fn build_scheduler(&self) -> Scheduler {
        let intervals = &self.config.scheduler;
        let scheduler = Scheduler::new();
        scheduler.register(
            Arc::new(MonitorJob::new(self.monitor.clone())),
            intervals.monitor_interval(),
        );
        scheduler.register(
            Arc::new(RiskyRecheckJob::new(self.monitor.clone())),
            intervals.recheck_interval(),
        );
        scheduler.register(
            Arc::new(PriceCheckJob::new(self.price_check.clone())),
            intervals.price_check_interval(),
        );
        scheduler
    }

    pub async fn status_report(&self, scheduler: &Scheduler) -> StatusReport {
        let wallet = self.chain.wallet();
        let (totals, balance) =
            tokio::join!(self.monitor.protocol_totals(), self.chain.balance(wallet));

        let wallet_balance_eth = match balance {
            Ok(wei) => Some(units::wei_to_eth(wei)),
            Err(e) => {
                warn!(error = %e, "Wallet balance unavailable");
                None
            }
        };

        StatusReport {
            timestamp: Utc::now(),
            wallet,
            wallet_balance_eth,
            protocol: (&totals).into(),
            liquidations: self.executor.metrics().summary(),
            scheduler: scheduler.status(),
            config: (&self.config).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::jobs::{MONITOR_JOB, PRICE_CHECK_JOB, RECHECK_JOB};
    use crate::testing::{usd, FakeChain, FakeIndex, FakePrices};
    use crate::units::{WEI_PER_ETH, WEI_PER_GWEI};
    use alloy::primitives::{address, Address, U256};
    use lendforge_api::GlobalMetrics;

    const ALICE: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1");

    fn context(index: Arc<FakeIndex>) -> EngineContext {
        let chain = FakeChain::new()
            .with_account(ALICE, 90, usd(20_000), usd(15_000), 1)
            .with_gas_price(20 * WEI_PER_GWEI)
            .with_native_price(usd(2000))
            .with_balance(U256::from(50u64) * WEI_PER_ETH);
        EngineContext::new(
            BotConfig::default(),
            AssetRegistry::native_only(),
            index,
            Arc::new(chain),
            FakePrices::new(&[("ETH", 2000.0)]),
        )
    }

    #[tokio::test]
    async fn test_scheduler_has_three_jobs() {
        let ctx = context(Arc::new(FakeIndex::new()));
        let scheduler = ctx.build_scheduler();

        let status = scheduler.status();
        assert_eq!(status.jobs.len(), 3);
        assert_eq!(status.jobs[MONITOR_JOB].interval_secs, 30);
        assert_eq!(status.jobs[RECHECK_JOB].interval_secs, 60);
        assert_eq!(status.jobs[PRICE_CHECK_JOB].interval_secs, 300);
    }

    #[tokio::test]
    async fn test_manual_monitor_run_liquidates_and_reports() {
        let index = Arc::new(
            FakeIndex::new()
                .with_position(ALICE, 0.9)
                .with_metrics(GlobalMetrics {
                    total_users: 3,
                    ..Default::default()
                }),
        );
        let ctx = context(index);
        let scheduler = ctx.build_scheduler();

        let result = scheduler.run_now(MONITOR_JOB).await.unwrap();
        assert_eq!(result["liquidated"], 1);

        let report = ctx.status_report(&scheduler).await;
        assert_eq!(report.liquidations.successful, 1);
        assert_eq!(report.scheduler.jobs[MONITOR_JOB].runs, 1);
        assert_eq!(report.protocol.total_users, 3);
        assert_eq!(report.wallet_balance_eth, Some(50.0));
        assert_eq!(report.config.profile, "default");
    }

    #[tokio::test]
    async fn test_aborted_cycle_counts_as_job_error() {
        let index = Arc::new(FakeIndex::new().with_position(ALICE, 0.9));
        index.set_failing(true);
        let ctx = context(index);
        let scheduler = ctx.build_scheduler();

        let result = scheduler.run_now(MONITOR_JOB).await;

        assert!(matches!(result, Err(JobError::CycleAborted(_))));
        let stats = &scheduler.status().jobs[MONITOR_JOB];
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(ctx.executor.metrics().snapshot().total, 0);
    }

    #[tokio::test]
    async fn test_price_job_returns_report() {
        let ctx = context(Arc::new(FakeIndex::new()));
        let scheduler = ctx.build_scheduler();

        let result = scheduler.run_now(PRICE_CHECK_JOB).await.unwrap();
        assert_eq!(result["prices_checked"], 1);
        assert_eq!(result["high_deviations"], 0);
    }
}
