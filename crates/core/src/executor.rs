//! Gated liquidation executor.
//!
//! One attempt walks `Candidate -> Verified -> ProfitApproved -> GasApproved
//! -> BalanceApproved -> Submitted -> Confirmed | Reverted` and stops at the
//! first gate that does not pass. Every attempt ends in exactly one metrics
//! update. Nothing is retried here; a position that is still liquidatable
//! shows up again in the next monitor cycle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use lendforge_chain::{ChainState, TxOutcome};

use crate::assets::NATIVE_ASSET;
use crate::config::{ExecutionConfig, ProfitConfig};
use crate::position::Position;
use crate::profit::{MarketConditions, ProfitBreakdown, ProfitCalculator};
use crate::units::{self, HF_UNKNOWN};

/// Progress of one liquidation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStage {
    Candidate,
    Verified,
    ProfitApproved,
    GasApproved,
    BalanceApproved,
    Submitted,
    Confirmed,
    Reverted,
}

/// Reason code for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoLongerLiquidatable,
    NotProfitable,
    GasTooHigh,
    InsufficientBalance,
    TxFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoLongerLiquidatable => "no longer liquidatable",
            Self::NotProfitable => "not profitable",
            Self::GasTooHigh => "gas too high",
            Self::InsufficientBalance => "insufficient balance",
            Self::TxFailed => "tx failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal verdict of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verdict {
    Liquidated,
    Failed { reason: FailureReason, detail: String },
}

/// Result of [`Liquidator::execute`].
#[derive(Debug, Clone, Serialize)]
pub struct AttemptOutcome {
    pub user: Address,
    /// Last stage the attempt reached
    pub stage: AttemptStage,
    pub verdict: Verdict,
    pub profit: Option<ProfitBreakdown>,
    pub tx_hash: Option<B256>,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.verdict, Verdict::Liquidated)
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match &self.verdict {
            Verdict::Liquidated => None,
            Verdict::Failed { reason, .. } => Some(*reason),
        }
    }
}

/// Process-wide liquidation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidationMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    /// USD, 8 decimals
    pub total_profit_usd: i128,
    /// USD, 8 decimals
    pub total_gas_spent_usd: i128,
    pub failures_by_reason: BTreeMap<FailureReason, u64>,
}

/// Display-friendly view of [`LiquidationMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_liquidations: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate_percent: f64,
    pub total_profit_usd: f64,
    pub total_gas_spent_usd: f64,
    pub net_profit_usd: f64,
    pub failures_by_reason: BTreeMap<FailureReason, u64>,
}

/// Lock-guarded owner of [`LiquidationMetrics`]. Each update is applied
/// under one write lock, so readers see either the old or the new counters.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: RwLock<LiquidationMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_success(&self, profit_usd: i128, gas_cost_usd: i128) {
        let mut metrics = self.inner.write();
        metrics.total += 1;
        metrics.successful += 1;
        metrics.total_profit_usd = metrics.total_profit_usd.saturating_add(profit_usd);
        metrics.total_gas_spent_usd = metrics.total_gas_spent_usd.saturating_add(gas_cost_usd);
    }

    fn record_failure(&self, reason: FailureReason) {
        let mut metrics = self.inner.write();
        metrics.total += 1;
        metrics.failed += 1;
        *metrics.failures_by_reason.entry(reason).or_default() += 1;
    }

    pub fn snapshot(&self) -> LiquidationMetrics {
        self.inner.read().clone()
    }

    pub fn summary(&self) -> MetricsSummary {
        let m = self.snapshot();
        let success_rate_percent = if m.total > 0 {
            m.successful as f64 / m.total as f64 * 100.0
        } else {
            0.0
        };
        MetricsSummary {
            total_liquidations: m.total,
            successful: m.successful,
            failed: m.failed,
            success_rate_percent,
            total_profit_usd: units::usd_to_f64(m.total_profit_usd),
            total_gas_spent_usd: units::usd_to_f64(m.total_gas_spent_usd),
            net_profit_usd: units::usd_to_f64(m.total_profit_usd - m.total_gas_spent_usd),
            failures_by_reason: m.failures_by_reason,
        }
    }
}

/// Liquidation executor.
pub struct Liquidator {
    /// Chain reads and the liquidation write
    chain: Arc<dyn ChainState>,

    /// Profitability model
    calculator: ProfitCalculator,

    /// Gas price ceiling (wei)
    max_gas_price_wei: u128,

    /// Single writer for the wallet's nonce and balance
    write_lock: Mutex<()>,

    metrics: MetricsRecorder,
}

impl Liquidator {
    pub fn new(chain: Arc<dyn ChainState>, calculator: ProfitCalculator, max_gas_price_wei: u128) -> Self {
        Self {
            chain,
            calculator,
            max_gas_price_wei,
            write_lock: Mutex::new(()),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn from_config(chain: Arc<dyn ChainState>, profit: &ProfitConfig, execution: &ExecutionConfig) -> Self {
        Self::new(
            chain,
            ProfitCalculator::from_config(profit),
            units::gwei_to_wei(execution.max_gas_price_gwei),
        )
    }

    pub fn calculator(&self) -> &ProfitCalculator {
        &self.calculator
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Current gas price and native asset price. `None` if either read fails
    /// or the native price is zero or out of range.
    pub async fn market_conditions(&self) -> Option<MarketConditions> {
        let (gas_price, native_price) =
            tokio::join!(self.chain.gas_price(), self.chain.price(NATIVE_ASSET));

        match (gas_price, native_price) {
            (Ok(gas_price_wei), Ok(price)) => match units::usd_from_u256(price) {
                Some(native_price_usd) if native_price_usd > 0 => Some(MarketConditions {
                    gas_price_wei,
                    native_price_usd,
                }),
                _ => {
                    warn!(price = %price, "Native price unusable");
                    None
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Market data unavailable");
                None
            }
        }
    }

    /// Run one liquidation attempt for `position` and record its outcome.
    #[instrument(skip(self, position), fields(user = %position.user))]
    pub async fn execute(&self, position: &mut Position) -> AttemptOutcome {
        let outcome = self.attempt(position).await;

        match &outcome.verdict {
            Verdict::Liquidated => {
                let (profit, gas) = outcome
                    .profit
                    .map_or((0, 0), |p| (p.net_profit_usd, p.gas_cost_usd));
                self.metrics.record_success(profit, gas);
                info!(
                    user = %outcome.user,
                    tx_hash = ?outcome.tx_hash,
                    profit = format!("${:.2}", units::usd_to_f64(profit)),
                    "Liquidation confirmed"
                );
            }
            Verdict::Failed { reason, detail } => {
                self.metrics.record_failure(*reason);
                warn!(
                    user = %outcome.user,
                    stage = ?outcome.stage,
                    reason = %reason,
                    detail = %detail,
                    "Liquidation attempt failed"
                );
            }
        }

        outcome
    }

    async fn attempt(&self, position: &mut Position) -> AttemptOutcome {
        let user = position.user;
        let fail = |stage, reason, detail: String, profit, tx_hash| AttemptOutcome {
            user,
            stage,
            verdict: Verdict::Failed { reason, detail },
            profit,
            tx_hash,
        };

        // One attempt at a time, from the health factor re-read through the
        // receipt. A second attempt on the same account then sees the
        // post-liquidation state, and no two attempts share a balance or nonce.
        let _guard = self.write_lock.lock().await;

        // Candidate -> Verified
        let health_factor = match self.chain.health_factor(user).await {
            Ok(hf) => units::hf_from_u256(hf),
            Err(e) => {
                debug!(user = %user, error = %e, "Health factor re-read failed");
                HF_UNKNOWN
            }
        };
        position.health_factor = health_factor;
        if !position.is_liquidatable() {
            return fail(
                AttemptStage::Candidate,
                FailureReason::NoLongerLiquidatable,
                format!("health factor {:.2}", units::hf_to_f64(health_factor)),
                None,
                None,
            );
        }

        // Verified -> ProfitApproved
        let Some(market) = self.market_conditions().await else {
            return fail(
                AttemptStage::Verified,
                FailureReason::NotProfitable,
                "market data unavailable".to_string(),
                None,
                None,
            );
        };
        let profit = self.calculator.annotate(position, market);
        if !profit.is_profitable {
            return fail(
                AttemptStage::Verified,
                FailureReason::NotProfitable,
                format!(
                    "net ${:.2} below ${:.2}",
                    profit.net_profit_decimal(),
                    units::usd_to_f64(self.calculator.min_profit_usd())
                ),
                Some(profit),
                None,
            );
        }

        // ProfitApproved -> GasApproved
        if market.gas_price_wei > self.max_gas_price_wei {
            return fail(
                AttemptStage::ProfitApproved,
                FailureReason::GasTooHigh,
                format!(
                    "{:.2} gwei above {:.2} gwei",
                    units::wei_to_gwei(market.gas_price_wei),
                    units::wei_to_gwei(self.max_gas_price_wei)
                ),
                Some(profit),
                None,
            );
        }

        // GasApproved -> BalanceApproved
        let Some(value) = units::usd_to_wei(position.borrowed_usd, market.native_price_usd) else {
            return fail(
                AttemptStage::GasApproved,
                FailureReason::InsufficientBalance,
                "debt cannot be priced in native units".to_string(),
                Some(profit),
                None,
            );
        };
        let balance = match self.chain.balance(self.chain.wallet()).await {
            Ok(balance) => balance,
            Err(e) => {
                return fail(
                    AttemptStage::GasApproved,
                    FailureReason::InsufficientBalance,
                    format!("balance read failed: {e}"),
                    Some(profit),
                    None,
                );
            }
        };
        if balance < value {
            return fail(
                AttemptStage::GasApproved,
                FailureReason::InsufficientBalance,
                format!(
                    "need {:.6} ETH, have {:.6} ETH",
                    units::wei_to_eth(value),
                    units::wei_to_eth(balance)
                ),
                Some(profit),
                None,
            );
        }

        // BalanceApproved -> Submitted -> Confirmed | Reverted
        info!(
            user = %user,
            value_eth = units::wei_to_eth(value),
            expected_profit = format!("${:.2}", profit.net_profit_decimal()),
            "Submitting liquidation"
        );
        match self.chain.liquidate(user, value).await {
            Ok(TxOutcome::Confirmed { tx_hash, gas_used, .. }) => {
                debug!(tx_hash = %tx_hash, gas_used, "Receipt confirmed");
                AttemptOutcome {
                    user,
                    stage: AttemptStage::Confirmed,
                    verdict: Verdict::Liquidated,
                    profit: Some(profit),
                    tx_hash: Some(tx_hash),
                }
            }
            Ok(TxOutcome::Reverted { tx_hash, gas_used }) => fail(
                AttemptStage::Reverted,
                FailureReason::TxFailed,
                format!("reverted after {gas_used} gas"),
                Some(profit),
                Some(tx_hash),
            ),
            Err(e) => fail(
                AttemptStage::BalanceApproved,
                FailureReason::TxFailed,
                e.to_string(),
                Some(profit),
                None,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::ChainSnapshot;
    use crate::testing::{usd, FakeChain, FakeIndex};
    use crate::units::WEI_PER_GWEI;
    use alloy::primitives::address;
    use smallvec::SmallVec;

    const USER: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

    fn liquidator(chain: Arc<FakeChain>) -> Liquidator {
        Liquidator::new(
            chain,
            ProfitCalculator::new(1000, 300_000, 50_000, usd(5)),
            50 * WEI_PER_GWEI,
        )
    }

    fn candidate(collateral: i128, borrowed: i128) -> Position {
        let mut position = Position::from_index(&FakeIndex::record(USER, 0.9));
        position.apply_snapshot(ChainSnapshot {
            collateral_usd: collateral,
            borrowed_usd: borrowed,
            health_factor: 90,
            collaterals: SmallVec::new(),
        });
        position
    }

    /// A chain where USER is liquidatable and every gate passes.
    fn healthy_chain() -> FakeChain {
        FakeChain::new()
            .with_account(USER, 90, usd(20_000), usd(15_000), 1)
            .with_gas_price(20 * WEI_PER_GWEI)
            .with_native_price(usd(2000))
            .with_balance(U256::from(100u64) * units::WEI_PER_ETH)
    }

    fn assert_single_failure(liquidator: &Liquidator, reason: FailureReason) {
        let metrics = liquidator.metrics().snapshot();
        assert_eq!(metrics.total, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.successful, 0);
        assert_eq!(metrics.failures_by_reason.get(&reason), Some(&1));
    }

    #[tokio::test]
    async fn test_successful_liquidation() {
        let chain = Arc::new(healthy_chain());
        let executor = liquidator(chain.clone());
        let mut position = candidate(usd(20_000), usd(15_000));

        let outcome = executor.execute(&mut position).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.stage, AttemptStage::Confirmed);
        assert_eq!(chain.liquidate_calls(), 1);
        // $15000 at $2000 = 7.5 ETH
        assert_eq!(
            chain.last_liquidation_value(),
            Some(U256::from(7_500_000_000_000_000_000u128))
        );

        let metrics = executor.metrics().snapshot();
        let profit = outcome.profit.unwrap();
        assert_eq!(metrics.successful, 1);
        assert_eq!(metrics.failed, 0);
        assert_eq!(metrics.total_profit_usd, profit.net_profit_usd);
        assert_eq!(metrics.total_gas_spent_usd, profit.gas_cost_usd);
    }

    #[tokio::test]
    async fn test_recovered_position_is_not_submitted() {
        let chain = Arc::new(healthy_chain().with_health_factor(USER, 100));
        let executor = liquidator(chain.clone());

        let outcome = executor.execute(&mut candidate(usd(20_000), usd(15_000))).await;

        assert_eq!(outcome.failure_reason(), Some(FailureReason::NoLongerLiquidatable));
        assert_eq!(outcome.stage, AttemptStage::Candidate);
        assert_eq!(chain.liquidate_calls(), 0);
        assert_single_failure(&executor, FailureReason::NoLongerLiquidatable);
    }

    #[tokio::test]
    async fn test_unreadable_health_factor_reads_as_safe() {
        let chain = Arc::new(healthy_chain().failing_health_factor());
        let executor = liquidator(chain.clone());

        let outcome = executor.execute(&mut candidate(usd(20_000), usd(15_000))).await;

        assert_eq!(outcome.failure_reason(), Some(FailureReason::NoLongerLiquidatable));
        assert_eq!(chain.liquidate_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_attempts_on_same_user_submit_once() {
        let chain = Arc::new(healthy_chain().settling_liquidation());
        let executor = liquidator(chain.clone());
        let mut first = candidate(usd(20_000), usd(15_000));
        let mut second = candidate(usd(20_000), usd(15_000));

        let (a, b) = tokio::join!(executor.execute(&mut first), executor.execute(&mut second));

        assert_eq!(chain.liquidate_calls(), 1);
        let (won, lost) = if a.is_success() { (a, b) } else { (b, a) };
        assert!(won.is_success());
        assert_eq!(lost.failure_reason(), Some(FailureReason::NoLongerLiquidatable));
        assert_eq!(lost.stage, AttemptStage::Candidate);

        let metrics = executor.metrics().snapshot();
        assert_eq!(metrics.successful, 1);
        assert_eq!(metrics.failures_by_reason.get(&FailureReason::TxFailed), None);
    }

    #[tokio::test]
    async fn test_zero_native_price_is_unavailable_market_data() {
        let chain = Arc::new(healthy_chain().with_native_price(0));
        let executor = liquidator(chain.clone());

        assert!(executor.market_conditions().await.is_none());

        let outcome = executor.execute(&mut candidate(usd(20_000), usd(15_000))).await;
        assert_eq!(outcome.failure_reason(), Some(FailureReason::NotProfitable));
        assert_eq!(outcome.stage, AttemptStage::Verified);
        assert!(outcome.profit.is_none());
        assert!(matches!(
            &outcome.verdict,
            Verdict::Failed { detail, .. } if detail == "market data unavailable"
        ));
        assert_eq!(chain.liquidate_calls(), 0);
        assert_single_failure(&executor, FailureReason::NotProfitable);
    }

    #[tokio::test]
    async fn test_unprofitable_position_stops_at_profit_gate() {
        // $100 debt -> $10 bonus, $12 gas
        let chain = Arc::new(healthy_chain());
        let executor = liquidator(chain.clone());

        let outcome = executor.execute(&mut candidate(usd(1000), usd(100))).await;

        assert_eq!(outcome.failure_reason(), Some(FailureReason::NotProfitable));
        assert_eq!(outcome.stage, AttemptStage::Verified);
        assert!(outcome.profit.is_some());
        assert_eq!(chain.liquidate_calls(), 0);
        assert_single_failure(&executor, FailureReason::NotProfitable);
    }

    #[tokio::test]
    async fn test_gas_above_ceiling_stops_before_any_write() {
        let chain = Arc::new(healthy_chain().with_gas_price(80 * WEI_PER_GWEI));
        let executor = liquidator(chain.clone());
        let mut position = candidate(usd(20_000), usd(15_000));

        let outcome = executor.execute(&mut position).await;

        // Profitable even at 80 gwei, so only the gas gate can stop it
        assert!(position.is_profitable());
        assert_eq!(outcome.failure_reason(), Some(FailureReason::GasTooHigh));
        assert_eq!(outcome.stage, AttemptStage::ProfitApproved);
        assert_eq!(chain.liquidate_calls(), 0);
        assert_single_failure(&executor, FailureReason::GasTooHigh);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let chain = Arc::new(healthy_chain().with_balance(U256::from(1u64) * units::WEI_PER_ETH));
        let executor = liquidator(chain.clone());

        let outcome = executor.execute(&mut candidate(usd(20_000), usd(15_000))).await;

        assert_eq!(outcome.failure_reason(), Some(FailureReason::InsufficientBalance));
        assert_eq!(outcome.stage, AttemptStage::GasApproved);
        assert_eq!(chain.liquidate_calls(), 0);
        assert_single_failure(&executor, FailureReason::InsufficientBalance);
    }

    #[tokio::test]
    async fn test_send_error_is_tx_failed() {
        let chain = Arc::new(healthy_chain().failing_liquidation());
        let executor = liquidator(chain.clone());

        let outcome = executor.execute(&mut candidate(usd(20_000), usd(15_000))).await;

        assert_eq!(outcome.failure_reason(), Some(FailureReason::TxFailed));
        assert_eq!(outcome.stage, AttemptStage::BalanceApproved);
        assert_eq!(chain.liquidate_calls(), 1);
        assert_single_failure(&executor, FailureReason::TxFailed);
    }

    #[tokio::test]
    async fn test_reverted_transaction_is_tx_failed() {
        let chain = Arc::new(healthy_chain().reverting_liquidation());
        let executor = liquidator(chain.clone());

        let outcome = executor.execute(&mut candidate(usd(20_000), usd(15_000))).await;

        assert_eq!(outcome.failure_reason(), Some(FailureReason::TxFailed));
        assert_eq!(outcome.stage, AttemptStage::Reverted);
        assert!(outcome.tx_hash.is_some());
        assert_single_failure(&executor, FailureReason::TxFailed);
    }

    #[tokio::test]
    async fn test_missing_market_data_is_not_profitable() {
        let chain = Arc::new(healthy_chain().failing_gas_price());
        let executor = liquidator(chain.clone());

        let outcome = executor.execute(&mut candidate(usd(20_000), usd(15_000))).await;

        assert_eq!(outcome.failure_reason(), Some(FailureReason::NotProfitable));
        assert_eq!(chain.liquidate_calls(), 0);
    }

    #[test]
    fn test_metrics_summary() {
        let recorder = MetricsRecorder::new();
        recorder.record_success(usd(30), usd(10));
        recorder.record_failure(FailureReason::GasTooHigh);
        recorder.record_failure(FailureReason::GasTooHigh);
        recorder.record_failure(FailureReason::TxFailed);

        let summary = recorder.summary();
        assert_eq!(summary.total_liquidations, 4);
        assert_eq!(summary.successful, 1);
        assert!((summary.success_rate_percent - 25.0).abs() < 1e-9);
        assert!((summary.net_profit_usd - 20.0).abs() < 1e-9);
        assert_eq!(summary.failures_by_reason[&FailureReason::GasTooHigh], 2);
    }
}
