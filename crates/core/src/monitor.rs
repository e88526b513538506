//! Position monitor: reconciles index candidates against chain state.
//!
//! The index only nominates candidates. Every decision uses values read from
//! chain in the same cycle; the index health factor is carried for logging.
//! Chain reads for one candidate are not atomic, so a price update between
//! two calls can leave a snapshot slightly inconsistent. The next cycle
//! re-reads everything.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use parking_lot::RwLock;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, info, instrument, warn};

use lendforge_api::{
    GlobalMetrics, IndexError, IndexedPosition, LiquidationRecord, PositionIndex, PositionQuery,
};
use lendforge_chain::{ChainError, ChainState};

use crate::assets::AssetRegistry;
use crate::config::MonitorConfig;
use crate::executor::Liquidator;
use crate::position::{ChainSnapshot, CollateralHolding, Position, PositionAnalysis};
use crate::units;

/// Counts for one monitor cycle. Always returned, even when the cycle aborts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub candidates: usize,
    /// Candidates dropped because a chain read failed
    pub skipped: usize,
    pub liquidatable: usize,
    pub profitable: usize,
    pub liquidated: usize,
    /// Set when the candidate list could not be fetched
    pub error: Option<String>,
}

impl CycleReport {
    fn aborted(err: &IndexError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Default::default()
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }
}

/// Authoritative liquidatable set for one batch of candidates.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub liquidatable: Vec<Position>,
    pub skipped: usize,
}

/// Index record for one user next to the chain's view of it.
#[derive(Debug, Clone, Serialize)]
pub struct PositionLookup {
    /// Advisory; `None` when the index has no record
    pub indexed: Option<IndexedPosition>,
    /// `None` when the chain reads failed
    pub chain: Option<PositionAnalysis>,
}

pub struct PositionMonitor {
    index: Arc<dyn PositionIndex>,
    chain: Arc<dyn ChainState>,
    registry: Arc<AssetRegistry>,
    executor: Arc<Liquidator>,
    config: MonitorConfig,
    last_totals: RwLock<Option<GlobalMetrics>>,
}

impl PositionMonitor {
    pub fn new(
        index: Arc<dyn PositionIndex>,
        chain: Arc<dyn ChainState>,
        registry: Arc<AssetRegistry>,
        executor: Arc<Liquidator>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            index,
            chain,
            registry,
            executor,
            config,
            last_totals: RwLock::new(None),
        }
    }

    pub fn executor(&self) -> &Liquidator {
        &self.executor
    }

    /// One full cycle over all active debt-bearing positions.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleReport {
        let query = PositionQuery::active_with_debt(self.config.page_size);
        self.run_query("monitor", &query).await
    }

    /// Secondary pass over the index's own risky view.
    #[instrument(skip(self))]
    pub async fn run_risky_recheck(&self) -> CycleReport {
        let query =
            PositionQuery::risky(self.config.health_factor_threshold, self.config.risky_page_size);
        self.run_query("risky_recheck", &query).await
    }

    async fn run_query(&self, label: &'static str, query: &PositionQuery) -> CycleReport {
        let records = match self.index.positions(query).await {
            Ok(records) => records,
            Err(e) => {
                warn!(cycle = label, error = %e, "Candidate fetch failed, cycle aborted");
                return CycleReport::aborted(&e);
            }
        };

        let reconciliation = self.reconcile(&records).await;
        let mut report = CycleReport {
            candidates: records.len(),
            skipped: reconciliation.skipped,
            liquidatable: reconciliation.liquidatable.len(),
            profitable: reconciliation
                .liquidatable
                .iter()
                .filter(|p| p.is_profitable())
                .count(),
            ..Default::default()
        };

        // One at a time: the wallet is a single writer
        for mut position in reconciliation.liquidatable {
            let outcome = self.executor.execute(&mut position).await;
            if outcome.is_success() {
                report.liquidated += 1;
            }
        }

        info!(
            cycle = label,
            candidates = report.candidates,
            skipped = report.skipped,
            liquidatable = report.liquidatable,
            profitable = report.profitable,
            liquidated = report.liquidated,
            "Cycle complete"
        );
        report
    }

    /// Re-read every candidate from chain and keep the liquidatable ones,
    /// annotated with profitability when market data is available.
    ///
    /// Reads only; running it twice on unchanged chain state gives the same set.
    pub async fn reconcile(&self, records: &[IndexedPosition]) -> Reconciliation {
        let market = self.executor.market_conditions().await;
        let mut result = Reconciliation::default();

        for record in records {
            let mut position = Position::from_index(record);

            match self.snapshot(record.user).await {
                Ok(snapshot) => position.apply_snapshot(snapshot),
                Err(e) => {
                    warn!(user = %record.user, error = %e, "Chain read failed, skipping candidate");
                    result.skipped += 1;
                    continue;
                }
            }

            if !position.is_liquidatable() {
                if record.health_factor < self.config.health_factor_threshold {
                    debug!(
                        user = %record.user,
                        index_hf = record.health_factor,
                        chain_hf = position.health_factor_decimal(),
                        "Index reports risky, chain does not"
                    );
                }
                continue;
            }

            if let Some(market) = market {
                self.executor.calculator().annotate(&mut position, market);
            }

            info!(
                user = %position.user,
                hf = position.health_factor_decimal(),
                debt = format!("${:.2}", units::usd_to_f64(position.borrowed_usd)),
                profitable = position.is_profitable(),
                "Liquidatable position"
            );
            result.liquidatable.push(position);
        }

        result
    }

    /// Authoritative values for `user`.
    async fn snapshot(&self, user: Address) -> Result<ChainSnapshot, ChainError> {
        let (health_factor, collateral, position, balances) = tokio::try_join!(
            self.chain.health_factor(user),
            self.chain.collateral_value_usd(user),
            self.chain.position(user),
            self.chain.user_collaterals(user),
        )?;

        let collaterals: SmallVec<[CollateralHolding; 4]> = balances
            .into_iter()
            .map(|balance| CollateralHolding {
                asset: balance.asset,
                amount: balance.amount,
                config: self.registry.get(&balance.asset).ok().copied(),
            })
            .collect();

        Ok(ChainSnapshot {
            collateral_usd: usd_value(collateral, "getCollateralValueUSD")?,
            borrowed_usd: usd_value(position.borrowed_usd, "getPosition")?,
            health_factor: units::hf_from_u256(health_factor),
            collaterals,
        })
    }

    /// Multi-collateral risk summary for one user, read from chain.
    pub async fn analyze_position(&self, user: Address) -> Result<PositionAnalysis, ChainError> {
        let (snapshot, max_borrow) =
            tokio::try_join!(self.snapshot(user), self.chain.max_borrow_value(user))?;

        let mut position = Position::new(user);
        position.apply_snapshot(snapshot);
        Ok(PositionAnalysis::new(
            &position,
            usd_value(max_borrow, "getMaxBorrowValue")?,
        ))
    }

    /// Protocol totals from the index. Zeroed on failure; the last good value
    /// stays available through [`PositionMonitor::last_protocol_totals`].
    pub async fn protocol_totals(&self) -> GlobalMetrics {
        match self.index.global_metrics().await {
            Ok(totals) => {
                *self.last_totals.write() = Some(totals.clone());
                totals
            }
            Err(e) => {
                warn!(error = %e, "Protocol totals unavailable");
                GlobalMetrics::default()
            }
        }
    }

    pub fn last_protocol_totals(&self) -> Option<GlobalMetrics> {
        self.last_totals.read().clone()
    }

    /// Index record and chain analysis for `user`. Only an index failure is
    /// an error.
    pub async fn lookup_position(&self, user: Address) -> Result<PositionLookup, IndexError> {
        let (indexed, analysis) =
            tokio::join!(self.index.position(user), self.analyze_position(user));

        let chain = match analysis {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!(user = %user, error = %e, "Chain analysis unavailable");
                None
            }
        };
        Ok(PositionLookup {
            indexed: indexed?,
            chain,
        })
    }

    /// Most recent liquidations recorded by the index.
    pub async fn liquidation_history(&self, limit: usize) -> Result<Vec<LiquidationRecord>, IndexError> {
        self.index.liquidation_history(limit).await
    }

    /// The index's risky view, unverified.
    pub async fn risky_positions(&self, limit: usize) -> Result<Vec<IndexedPosition>, IndexError> {
        let query = PositionQuery::risky(self.config.health_factor_threshold, limit);
        self.index.positions(&query).await
    }
}

fn usd_value(value: U256, call: &'static str) -> Result<i128, ChainError> {
    units::usd_from_u256(value).ok_or_else(|| ChainError::Call {
        call,
        message: format!("USD value {value} out of range"),
    })
}
