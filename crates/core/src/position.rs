//! Position data structures for borrower accounts.
//!
//! A [`Position`] is built fresh every cycle from an index record and then
//! overwritten with authoritative chain values. Nothing here survives the
//! cycle that created it.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use smallvec::SmallVec;

pub use lendforge_api::PositionStatus;
use lendforge_api::IndexedPosition;

use crate::assets::Asset;
use crate::profit::ProfitBreakdown;
use crate::units::{self, HF_ONE, HF_UNKNOWN};

/// Symbol reported for collateral the registry does not know.
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Liquidation rule on authoritative values: health factor strictly below
/// 1.00 and outstanding debt.
#[inline]
pub fn is_liquidatable(health_factor: u64, borrowed_usd: i128) -> bool {
    health_factor < HF_ONE && borrowed_usd > 0
}

/// One collateral balance, joined with its registry entry when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollateralHolding {
    pub asset: Address,
    /// Native token units
    pub amount: U256,
    /// `None` when the registry has no entry for `asset`
    pub config: Option<Asset>,
}

impl CollateralHolding {
    pub fn symbol(&self) -> &'static str {
        self.config.map_or(UNKNOWN_SYMBOL, |c| c.symbol)
    }

    /// Token amount as a decimal (display only). Unknown assets assume 18 decimals.
    pub fn amount_decimal(&self) -> f64 {
        let decimals = self.config.map_or(18, |c| c.decimals);
        units::amount_to_f64(self.amount, decimals)
    }
}

/// Authoritative values read from chain for one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub collateral_usd: i128,
    pub borrowed_usd: i128,
    pub health_factor: u64,
    pub collaterals: SmallVec<[CollateralHolding; 4]>,
}

/// A borrower's account for the current cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    /// Borrower address
    pub user: Address,
    /// Total collateral, USD with 8 decimals
    pub collateral_usd: i128,
    /// Outstanding debt, USD with 8 decimals
    pub borrowed_usd: i128,
    /// Authoritative health factor (100 = 1.00). [`HF_UNKNOWN`] until refreshed.
    pub health_factor: u64,
    pub status: PositionStatus,
    pub collaterals: SmallVec<[CollateralHolding; 4]>,
    /// Health factor the index reported. Logged, never used for decisions.
    pub index_health_factor: Option<f64>,
    /// Cycle-scoped profitability annotation
    pub profit: Option<ProfitBreakdown>,
}

impl Position {
    /// Provisional position from an index record.
    pub fn from_index(record: &IndexedPosition) -> Self {
        Self {
            user: record.user,
            collateral_usd: 0,
            borrowed_usd: i128::try_from(record.borrowed).unwrap_or(i128::MAX),
            health_factor: HF_UNKNOWN,
            status: record.status,
            collaterals: SmallVec::new(),
            index_health_factor: Some(record.health_factor),
            profit: None,
        }
    }

    /// Position known only by address, to be filled from chain.
    pub fn new(user: Address) -> Self {
        Self {
            user,
            collateral_usd: 0,
            borrowed_usd: 0,
            health_factor: HF_UNKNOWN,
            status: PositionStatus::Active,
            collaterals: SmallVec::new(),
            index_health_factor: None,
            profit: None,
        }
    }

    /// Overwrite with authoritative chain values. Clears any stale profit annotation.
    pub fn apply_snapshot(&mut self, snapshot: ChainSnapshot) {
        self.collateral_usd = snapshot.collateral_usd;
        self.borrowed_usd = snapshot.borrowed_usd;
        self.health_factor = snapshot.health_factor;
        self.collaterals = snapshot.collaterals;
        self.profit = None;
    }

    pub fn is_liquidatable(&self) -> bool {
        is_liquidatable(self.health_factor, self.borrowed_usd)
    }

    pub fn asset_count(&self) -> usize {
        self.collaterals.len()
    }

    /// Health factor as a decimal ratio.
    pub fn health_factor_decimal(&self) -> f64 {
        units::hf_to_f64(self.health_factor)
    }

    pub fn is_profitable(&self) -> bool {
        self.profit.as_ref().is_some_and(|p| p.is_profitable)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Position(user={}, HF={:.2}, debt=${:.2}, assets={})",
            self.user,
            self.health_factor_decimal(),
            units::usd_to_f64(self.borrowed_usd),
            self.asset_count()
        )
    }
}

/// Risk bucket by health factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// HF < 1.20
    High,
    /// HF < 1.50
    Medium,
    Low,
}

impl RiskLevel {
    pub fn from_health_factor(hf: u64) -> Self {
        if hf < 120 {
            Self::High
        } else if hf < 150 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Per-asset line of a [`PositionAnalysis`].
#[derive(Debug, Clone, Serialize)]
pub struct AssetBreakdown {
    pub asset: Address,
    pub symbol: &'static str,
    pub amount: f64,
    pub ltv_percent: Option<u8>,
    pub liquidation_threshold_percent: Option<u8>,
}

/// Multi-collateral risk summary of one position.
#[derive(Debug, Clone, Serialize)]
pub struct PositionAnalysis {
    pub user: Address,
    pub health_factor: f64,
    pub collateral_usd: f64,
    pub borrowed_usd: f64,
    pub max_borrow_usd: f64,
    /// borrowed / max borrow * 100 (0 when nothing can be borrowed)
    pub utilization_percent: f64,
    pub asset_count: usize,
    pub risk_level: RiskLevel,
    pub is_liquidatable: bool,
    /// (HF - 1.00) * 100, negative once liquidatable
    pub liquidation_distance_percent: f64,
    pub assets: Vec<AssetBreakdown>,
}

impl PositionAnalysis {
    pub fn new(position: &Position, max_borrow_usd: i128) -> Self {
        let utilization_percent = if max_borrow_usd > 0 {
            position.borrowed_usd as f64 / max_borrow_usd as f64 * 100.0
        } else {
            0.0
        };

        let assets = position
            .collaterals
            .iter()
            .map(|holding| AssetBreakdown {
                asset: holding.asset,
                symbol: holding.symbol(),
                amount: holding.amount_decimal(),
                ltv_percent: holding.config.map(|c| c.ltv_percent),
                liquidation_threshold_percent: holding.config.map(|c| c.liquidation_threshold_percent),
            })
            .collect();

        let health_factor = position.health_factor_decimal();

        Self {
            user: position.user,
            health_factor,
            collateral_usd: units::usd_to_f64(position.collateral_usd),
            borrowed_usd: units::usd_to_f64(position.borrowed_usd),
            max_borrow_usd: units::usd_to_f64(max_borrow_usd),
            utilization_percent,
            asset_count: position.asset_count(),
            risk_level: RiskLevel::from_health_factor(position.health_factor),
            is_liquidatable: position.is_liquidatable(),
            liquidation_distance_percent: (health_factor - 1.0) * 100.0,
            assets,
        }
    }
}
