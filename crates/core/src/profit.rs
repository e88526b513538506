//! Liquidation profitability model.
//!
//! Pure with respect to its inputs: the only side effect is annotating a
//! [`Position`] with the computed breakdown.

use serde::Serialize;

use crate::config::ProfitConfig;
use crate::position::Position;
use crate::units::{self, BPS_DENOMINATOR};

/// Gas price and native asset price used to cost a liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketConditions {
    pub gas_price_wei: u128,
    /// USD with 8 decimals
    pub native_price_usd: i128,
}

/// Cost/benefit of liquidating one position. All USD values have 8 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfitBreakdown {
    pub debt_usd: i128,
    /// Bonus after capping. May be zero or negative.
    pub liquidation_bonus_usd: i128,
    pub total_seized_usd: i128,
    /// Seizure was limited by available collateral
    pub capped: bool,
    pub estimated_gas_units: u64,
    pub gas_cost_usd: i128,
    pub net_profit_usd: i128,
    pub is_profitable: bool,
}

impl ProfitBreakdown {
    pub fn net_profit_decimal(&self) -> f64 {
        units::usd_to_f64(self.net_profit_usd)
    }
}

/// Profitability calculator.
#[derive(Debug, Clone, Copy)]
pub struct ProfitCalculator {
    bonus_bps: i128,
    base_gas_units: u64,
    per_asset_gas_units: u64,
    min_profit_usd: i128,
}

impl ProfitCalculator {
    pub fn new(bonus_bps: u32, base_gas_units: u64, per_asset_gas_units: u64, min_profit_usd: i128) -> Self {
        Self {
            bonus_bps: bonus_bps as i128,
            base_gas_units,
            per_asset_gas_units,
            min_profit_usd,
        }
    }

    pub fn from_config(config: &ProfitConfig) -> Self {
        Self::new(
            config.liquidation_bonus_bps,
            config.base_gas_units,
            config.per_asset_gas_units,
            units::usd_from_f64(config.min_profit_usd),
        )
    }

    pub fn min_profit_usd(&self) -> i128 {
        self.min_profit_usd
    }

    /// Gas units for liquidating a position holding `asset_count` collateral assets.
    pub fn estimate_gas_units(&self, asset_count: usize) -> u64 {
        let per_asset = self
            .per_asset_gas_units
            .saturating_mul(asset_count as u64);
        self.base_gas_units.saturating_add(per_asset)
    }

    pub fn gas_cost_usd(&self, asset_count: usize, market: MarketConditions) -> i128 {
        units::gas_cost_usd(
            self.estimate_gas_units(asset_count),
            market.gas_price_wei,
            market.native_price_usd,
        )
    }

    /// Evaluate a liquidation of `borrowed_usd` debt against `collateral_usd`.
    pub fn evaluate(
        &self,
        collateral_usd: i128,
        borrowed_usd: i128,
        asset_count: usize,
        market: MarketConditions,
    ) -> ProfitBreakdown {
        let debt_usd = borrowed_usd.max(0);
        let collateral_usd = collateral_usd.max(0);

        let mut liquidation_bonus_usd = debt_usd.saturating_mul(self.bonus_bps) / BPS_DENOMINATOR;
        let mut total_seized_usd = debt_usd.saturating_add(liquidation_bonus_usd);

        // Never seize more than the position holds
        let capped = total_seized_usd > collateral_usd;
        if capped {
            total_seized_usd = collateral_usd;
            liquidation_bonus_usd = total_seized_usd - debt_usd;
        }

        let estimated_gas_units = self.estimate_gas_units(asset_count);
        let gas_cost_usd = units::gas_cost_usd(
            estimated_gas_units,
            market.gas_price_wei,
            market.native_price_usd,
        );

        let net_profit_usd = liquidation_bonus_usd.saturating_sub(gas_cost_usd);

        ProfitBreakdown {
            debt_usd,
            liquidation_bonus_usd,
            total_seized_usd,
            capped,
            estimated_gas_units,
            gas_cost_usd,
            net_profit_usd,
            is_profitable: net_profit_usd >= self.min_profit_usd,
        }
    }

    /// Evaluate `position` and store the result on it.
    pub fn annotate(&self, position: &mut Position, market: MarketConditions) -> ProfitBreakdown {
        let breakdown = self.evaluate(
            position.collateral_usd,
            position.borrowed_usd,
            position.asset_count(),
            market,
        );
        position.profit = Some(breakdown);
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{USD_SCALE, WEI_PER_GWEI};

    const fn usd(dollars: i128) -> i128 {
        dollars * USD_SCALE
    }

    fn calculator() -> ProfitCalculator {
        ProfitCalculator::new(1000, 300_000, 50_000, usd(5))
    }

    fn market() -> MarketConditions {
        MarketConditions {
            gas_price_wei: 20 * WEI_PER_GWEI,
            native_price_usd: usd(2000),
        }
    }

    #[test]
    fn test_bonus_without_capping() {
        let result = calculator().evaluate(usd(2000), usd(1500), 1, market());

        assert_eq!(result.liquidation_bonus_usd, usd(150));
        assert_eq!(result.total_seized_usd, usd(1650));
        assert!(!result.capped);
        assert!(result.total_seized_usd <= usd(2000));
    }

    #[test]
    fn test_undercollateralized_is_capped() {
        let result = calculator().evaluate(usd(1000), usd(1500), 1, market());

        assert_eq!(result.total_seized_usd, usd(1000));
        assert_eq!(result.liquidation_bonus_usd, usd(-500));
        assert!(result.capped);
        assert!(result.net_profit_usd < 0);
        assert!(!result.is_profitable);
    }

    #[test]
    fn test_seized_never_exceeds_collateral() {
        let calc = calculator();
        for collateral in [0, 1, usd(10), usd(1000), usd(1649), usd(1650), usd(5000)] {
            for debt in [0, 1, usd(10), usd(1500), usd(10_000)] {
                let result = calc.evaluate(collateral, debt, 2, market());
                assert!(
                    result.total_seized_usd <= collateral,
                    "seized {} > collateral {}",
                    result.total_seized_usd,
                    collateral
                );
            }
        }
    }

    #[test]
    fn test_gas_cost_increases_with_assets() {
        let calc = calculator();
        for k in 0..10 {
            assert!(calc.gas_cost_usd(k + 1, market()) > calc.gas_cost_usd(k, market()));
        }
    }

    #[test]
    fn test_zero_assets_still_pays_base_gas() {
        let calc = calculator();
        assert_eq!(calc.estimate_gas_units(0), 300_000);
        assert_eq!(calc.estimate_gas_units(1), 350_000);
        // 300k * 20 gwei * $2000 = $12
        assert_eq!(calc.gas_cost_usd(0, market()), usd(12));
    }

    #[test]
    fn test_min_profit_floor() {
        // $100 debt -> $10 bonus; 1 asset at 20 gwei -> $14 gas; net -$4
        let result = calculator().evaluate(usd(1000), usd(100), 1, market());
        assert_eq!(result.gas_cost_usd, usd(14));
        assert_eq!(result.net_profit_usd, usd(-4));
        assert!(!result.is_profitable);

        // $200 debt -> $20 bonus, net $6 >= $5 floor
        let result = calculator().evaluate(usd(1000), usd(200), 1, market());
        assert_eq!(result.net_profit_usd, usd(6));
        assert!(result.is_profitable);

        // Exactly at the floor counts as profitable
        let result = calculator().evaluate(usd(1000), usd(190), 1, market());
        assert_eq!(result.net_profit_usd, usd(5));
        assert!(result.is_profitable);
    }
}
