//! Fixed-point conventions shared by the engine.
//!
//! - USD amounts are `i128` with 8 implied decimals (`100_000_000` = $1).
//!   Signed so that a capped liquidation bonus can go negative.
//! - Health factors are `u64` with 2 implied decimals (`100` = 1.00).
//! - Native amounts and gas prices are wei.
//!
//! Conversions that can overflow go through `U256` and saturate.

use alloy::primitives::U256;

/// USD fixed-point decimals (matches the protocol oracle).
pub const USD_DECIMALS: u8 = 8;

/// One US dollar in fixed point.
pub const USD_SCALE: i128 = 100_000_000;

/// Health factor of exactly 1.00.
pub const HF_ONE: u64 = 100;

/// Sentinel for a health factor that could not be read. Reads as "safe".
pub const HF_UNKNOWN: u64 = u64::MAX;

/// Basis points denominator (10000 = 100%).
pub const BPS_DENOMINATOR: i128 = 10_000;

/// Wei per gwei.
pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Wei per native token (1e18).
pub const WEI_PER_ETH: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Convert an on-chain USD value. `None` if it does not fit in `i128`.
#[inline]
pub fn usd_from_u256(value: U256) -> Option<i128> {
    if value > U256::from(i128::MAX as u128) {
        None
    } else {
        Some(value.to::<u128>() as i128)
    }
}

/// Convert an on-chain health factor, saturating at [`HF_UNKNOWN`].
#[inline]
pub fn hf_from_u256(value: U256) -> u64 {
    value.saturating_to()
}

/// Decimal dollars to fixed point.
///
/// Example: usd_from_f64(5.0) = 500_000_000
#[inline]
pub fn usd_from_f64(dollars: f64) -> i128 {
    (dollars * USD_SCALE as f64).round() as i128
}

/// Fixed point to decimal dollars (display and thresholds only).
#[inline]
pub fn usd_to_f64(value: i128) -> f64 {
    value as f64 / USD_SCALE as f64
}

/// Health factor as a decimal ratio.
#[inline]
pub fn hf_to_f64(hf: u64) -> f64 {
    hf as f64 / HF_ONE as f64
}

/// Decimal ratio to health factor fixed point.
#[inline]
pub fn hf_from_f64(ratio: f64) -> u64 {
    (ratio * HF_ONE as f64).round() as u64
}

#[inline]
pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * WEI_PER_GWEI as f64).round() as u128
}

#[inline]
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI as f64
}

/// Token amount with `decimals` as a float (display only).
pub fn amount_to_f64(amount: U256, decimals: u8) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    if amount <= U256::from(u128::MAX) {
        amount.to::<u128>() as f64 / scale
    } else {
        let limbs = amount.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        (high + limbs[0] as f64) / scale
    }
}

/// USD cost of `gas_units` at `gas_price_wei`, priced with the native asset.
///
/// Formula: ceil(units * gas_price * native_price / 10^18)
///
/// Example: 300k units at 20 gwei with ETH at $2000 = $12
///
/// Rounds up so a nonzero cost never reads as $0. Resolution is one
/// fixed-point unit ($0.00000001): extra gas units cost strictly more only
/// when they are worth at least that much.
pub fn gas_cost_usd(gas_units: u64, gas_price_wei: u128, native_price_usd: i128) -> i128 {
    if native_price_usd <= 0 {
        return 0;
    }

    let wei_usd = U256::from(gas_units)
        .saturating_mul(U256::from(gas_price_wei))
        .saturating_mul(U256::from(native_price_usd as u128));
    let mut cost = wei_usd / WEI_PER_ETH;
    if !(wei_usd % WEI_PER_ETH).is_zero() {
        cost += U256::from(1u8);
    }

    usd_from_u256(cost).unwrap_or(i128::MAX)
}

/// Native wei needed to cover `usd` at `native_price_usd`.
///
/// Returns `None` for a negative amount or a non-positive price.
pub fn usd_to_wei(usd: i128, native_price_usd: i128) -> Option<U256> {
    if usd < 0 || native_price_usd <= 0 {
        return None;
    }
    Some(U256::from(usd as u128) * WEI_PER_ETH / U256::from(native_price_usd as u128))
}

/// Native wei to decimal tokens (display only).
#[inline]
pub fn wei_to_eth(wei: U256) -> f64 {
    amount_to_f64(wei, 18)
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn usd(dollars: i128) -> i128 {
        dollars * USD_SCALE
    }

    #[test]
    fn test_gas_cost_usd() {
        // 300_000 * 20 gwei = 0.006 ETH, at $2000 = $12
        let cost = gas_cost_usd(300_000, 20 * WEI_PER_GWEI, usd(2000));
        assert_eq!(cost, usd(12));

        assert_eq!(gas_cost_usd(300_000, 20 * WEI_PER_GWEI, 0), 0);
        assert_eq!(gas_cost_usd(0, 20 * WEI_PER_GWEI, usd(2000)), 0);
    }

    #[test]
    fn test_gas_cost_rounds_up_at_resolution_floor() {
        // 300_000 * 1 wei * $2000 / 1e18 = $0.0000000006, below one unit
        assert_eq!(gas_cost_usd(300_000, 1, usd(2000)), 1);
        assert_eq!(gas_cost_usd(350_000, 1, usd(2000)), 1);

        // 50_000 extra units at 100 wei and $2000 are worth exactly one unit
        let base = gas_cost_usd(300_000, 100, usd(2000));
        assert_eq!(base, 6);
        assert_eq!(gas_cost_usd(350_000, 100, usd(2000)), 7);
    }

    #[test]
    fn test_gas_cost_strictly_increasing_at_low_gas_price() {
        for k in 0..20u64 {
            let cost = |n: u64| gas_cost_usd(300_000 + n * 50_000, WEI_PER_GWEI / 10, usd(2000));
            assert!(cost(k + 1) > cost(k));
        }
    }

    #[test]
    fn test_gas_cost_saturates() {
        let cost = gas_cost_usd(u64::MAX, u128::MAX, i128::MAX);
        assert_eq!(cost, i128::MAX);
    }

    #[test]
    fn test_usd_to_wei() {
        // $1500 at $2000/ETH = 0.75 ETH
        let wei = usd_to_wei(usd(1500), usd(2000)).unwrap();
        assert_eq!(wei, U256::from(750_000_000_000_000_000u128));

        assert!(usd_to_wei(usd(1), 0).is_none());
        assert!(usd_to_wei(-1, usd(2000)).is_none());
    }

    #[test]
    fn test_usd_from_u256_bounds() {
        assert_eq!(usd_from_u256(U256::from(150_000_000_000u64)), Some(usd(1500)));
        assert_eq!(usd_from_u256(U256::MAX), None);
    }

    #[test]
    fn test_health_factor_conversions() {
        assert_eq!(hf_from_u256(U256::from(95u64)), 95);
        assert_eq!(hf_from_u256(U256::MAX), HF_UNKNOWN);
        assert_eq!(hf_from_f64(1.0), HF_ONE);
        assert!((hf_to_f64(250) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decimal_conversions() {
        assert_eq!(usd_from_f64(5.0), usd(5));
        assert_eq!(gwei_to_wei(50.0), 50 * WEI_PER_GWEI);
        assert!((wei_to_gwei(1_500_000_000) - 1.5).abs() < 1e-12);
        assert!((amount_to_f64(U256::from(5_000_000_000u64), 6) - 5000.0).abs() < 1e-9);
        assert!((wei_to_eth(WEI_PER_ETH) - 1.0).abs() < 1e-12);
    }
}
