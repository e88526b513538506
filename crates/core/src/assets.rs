//! Collateral asset registry.
//!
//! Built once at startup from the hardcoded native asset plus the token
//! addresses supplied by the deployment, then shared read-only.

use std::collections::HashMap;

use alloy::primitives::Address;
use serde::Serialize;

use crate::error::UnknownAsset;

/// Address the protocol uses for the native asset.
pub const NATIVE_ASSET: Address = Address::ZERO;

/// Risk parameters for one collateral asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Asset {
    /// Asset symbol (e.g., "ETH", "USDC")
    pub symbol: &'static str,
    /// Token contract address ([`NATIVE_ASSET`] for ETH)
    pub address: Address,
    /// Token decimals
    pub decimals: u8,
    /// Maximum loan-to-value (percent)
    pub ltv_percent: u8,
    /// Liquidation threshold (percent)
    pub liquidation_threshold_percent: u8,
    /// Id used by the external price reference
    pub price_id: &'static str,
}

impl Asset {
    pub const fn new(
        symbol: &'static str,
        address: Address,
        decimals: u8,
        ltv_percent: u8,
        liquidation_threshold_percent: u8,
        price_id: &'static str,
    ) -> Self {
        Self {
            symbol,
            address,
            decimals,
            ltv_percent,
            liquidation_threshold_percent,
            price_id,
        }
    }

    /// Native ETH.
    pub const fn native() -> Self {
        Self::new("ETH", NATIVE_ASSET, 18, 66, 83, "ethereum")
    }

    pub const fn usdc(address: Address) -> Self {
        Self::new("USDC", address, 6, 90, 95, "usd-coin")
    }

    pub const fn dai(address: Address) -> Self {
        Self::new("DAI", address, 18, 90, 95, "dai")
    }
}

/// Immutable address -> asset map.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    native: Asset,
    by_address: HashMap<Address, Asset>,
    /// Registration order, native first
    order: Vec<Address>,
}

impl AssetRegistry {
    /// Registry holding only the native asset.
    pub fn native_only() -> Self {
        let native = Asset::native();
        Self {
            native,
            by_address: HashMap::from([(native.address, native)]),
            order: vec![native.address],
        }
    }

    /// Native asset plus whichever stablecoins the deployment configured.
    pub fn new(usdc: Option<Address>, dai: Option<Address>) -> Self {
        let mut registry = Self::native_only();
        if let Some(address) = usdc {
            registry = registry.with_asset(Asset::usdc(address));
        }
        if let Some(address) = dai {
            registry = registry.with_asset(Asset::dai(address));
        }
        registry
    }

    /// Add an asset. Later entries replace earlier ones at the same address.
    pub fn with_asset(mut self, asset: Asset) -> Self {
        if asset.address == NATIVE_ASSET {
            self.native = asset;
        }
        if self.by_address.insert(asset.address, asset).is_none() {
            self.order.push(asset.address);
        }
        self
    }

    /// Look up an asset by token address.
    pub fn get(&self, address: &Address) -> Result<&Asset, UnknownAsset> {
        self.by_address.get(address).ok_or(UnknownAsset(*address))
    }

    /// Look up an asset by symbol (case-insensitive).
    pub fn get_by_symbol(&self, symbol: &str) -> Option<&Asset> {
        self.iter().find(|a| a.symbol.eq_ignore_ascii_case(symbol))
    }

    /// The native asset. Always registered.
    pub fn native(&self) -> &Asset {
        &self.native
    }

    /// Assets in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.order.iter().filter_map(|address| self.by_address.get(address))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
