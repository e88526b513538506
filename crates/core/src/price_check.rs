//! Oracle divergence check against an independent price reference.
//!
//! Reports only. Nothing here feeds back into liquidation decisions.

use std::sync::Arc;

use alloy::primitives::Address;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use lendforge_api::{PriceFeedError, PriceReference};
use lendforge_chain::{CachedPrice, ChainState};

use crate::assets::AssetRegistry;
use crate::config::PriceCheckConfig;
use crate::units;

/// `|reference - on_chain| / on_chain * 100`. `None` when the on-chain price is not positive.
pub fn deviation_pct(reference: f64, on_chain: f64) -> Option<f64> {
    (on_chain > 0.0).then(|| (reference - on_chain).abs() / on_chain * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationSeverity {
    Warn,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceDeviation {
    pub symbol: &'static str,
    pub asset: Address,
    pub on_chain_usd: f64,
    pub reference_usd: f64,
    pub deviation_pct: f64,
    pub severity: DeviationSeverity,
}

#[derive(Debug, Clone, Serialize)]
pub struct CachedPriceStatus {
    pub symbol: &'static str,
    pub price_usd: f64,
    pub updated_at: u64,
    pub source: u8,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceCheckReport {
    /// Assets with both an on-chain and a reference price
    pub prices_checked: usize,
    pub deviations: Vec<PriceDeviation>,
    pub high_deviations: usize,
    /// `None` when the flag could not be read
    pub emergency_mode: Option<bool>,
    pub cached_prices: Vec<CachedPriceStatus>,
}

pub struct PriceDeviationCheck {
    chain: Arc<dyn ChainState>,
    reference: Arc<dyn PriceReference>,
    registry: Arc<AssetRegistry>,
    config: PriceCheckConfig,
}

impl PriceDeviationCheck {
    pub fn new(
        chain: Arc<dyn ChainState>,
        reference: Arc<dyn PriceReference>,
        registry: Arc<AssetRegistry>,
        config: PriceCheckConfig,
    ) -> Self {
        Self {
            chain,
            reference,
            registry,
            config,
        }
    }

    pub fn classify(&self, deviation_pct: f64) -> Option<DeviationSeverity> {
        if deviation_pct > self.config.high_deviation_pct {
            Some(DeviationSeverity::High)
        } else if deviation_pct > self.config.warn_deviation_pct {
            Some(DeviationSeverity::Warn)
        } else {
            None
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<PriceCheckReport, PriceFeedError> {
        let mut report = PriceCheckReport::default();

        match self.chain.emergency_mode().await {
            Ok(active) => {
                if active {
                    warn!("Oracle aggregator is in emergency mode");
                }
                report.emergency_mode = Some(active);
            }
            Err(e) => warn!(error = %e, "Emergency mode flag unavailable"),
        }

        let symbols: Vec<&str> = self.registry.iter().map(|a| a.symbol).collect();
        let reference = self.reference.usd_prices(&symbols).await?;

        for asset in self.registry.iter() {
            match self.chain.cached_price(asset.address).await {
                Ok(cached) => report.cached_prices.push(cached_status(asset.symbol, cached)),
                Err(e) => debug!(symbol = asset.symbol, error = %e, "No cached price"),
            }

            let Some(&reference_usd) = reference.get(asset.symbol) else {
                debug!(symbol = asset.symbol, "No reference quote");
                continue;
            };

            let on_chain_usd = match self.chain.price(asset.address).await {
                Ok(price) => units::usd_from_u256(price).map_or(0.0, units::usd_to_f64),
                Err(e) => {
                    warn!(symbol = asset.symbol, error = %e, "On-chain price unavailable");
                    continue;
                }
            };

            let Some(deviation) = deviation_pct(reference_usd, on_chain_usd) else {
                warn!(symbol = asset.symbol, "On-chain price is zero");
                continue;
            };
            report.prices_checked += 1;

            match self.classify(deviation) {
                Some(severity) => {
                    if severity == DeviationSeverity::High {
                        report.high_deviations += 1;
                    }
                    warn!(
                        symbol = asset.symbol,
                        on_chain = on_chain_usd,
                        reference = reference_usd,
                        deviation_pct = format!("{deviation:.2}"),
                        severity = ?severity,
                        "Oracle price deviation"
                    );
                    report.deviations.push(PriceDeviation {
                        symbol: asset.symbol,
                        asset: asset.address,
                        on_chain_usd,
                        reference_usd,
                        deviation_pct: deviation,
                        severity,
                    });
                }
                None => debug!(symbol = asset.symbol, deviation_pct = deviation, "Price in range"),
            }
        }

        info!(
            checked = report.prices_checked,
            deviations = report.deviations.len(),
            high = report.high_deviations,
            "Price check complete"
        );
        Ok(report)
    }
}

fn cached_status(symbol: &'static str, cached: CachedPrice) -> CachedPriceStatus {
    CachedPriceStatus {
        symbol,
        price_usd: units::usd_from_u256(cached.price).map_or(0.0, units::usd_to_f64),
        updated_at: cached.updated_at,
        source: cached.source,
    }
}
