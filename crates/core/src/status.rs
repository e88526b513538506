//! Point-in-time snapshot served by the status surface.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;

use lendforge_api::GlobalMetrics;

use crate::config::BotConfig;
use crate::executor::MetricsSummary;
use crate::scheduler::SchedulerStatus;
use crate::units;

/// Protocol totals in display units.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolSummary {
    pub total_users: u64,
    pub total_positions: u64,
    pub active_positions: u64,
    pub tvl_usd: f64,
    pub borrowed_usd: f64,
    pub total_liquidations: u64,
}

impl From<&GlobalMetrics> for ProtocolSummary {
    fn from(m: &GlobalMetrics) -> Self {
        Self {
            total_users: m.total_users,
            total_positions: m.total_positions,
            active_positions: m.active_positions,
            tvl_usd: units::usd_to_f64(i128::try_from(m.current_tvl).unwrap_or(i128::MAX)),
            borrowed_usd: units::usd_to_f64(i128::try_from(m.current_borrowed).unwrap_or(i128::MAX)),
            total_liquidations: m.total_liquidations,
        }
    }
}

/// Effective thresholds, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub profile: String,
    pub min_profit_usd: f64,
    pub max_gas_price_gwei: f64,
    pub health_factor_threshold: f64,
    pub monitor_interval_secs: u64,
    pub recheck_interval_secs: u64,
    pub price_check_interval_secs: u64,
}

impl From<&BotConfig> for ConfigSummary {
    fn from(c: &BotConfig) -> Self {
        Self {
            profile: c.profile.clone(),
            min_profit_usd: c.profit.min_profit_usd,
            max_gas_price_gwei: c.execution.max_gas_price_gwei,
            health_factor_threshold: c.monitor.health_factor_threshold,
            monitor_interval_secs: c.scheduler.monitor_interval_secs,
            recheck_interval_secs: c.scheduler.recheck_interval_secs,
            price_check_interval_secs: c.scheduler.price_check_interval_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub timestamp: DateTime<Utc>,
    pub wallet: Address,
    /// `None` when the balance read failed
    pub wallet_balance_eth: Option<f64>,
    pub protocol: ProtocolSummary,
    pub liquidations: MetricsSummary,
    pub scheduler: SchedulerStatus,
    pub config: ConfigSummary,
}
