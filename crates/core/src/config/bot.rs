//! Runtime configuration with profile support.
//!
//! Profiles (default, testing, production) bundle thresholds and intervals.
//! A TOML file can replace the profile entirely and a few env variables
//! override individual values on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Main configuration structure containing all engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub profit: ProfitConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub price_check: PriceCheckConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Candidate discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Candidates fetched per monitor cycle
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Candidates fetched per risky re-check
    #[serde(default = "default_risky_page_size")]
    pub risky_page_size: usize,

    /// Index health factor ceiling for the risky view
    #[serde(default = "default_hf_threshold")]
    pub health_factor_threshold: f64,
}

fn default_page_size() -> usize {
    100
}
fn default_risky_page_size() -> usize {
    20
}
fn default_hf_threshold() -> f64 {
    1.0
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            risky_page_size: default_risky_page_size(),
            health_factor_threshold: default_hf_threshold(),
        }
    }
}

/// Job intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    #[serde(default = "default_recheck_interval")]
    pub recheck_interval_secs: u64,

    #[serde(default = "default_price_check_interval")]
    pub price_check_interval_secs: u64,
}

fn default_monitor_interval() -> u64 {
    30
}
fn default_recheck_interval() -> u64 {
    60
}
fn default_price_check_interval() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: default_monitor_interval(),
            recheck_interval_secs: default_recheck_interval(),
            price_check_interval_secs: default_price_check_interval(),
        }
    }
}

impl SchedulerConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }
    pub fn price_check_interval(&self) -> Duration {
        Duration::from_secs(self.price_check_interval_secs)
    }
}

/// Profitability model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitConfig {
    /// Liquidation bonus in basis points (1000 = 10%)
    #[serde(default = "default_bonus_bps")]
    pub liquidation_bonus_bps: u32,

    /// Gas units charged for every liquidation
    #[serde(default = "default_base_gas")]
    pub base_gas_units: u64,

    /// Extra gas units per collateral asset
    #[serde(default = "default_per_asset_gas")]
    pub per_asset_gas_units: u64,

    /// Minimum net profit to execute (USD)
    #[serde(default = "default_min_profit")]
    pub min_profit_usd: f64,
}

fn default_bonus_bps() -> u32 {
    1000
}
fn default_base_gas() -> u64 {
    300_000
}
fn default_per_asset_gas() -> u64 {
    50_000
}
fn default_min_profit() -> f64 {
    5.0
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            liquidation_bonus_bps: default_bonus_bps(),
            base_gas_units: default_base_gas(),
            per_asset_gas_units: default_per_asset_gas(),
            min_profit_usd: default_min_profit(),
        }
    }
}

/// Transaction execution limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Gas price ceiling (gwei)
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: f64,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Bounded wait for a receipt (seconds)
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
}

fn default_max_gas_price() -> f64 {
    50.0
}
fn default_gas_limit() -> u64 {
    500_000
}
fn default_receipt_timeout() -> u64 {
    180
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_gas_price_gwei: default_max_gas_price(),
            gas_limit: default_gas_limit(),
            receipt_timeout_secs: default_receipt_timeout(),
        }
    }
}

impl ExecutionConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Oracle deviation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCheckConfig {
    /// Deviation (percent) above which a divergence is recorded
    #[serde(default = "default_warn_deviation")]
    pub warn_deviation_pct: f64,

    /// Deviation (percent) flagged as high
    #[serde(default = "default_high_deviation")]
    pub high_deviation_pct: f64,

    /// External price request timeout (seconds)
    #[serde(default = "default_reference_timeout")]
    pub reference_timeout_secs: u64,
}

fn default_warn_deviation() -> f64 {
    2.0
}
fn default_high_deviation() -> f64 {
    10.0
}
fn default_reference_timeout() -> u64 {
    10
}

impl Default for PriceCheckConfig {
    fn default() -> Self {
        Self {
            warn_deviation_pct: default_warn_deviation(),
            high_deviation_pct: default_high_deviation(),
            reference_timeout_secs: default_reference_timeout(),
        }
    }
}

impl PriceCheckConfig {
    pub fn reference_timeout(&self) -> Duration {
        Duration::from_secs(self.reference_timeout_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            monitor: MonitorConfig::default(),
            scheduler: SchedulerConfig::default(),
            profit: ProfitConfig::default(),
            execution: ExecutionConfig::default(),
            price_check: PriceCheckConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file_error = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        toml::from_str(&content).map_err(|e| file_error(e.to_string()))
    }

    /// Testnet profile: fast cycles, no profit floor.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            monitor: MonitorConfig::default(),
            scheduler: SchedulerConfig {
                monitor_interval_secs: 10,
                recheck_interval_secs: 20,
                price_check_interval_secs: 60,
            },
            profit: ProfitConfig {
                min_profit_usd: 0.0,
                ..Default::default()
            },
            execution: ExecutionConfig {
                max_gas_price_gwei: 200.0,
                ..Default::default()
            },
            price_check: PriceCheckConfig::default(),
        }
    }

    /// Conservative profile.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            monitor: MonitorConfig::default(),
            scheduler: SchedulerConfig::default(),
            profit: ProfitConfig {
                min_profit_usd: 10.0,
                ..Default::default()
            },
            execution: ExecutionConfig {
                max_gas_price_gwei: 30.0,
                ..Default::default()
            },
            price_check: PriceCheckConfig {
                warn_deviation_pct: 1.0,
                high_deviation_pct: 5.0,
                ..Default::default()
            },
        }
    }

    /// Named profile. Unknown names fall back to the default profile.
    pub fn profile(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Resolve from the environment: `BOT_CONFIG` (TOML path) wins over
    /// `BOT_PROFILE`, then numeric overrides are applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BotConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("BOT_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None => Self::profile(lookup("BOT_PROFILE").as_deref().unwrap_or("default")),
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = parse_override::<u64, _>(lookup, "MONITOR_INTERVAL_SECONDS")? {
            self.scheduler.monitor_interval_secs = secs;
        }
        if let Some(usd) = parse_override::<f64, _>(lookup, "MIN_PROFIT_USD")? {
            self.profit.min_profit_usd = usd;
        }
        if let Some(gwei) = parse_override::<f64, _>(lookup, "MAX_GAS_PRICE_GWEI")? {
            self.execution.max_gas_price_gwei = gwei;
        }
        if let Some(hf) = parse_override::<f64, _>(lookup, "HEALTH_FACTOR_THRESHOLD")? {
            self.monitor.health_factor_threshold = hf;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("scheduler.monitor_interval_secs", self.scheduler.monitor_interval_secs),
            ("scheduler.recheck_interval_secs", self.scheduler.recheck_interval_secs),
            ("scheduler.price_check_interval_secs", self.scheduler.price_check_interval_secs),
        ];
        for (key, secs) in intervals {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "interval must be at least 1 second".to_string(),
                });
            }
        }
        if self.monitor.page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "monitor.page_size",
                reason: "must be positive".to_string(),
            });
        }
        if self.execution.max_gas_price_gwei <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "execution.max_gas_price_gwei",
                reason: "must be positive".to_string(),
            });
        }
        if self.price_check.high_deviation_pct < self.price_check.warn_deviation_pct {
            return Err(ConfigError::Invalid {
                key: "price_check.high_deviation_pct",
                reason: "must not be below warn_deviation_pct".to_string(),
            });
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            page_size = self.monitor.page_size,
            risky_page_size = self.monitor.risky_page_size,
            hf_threshold = self.monitor.health_factor_threshold,
            "Monitor parameters"
        );
        tracing::info!(
            monitor_secs = self.scheduler.monitor_interval_secs,
            recheck_secs = self.scheduler.recheck_interval_secs,
            price_check_secs = self.scheduler.price_check_interval_secs,
            "Job intervals"
        );
        tracing::info!(
            bonus_bps = self.profit.liquidation_bonus_bps,
            base_gas = self.profit.base_gas_units,
            per_asset_gas = self.profit.per_asset_gas_units,
            min_profit = self.profit.min_profit_usd,
            "Profit model"
        );
        tracing::info!(
            max_gas_gwei = self.execution.max_gas_price_gwei,
            gas_limit = self.execution.gas_limit,
            receipt_timeout_secs = self.execution.receipt_timeout_secs,
            "Execution limits"
        );
    }
}

fn parse_override<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}
