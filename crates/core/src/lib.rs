//! Lendforge decision engine.
//!
//! This crate provides the core liquidation bot functionality:
//! - Immutable collateral asset registry
//! - Position model with authoritative chain values
//! - Profitability model with capped seizure and per-asset gas costs
//! - Gated liquidation executor with process-wide metrics
//! - Position monitor reconciling index candidates against chain state
//! - Oracle deviation check against an independent price reference
//! - Interval scheduler with per-job stats and no self-overlap

mod assets;
pub mod config;
mod context;
mod error;
mod executor;
pub mod jobs;
mod monitor;
mod position;
mod price_check;
mod profit;
mod scheduler;
mod status;
pub mod units;

#[cfg(test)]
mod testing;

pub use assets::{Asset, AssetRegistry, NATIVE_ASSET};
pub use config::{BotConfig, Deployment};
pub use context::EngineContext;
pub use error::{ConfigError, JobError, UnknownAsset};
pub use executor::{
    AttemptOutcome, AttemptStage, FailureReason, LiquidationMetrics, Liquidator,
    MetricsRecorder, MetricsSummary, Verdict,
};
pub use monitor::{CycleReport, PositionLookup, PositionMonitor, Reconciliation};
pub use position::{
    is_liquidatable, AssetBreakdown, ChainSnapshot, CollateralHolding, Position,
    PositionAnalysis, PositionStatus, RiskLevel,
};
pub use price_check::{
    deviation_pct, CachedPriceStatus, DeviationSeverity, PriceCheckReport, PriceDeviation,
    PriceDeviationCheck,
};
pub use profit::{MarketConditions, ProfitBreakdown, ProfitCalculator};
pub use scheduler::{Job, JobStats, Scheduler, SchedulerStatus};
pub use status::{ConfigSummary, ProtocolSummary, StatusReport};
