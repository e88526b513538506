//! Configuration system.
//!
//! This module provides:
//! - Bot runtime configuration (profiles, thresholds, intervals)
//! - Deployment settings read from the environment

mod bot;
mod deployment;

pub use bot::{
    BotConfig, ExecutionConfig, MonitorConfig, PriceCheckConfig, ProfitConfig, SchedulerConfig,
};

pub use deployment::{Deployment, DEFAULT_CHAIN_ID, DEFAULT_HTTP_PORT};
