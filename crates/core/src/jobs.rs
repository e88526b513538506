//! Scheduler jobs wrapping the engine cycles.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::JobError;
use crate::monitor::{CycleReport, PositionMonitor};
use crate::price_check::PriceDeviationCheck;
use crate::scheduler::Job;

pub const MONITOR_JOB: &str = "health_monitor";
pub const RECHECK_JOB: &str = "liquidation_check";
pub const PRICE_CHECK_JOB: &str = "price_sync";

fn cycle_result(report: CycleReport) -> Result<Value, JobError> {
    match report.error {
        Some(reason) => Err(JobError::CycleAborted(reason)),
        None => serde_json::to_value(report).map_err(|e| JobError::Failed(e.to_string())),
    }
}

/// Main reconciliation cycle over all active debt-bearing positions.
pub struct MonitorJob {
    monitor: Arc<PositionMonitor>,
}

impl MonitorJob {
    pub fn new(monitor: Arc<PositionMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Job for MonitorJob {
    fn name(&self) -> &'static str {
        MONITOR_JOB
    }

    async fn run(&self) -> Result<Value, JobError> {
        cycle_result(self.monitor.run_cycle().await)
    }
}

/// Re-check of the index's risky view.
pub struct RiskyRecheckJob {
    monitor: Arc<PositionMonitor>,
}

impl RiskyRecheckJob {
    pub fn new(monitor: Arc<PositionMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Job for RiskyRecheckJob {
    fn name(&self) -> &'static str {
        RECHECK_JOB
    }

    async fn run(&self) -> Result<Value, JobError> {
        cycle_result(self.monitor.run_risky_recheck().await)
    }
}

/// Oracle deviation report.
pub struct PriceCheckJob {
    check: Arc<PriceDeviationCheck>,
}

impl PriceCheckJob {
    pub fn new(check: Arc<PriceDeviationCheck>) -> Self {
        Self { check }
    }
}

#[async_trait]
impl Job for PriceCheckJob {
    fn name(&self) -> &'static str {
        PRICE_CHECK_JOB
    }

    async fn run(&self) -> Result<Value, JobError> {
        let report = self
            .check
            .run()
            .await
            .map_err(|e| JobError::Failed(e.to_string()))?;
        serde_json::to_value(report).map_err(|e| JobError::Failed(e.to_string()))
    }
}
