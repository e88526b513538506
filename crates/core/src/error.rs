//! Error types for the decision engine.

use alloy::primitives::Address;
use thiserror::Error;

/// Fatal initialization error: the process must not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Asset address not present in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown asset {0}")]
pub struct UnknownAsset(pub Address);

/// Failure recorded at a job boundary.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("cycle aborted: {0}")]
    CycleAborted(String),

    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("job {0} is already running")]
    AlreadyRunning(&'static str),

    #[error("no job named {0}")]
    UnknownJob(String),

    #[error("{0}")]
    Failed(String),
}
