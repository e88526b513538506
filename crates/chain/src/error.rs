//! Chain interaction errors.

use alloy::primitives::B256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("connected to chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },

    #[error("{call} failed: {message}")]
    Call { call: &'static str, message: String },

    #[error("transaction send failed: {0}")]
    Send(String),

    #[error("no receipt for {tx_hash} after {timeout_secs}s")]
    ReceiptTimeout { tx_hash: B256, timeout_secs: u64 },

    #[error("receipt lookup for {tx_hash} failed: {message}")]
    Receipt { tx_hash: B256, message: String },
}

impl ChainError {
    pub(crate) fn call(call: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Call {
            call,
            message: err.to_string(),
        }
    }
}
