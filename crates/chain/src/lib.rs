//! Lendforge chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings for the lending pool, collateral manager and oracle aggregator
//! - The [`ChainState`] trait the decision engine reads and writes through
//! - An Alloy-backed [`ChainClient`] implementation
//! - Transaction signing with local nonce tracking and bounded receipt waits

mod bindings;
mod client;
mod error;
mod signer;
mod state;

pub use bindings::{ICollateralManager, ILendingPool, IOracleAggregator};
pub use client::ChainClient;
pub use error::ChainError;
pub use signer::{NonceManager, TransactionSender, DEFAULT_LIQUIDATION_GAS_LIMIT, DEFAULT_RECEIPT_TIMEOUT};
pub use state::{
    CachedPrice, ChainPosition, ChainState, CollateralBalance, ContractAddresses, TxOutcome,
};

/// Re-exported so callers can build RPC URLs and parse accounts without
/// depending on alloy directly.
pub use alloy::primitives::Address;
pub use alloy::transports::http::reqwest::Url;
