//! Read/write surface over authoritative chain state.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChainError;

/// Deployed protocol contracts.
#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    pub lending_pool: Address,
    pub collateral_manager: Address,
    pub oracle_aggregator: Address,
}

/// Lending pool view of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPosition {
    /// Legacy single-asset collateral (native units)
    pub collateral: U256,
    /// Outstanding debt, USD with 8 decimals
    pub borrowed_usd: U256,
    /// Unix timestamp of the last position update
    pub last_update: u64,
}

/// One collateral balance held by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralBalance {
    pub asset: Address,
    /// Native token units
    pub amount: U256,
}

/// Oracle fallback price snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachedPrice {
    /// USD with 8 decimals
    pub price: U256,
    pub updated_at: u64,
    /// Oracle-defined source tag
    pub source: u8,
}

/// Terminal status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed {
        tx_hash: B256,
        gas_used: u64,
        effective_gas_price: u128,
    },
    Reverted {
        tx_hash: B256,
        gas_used: u64,
    },
}

impl TxOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Chain reads and the single liquidation write the engine depends on.
///
/// Reads may run concurrently. Callers must serialize `liquidate` since the
/// wallet nonce and balance are shared.
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Address of the liquidator wallet.
    fn wallet(&self) -> Address;

    /// Health factor with 2 implied decimals (100 = 1.00).
    async fn health_factor(&self, user: Address) -> Result<U256, ChainError>;

    async fn position(&self, user: Address) -> Result<ChainPosition, ChainError>;

    /// Total collateral value, USD with 8 decimals.
    async fn collateral_value_usd(&self, user: Address) -> Result<U256, ChainError>;

    async fn user_collaterals(&self, user: Address) -> Result<Vec<CollateralBalance>, ChainError>;

    /// Borrowing capacity, USD with 8 decimals.
    async fn max_borrow_value(&self, user: Address) -> Result<U256, ChainError>;

    /// Oracle price, USD with 8 decimals.
    async fn price(&self, asset: Address) -> Result<U256, ChainError>;

    async fn cached_price(&self, asset: Address) -> Result<CachedPrice, ChainError>;

    async fn emergency_mode(&self) -> Result<bool, ChainError>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Native balance in wei.
    async fn balance(&self, wallet: Address) -> Result<U256, ChainError>;

    async fn nonce(&self, wallet: Address) -> Result<u64, ChainError>;

    /// Submit `liquidate(user)` carrying `value` wei and wait for a terminal receipt.
    async fn liquidate(&self, user: Address, value: U256) -> Result<TxOutcome, ChainError>;
}
