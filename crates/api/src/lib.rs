//! Lendforge API clients for off-chain services.
//!
//! This crate provides HTTP clients for:
//! - The protocol subgraph: candidate positions, protocol totals, liquidation history
//! - CoinGecko: independent USD quotes for oracle deviation checks

mod coingecko;
mod error;
mod subgraph;

pub use coingecko::{CoinGeckoClient, PriceReference};
pub use error::{IndexError, PriceFeedError};
pub use subgraph::{
    GlobalMetrics, IndexedPosition, LiquidationRecord, PositionIndex, PositionOrder,
    PositionQuery, PositionStatus, SubgraphClient,
};
