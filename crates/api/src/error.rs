//! Error types for the off-chain service clients.

use thiserror::Error;

/// Failure reading the position index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("index returned HTTP {0}")]
    Status(u16),

    #[error("index query rejected: {0}")]
    Query(String),

    #[error("index response has no `{0}` field")]
    MissingData(&'static str),
}

/// Failure reading the external price reference.
#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("price reference returned HTTP {0}")]
    Status(u16),

    #[error("no reference id for symbol {0}")]
    UnknownSymbol(String),

    #[error("price reference has no quote for {0}")]
    MissingQuote(String),
}
