//! CoinGecko client used as an independent USD price reference.
//!
//! Quotes from here never feed liquidation decisions. They are compared
//! against the protocol oracle to surface divergence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use crate::error::PriceFeedError;

const PUBLIC_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const PRO_BASE_URL: &str = "https://pro-api.coingecko.com/api/v3";
const PRO_KEY_HEADER: &str = "x-cg-pro-api-key";

/// Independent USD price source keyed by asset symbol.
#[async_trait]
pub trait PriceReference: Send + Sync {
    /// USD price of one unit of `symbol`.
    async fn usd_price(&self, symbol: &str) -> Result<f64, PriceFeedError>;

    /// USD prices for several symbols. Symbols without a quote are omitted.
    async fn usd_prices(&self, symbols: &[&str]) -> Result<HashMap<String, f64>, PriceFeedError> {
        let mut prices = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            match self.usd_price(symbol).await {
                Ok(price) => {
                    prices.insert(symbol.to_string(), price);
                }
                Err(PriceFeedError::MissingQuote(_)) | Err(PriceFeedError::UnknownSymbol(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(prices)
    }
}

#[derive(Clone, Copy)]
struct CachedQuote {
    price: f64,
    fetched_at: Instant,
}

/// CoinGecko `simple/price` client with a short-lived quote cache.
#[derive(Clone)]
pub struct CoinGeckoClient {
    client: reqwest::Client,
    api_key: Option<String>,
    /// Symbol (upper case) -> CoinGecko coin id
    ids: HashMap<String, String>,
    cache: Arc<DashMap<String, CachedQuote>>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for CoinGeckoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoClient")
            .field("pro", &self.api_key.is_some())
            .field("symbols", &self.ids.len())
            .field("cache_size", &self.cache.len())
            .finish()
    }
}

impl CoinGeckoClient {
    /// Create a client. With an API key the pro endpoint is tried first.
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, PriceFeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let ids = [("ETH", "ethereum"), ("USDC", "usd-coin"), ("DAI", "dai")]
            .into_iter()
            .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
            .collect();

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            ids,
            cache: Arc::new(DashMap::new()),
            cache_ttl: Duration::from_secs(60),
        })
    }

    /// Map an additional symbol to its CoinGecko id.
    pub fn with_symbol(mut self, symbol: &str, coin_id: &str) -> Self {
        self.ids.insert(symbol.to_uppercase(), coin_id.to_string());
        self
    }

    /// Override how long fetched quotes are reused.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn coin_id(&self, symbol: &str) -> Result<&str, PriceFeedError> {
        self.ids
            .get(&symbol.to_uppercase())
            .map(String::as_str)
            .ok_or_else(|| PriceFeedError::UnknownSymbol(symbol.to_string()))
    }

    fn cached(&self, symbol: &str) -> Option<f64> {
        self.cache
            .get(&symbol.to_uppercase())
            .filter(|quote| quote.fetched_at.elapsed() < self.cache_ttl)
            .map(|quote| quote.price)
    }

    /// Fetch `coin id -> usd` from the pro endpoint, falling back to the
    /// public one when the key is rejected.
    async fn fetch(&self, coin_ids: &[&str]) -> Result<HashMap<String, f64>, PriceFeedError> {
        let ids = coin_ids.join(",");

        if let Some(key) = &self.api_key {
            let response = self
                .client
                .get(format!("{PRO_BASE_URL}/simple/price"))
                .header(PRO_KEY_HEADER, key)
                .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
                .send()
                .await?;

            match response.status() {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                    warn!(
                        status = response.status().as_u16(),
                        "Pro API key rejected, falling back to public endpoint"
                    );
                }
                status if status.is_success() => {
                    return Ok(parse_simple_price(response.json().await?));
                }
                status => return Err(PriceFeedError::Status(status.as_u16())),
            }
        }

        let response = self
            .client
            .get(format!("{PUBLIC_BASE_URL}/simple/price"))
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceFeedError::Status(status.as_u16()));
        }

        Ok(parse_simple_price(response.json().await?))
    }
}

#[async_trait]
impl PriceReference for CoinGeckoClient {
    async fn usd_price(&self, symbol: &str) -> Result<f64, PriceFeedError> {
        let prices = self.usd_prices(&[symbol]).await?;
        prices
            .get(symbol)
            .copied()
            .ok_or_else(|| PriceFeedError::MissingQuote(symbol.to_string()))
    }

    #[instrument(skip(self))]
    async fn usd_prices(&self, symbols: &[&str]) -> Result<HashMap<String, f64>, PriceFeedError> {
        let mut prices = HashMap::with_capacity(symbols.len());
        let mut wanted: Vec<(&str, &str)> = Vec::new();

        for &symbol in symbols {
            match self.cached(symbol) {
                Some(price) => {
                    prices.insert(symbol.to_string(), price);
                }
                None => match self.coin_id(symbol) {
                    Ok(id) => wanted.push((symbol, id)),
                    Err(_) => debug!(symbol, "No CoinGecko id configured"),
                },
            }
        }

        if wanted.is_empty() {
            return Ok(prices);
        }

        let ids: Vec<&str> = wanted.iter().map(|(_, id)| *id).collect();
        let quotes = self.fetch(&ids).await?;

        for (symbol, id) in wanted {
            if let Some(&price) = quotes.get(id) {
                self.cache.insert(
                    symbol.to_uppercase(),
                    CachedQuote {
                        price,
                        fetched_at: Instant::now(),
                    },
                );
                prices.insert(symbol.to_string(), price);
            }
        }

        debug!(quotes = prices.len(), "Fetched reference prices");
        Ok(prices)
    }
}

/// Flatten `{"ethereum": {"usd": 2000.5}}` into `{"ethereum": 2000.5}`.
fn parse_simple_price(body: HashMap<String, HashMap<String, f64>>) -> HashMap<String, f64> {
    body.into_iter()
        .filter_map(|(id, quotes)| quotes.get("usd").map(|usd| (id, *usd)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_price() {
        let body: HashMap<String, HashMap<String, f64>> = serde_json::from_str(
            r#"{"ethereum": {"usd": 2012.5}, "dai": {"usd": 0.999}, "weird": {"eur": 1.0}}"#,
        )
        .unwrap();

        let prices = parse_simple_price(body);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["ethereum"], 2012.5);
        assert_eq!(prices["dai"], 0.999);
    }

    #[test]
    fn test_symbol_mapping() {
        let client = CoinGeckoClient::new(None, Duration::from_secs(10))
            .unwrap()
            .with_symbol("wbtc", "wrapped-bitcoin");

        assert_eq!(client.coin_id("eth").unwrap(), "ethereum");
        assert_eq!(client.coin_id("USDC").unwrap(), "usd-coin");
        assert_eq!(client.coin_id("WBTC").unwrap(), "wrapped-bitcoin");
        assert!(matches!(
            client.coin_id("DOGE"),
            Err(PriceFeedError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn test_empty_api_key_uses_public_endpoint() {
        let client = CoinGeckoClient::new(Some(String::new()), Duration::from_secs(10)).unwrap();
        assert!(client.api_key.is_none());
    }

    #[tokio::test]
    async fn test_cached_quotes_skip_network() {
        let client = CoinGeckoClient::new(None, Duration::from_secs(10)).unwrap();
        client.cache.insert(
            "ETH".to_string(),
            CachedQuote {
                price: 1999.0,
                fetched_at: Instant::now(),
            },
        );

        let price = client.usd_price("ETH").await.unwrap();
        assert_eq!(price, 1999.0);
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_fetch_eth_price() {
        let client = CoinGeckoClient::new(None, Duration::from_secs(10)).unwrap();
        let price = client.usd_price("ETH").await.unwrap();
        assert!(price > 0.0);
    }
}
