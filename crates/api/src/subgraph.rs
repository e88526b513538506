//! Subgraph client for the protocol's position index.
//!
//! The index is eventually consistent: it lags oracle updates and its
//! health factors are advisory. Callers use it to discover candidates and
//! re-derive every decision from chain state.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::error::IndexError;

/// Request timeout for subgraph queries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fields selected for every position query.
const POSITION_FIELDS: &str = "id user { id } collateral borrowed healthFactor status";

/// Protocol-owned lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Active,
    Closed,
    Liquidated,
}

/// Position record as reported by the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedPosition {
    pub id: String,

    /// Borrower address (`user { id }` in the schema)
    #[serde(deserialize_with = "deserialize_entity_address")]
    pub user: Address,

    /// Collateral as indexed (native units)
    #[serde(alias = "totalCollateralUSD", deserialize_with = "deserialize_numeric")]
    pub collateral: u128,

    /// Outstanding debt, USD with 8 decimals
    #[serde(deserialize_with = "deserialize_numeric")]
    pub borrowed: u128,

    /// Advisory health factor (decimal ratio, 1.0 = threshold)
    #[serde(deserialize_with = "deserialize_numeric")]
    pub health_factor: f64,

    pub status: PositionStatus,
}

/// Protocol-wide totals maintained by the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMetrics {
    #[serde(default, deserialize_with = "deserialize_numeric")]
    pub total_users: u64,
    #[serde(default, deserialize_with = "deserialize_numeric")]
    pub total_positions: u64,
    #[serde(default, deserialize_with = "deserialize_numeric")]
    pub active_positions: u64,
    #[serde(rename = "currentTVL", default, deserialize_with = "deserialize_numeric")]
    pub current_tvl: u128,
    #[serde(default, deserialize_with = "deserialize_numeric")]
    pub current_borrowed: u128,
    #[serde(default, deserialize_with = "deserialize_numeric")]
    pub total_liquidations: u64,
    #[serde(default, deserialize_with = "deserialize_numeric")]
    pub updated_at: u64,
}

/// A past liquidation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationRecord {
    pub id: String,
    #[serde(deserialize_with = "deserialize_entity_address")]
    pub user: Address,
    pub liquidator: Address,
    #[serde(deserialize_with = "deserialize_numeric")]
    pub debt_cleared: u128,
    #[serde(deserialize_with = "deserialize_numeric")]
    pub collateral_seized: u128,
    #[serde(deserialize_with = "deserialize_numeric")]
    pub health_factor_before: f64,
    #[serde(deserialize_with = "deserialize_numeric")]
    pub timestamp: u64,
    pub tx_hash: String,
}

/// Ordering key for position queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOrder {
    /// Lowest health factor first
    HealthFactorAsc,
    /// Most recently updated first
    UpdatedAtDesc,
}

impl PositionOrder {
    fn clause(self) -> (&'static str, &'static str) {
        match self {
            Self::HealthFactorAsc => ("healthFactor", "asc"),
            Self::UpdatedAtDesc => ("updatedAt", "desc"),
        }
    }
}

/// Filter, ordering and page size for a position query.
///
/// Every query is restricted to `ACTIVE` positions with nonzero debt.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionQuery {
    /// Optional advisory health factor ceiling (`healthFactor_lt`)
    pub health_factor_below: Option<f64>,
    pub order: PositionOrder,
    /// Page size cap
    pub first: usize,
}

impl PositionQuery {
    /// All active debt-bearing positions, most recently updated first.
    pub fn active_with_debt(first: usize) -> Self {
        Self {
            health_factor_below: None,
            order: PositionOrder::UpdatedAtDesc,
            first,
        }
    }

    /// The index's own "risky" view: health factor below `threshold`, lowest first.
    pub fn risky(threshold: f64, first: usize) -> Self {
        Self {
            health_factor_below: Some(threshold),
            order: PositionOrder::HealthFactorAsc,
            first,
        }
    }

    /// Render the GraphQL document and its variables.
    fn to_graphql(&self) -> (String, Value) {
        let (order_by, direction) = self.order.clause();

        let (params, threshold_filter) = if self.health_factor_below.is_some() {
            ("$first: Int!, $threshold: BigDecimal!", " healthFactor_lt: $threshold")
        } else {
            ("$first: Int!", "")
        };

        let document = format!(
            "query Positions({params}) {{ positions(where: {{ status: ACTIVE, borrowed_gt: \"0\"{threshold_filter} }}, orderBy: {order_by}, orderDirection: {direction}, first: $first) {{ {POSITION_FIELDS} }} }}"
        );

        let mut variables = json!({ "first": self.first });
        if let Some(threshold) = self.health_factor_below {
            variables["threshold"] = Value::String(threshold.to_string());
        }

        (document, variables)
    }
}

/// Read-only access to the position index.
#[async_trait]
pub trait PositionIndex: Send + Sync {
    /// Query candidate positions.
    async fn positions(&self, query: &PositionQuery) -> Result<Vec<IndexedPosition>, IndexError>;

    /// Look up a single position by borrower address.
    async fn position(&self, user: Address) -> Result<Option<IndexedPosition>, IndexError>;

    /// Protocol-wide totals.
    async fn global_metrics(&self) -> Result<GlobalMetrics, IndexError>;

    /// Most recent liquidation events, newest first.
    async fn liquidation_history(&self, limit: usize)
        -> Result<Vec<LiquidationRecord>, IndexError>;
}

/// GraphQL client for the protocol subgraph.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    client: reqwest::Client,
    url: String,
}

impl SubgraphClient {
    /// Create a client for the given subgraph endpoint.
    pub fn new(url: impl Into<String>) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Endpoint this client queries.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: Value,
    ) -> Result<T, IndexError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Status(status.as_u16()));
        }

        let body: GraphQlResponse<T> = response.json().await?;
        body.into_result()
    }
}

#[async_trait]
impl PositionIndex for SubgraphClient {
    #[instrument(skip(self), fields(first = query.first))]
    async fn positions(&self, query: &PositionQuery) -> Result<Vec<IndexedPosition>, IndexError> {
        let (document, variables) = query.to_graphql();
        let data: PositionsData = self.execute(&document, variables).await?;

        debug!(
            count = data.positions.len(),
            threshold = ?query.health_factor_below,
            "Fetched positions from index"
        );

        Ok(data.positions)
    }

    async fn position(&self, user: Address) -> Result<Option<IndexedPosition>, IndexError> {
        let document = format!("query Position($id: ID!) {{ position(id: $id) {{ {POSITION_FIELDS} }} }}");
        let data: PositionData = self
            .execute(&document, json!({ "id": format!("{user:#x}") }))
            .await?;
        Ok(data.position)
    }

    async fn global_metrics(&self) -> Result<GlobalMetrics, IndexError> {
        let document = "query GlobalMetrics { globalMetric(id: \"global\") { totalUsers totalPositions activePositions currentTVL currentBorrowed totalLiquidations updatedAt } }";
        let data: GlobalMetricData = self.execute(document, json!({})).await?;

        match data.global_metric {
            Some(metrics) => Ok(metrics),
            None => {
                warn!("Index has no global metrics entity yet");
                Ok(GlobalMetrics::default())
            }
        }
    }

    async fn liquidation_history(
        &self,
        limit: usize,
    ) -> Result<Vec<LiquidationRecord>, IndexError> {
        let document = "query Liquidations($limit: Int!) { liquidations(first: $limit, orderBy: timestamp, orderDirection: desc) { id user { id } liquidator debtCleared collateralSeized healthFactorBefore timestamp txHash } }";
        let data: LiquidationsData = self.execute(document, json!({ "limit": limit })).await?;
        Ok(data.liquidations)
    }
}

// GraphQL envelopes

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_result(self) -> Result<T, IndexError> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(IndexError::Query(messages.join("; ")));
        }
        self.data.ok_or(IndexError::MissingData("data"))
    }
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    positions: Vec<IndexedPosition>,
}

#[derive(Debug, Deserialize)]
struct PositionData {
    position: Option<IndexedPosition>,
}

#[derive(Debug, Deserialize)]
struct GlobalMetricData {
    #[serde(rename = "globalMetric")]
    global_metric: Option<GlobalMetrics>,
}

#[derive(Debug, Deserialize)]
struct LiquidationsData {
    liquidations: Vec<LiquidationRecord>,
}

// Custom deserializers

fn deserialize_entity_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct EntityRef {
        id: String,
    }

    let entity = EntityRef::deserialize(deserializer)?;
    entity.id.parse().map_err(de::Error::custom)
}

/// Subgraph `BigInt`/`BigDecimal` values arrive as strings, `Int` as numbers.
fn deserialize_numeric<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    let raw = match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    };
    raw.trim().parse().map_err(de::Error::custom)
}
