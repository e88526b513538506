//! Deployment settings: endpoints, contract addresses and the signing key.
//!
//! Every required key is checked before anything is returned, so a
//! misconfigured process reports all missing settings at once.

use alloy::primitives::Address;

use crate::error::ConfigError;

/// Default chain id (Sepolia).
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// Default port of the status surface.
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Settings required to connect to one protocol deployment.
#[derive(Clone)]
pub struct Deployment {
    pub rpc_url: String,
    pub private_key: String,
    pub lending_pool: Address,
    pub collateral_manager: Address,
    pub oracle_aggregator: Address,
    pub subgraph_url: String,
    pub liquidator_wallet: Address,
    pub usdc_token: Option<Address>,
    pub dai_token: Option<Address>,
    pub chain_id: u64,
    pub coingecko_api_key: Option<String>,
    pub http_port: u16,
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("lending_pool", &self.lending_pool)
            .field("collateral_manager", &self.collateral_manager)
            .field("oracle_aggregator", &self.oracle_aggregator)
            .field("subgraph_url", &self.subgraph_url)
            .field("liquidator_wallet", &self.liquidator_wallet)
            .field("usdc_token", &self.usdc_token)
            .field("dai_token", &self.dai_token)
            .field("chain_id", &self.chain_id)
            .field("http_port", &self.http_port)
            .finish()
    }
}

impl Deployment {
    /// Read the deployment from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the deployment from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut require = |key: &'static str, value: Option<String>| {
            if value.is_none() {
                missing.push(key);
            }
            value
        };

        let rpc_url = require("RPC_URL", get("RPC_URL").or_else(|| get("SEPOLIA_RPC_URL")));
        let private_key = require("PRIVATE_KEY", get("PRIVATE_KEY"));
        let lending_pool = require("LENDING_POOL_ADDRESS", get("LENDING_POOL_ADDRESS"));
        let collateral_manager =
            require("COLLATERAL_MANAGER_ADDRESS", get("COLLATERAL_MANAGER_ADDRESS"));
        let oracle_aggregator =
            require("ORACLE_AGGREGATOR_ADDRESS", get("ORACLE_AGGREGATOR_ADDRESS"));
        let subgraph_url = require("SUBGRAPH_URL", get("SUBGRAPH_URL"));
        let liquidator_wallet = require("LIQUIDATOR_WALLET", get("LIQUIDATOR_WALLET"));

        let (
            Some(rpc_url),
            Some(private_key),
            Some(lending_pool),
            Some(collateral_manager),
            Some(oracle_aggregator),
            Some(subgraph_url),
            Some(liquidator_wallet),
        ) = (
            rpc_url,
            private_key,
            lending_pool,
            collateral_manager,
            oracle_aggregator,
            subgraph_url,
            liquidator_wallet,
        )
        else {
            return Err(ConfigError::Missing(missing));
        };

        let chain_id = match get("CHAIN_ID") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "CHAIN_ID",
                reason: e.to_string(),
            })?,
            None => DEFAULT_CHAIN_ID,
        };

        let http_port = match get("HTTP_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "HTTP_PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_HTTP_PORT,
        };

        Ok(Self {
            rpc_url,
            private_key,
            lending_pool: parse_address("LENDING_POOL_ADDRESS", &lending_pool)?,
            collateral_manager: parse_address("COLLATERAL_MANAGER_ADDRESS", &collateral_manager)?,
            oracle_aggregator: parse_address("ORACLE_AGGREGATOR_ADDRESS", &oracle_aggregator)?,
            subgraph_url,
            liquidator_wallet: parse_address("LIQUIDATOR_WALLET", &liquidator_wallet)?,
            usdc_token: get("USDC_TOKEN_ADDRESS")
                .map(|v| parse_address("USDC_TOKEN_ADDRESS", &v))
                .transpose()?,
            dai_token: get("DAI_TOKEN_ADDRESS")
                .map(|v| parse_address("DAI_TOKEN_ADDRESS", &v))
                .transpose()?,
            chain_id,
            coingecko_api_key: get("COINGECKO_API_KEY"),
            http_port,
        })
    }
}

fn parse_address(key: &'static str, value: &str) -> Result<Address, ConfigError> {
    value.parse::<Address>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
