//! Alloy-backed implementation of [`ChainState`].

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::bindings::{ICollateralManager, ILendingPool, IOracleAggregator};
use crate::error::ChainError;
use crate::signer::TransactionSender;
use crate::state::{
    CachedPrice, ChainPosition, ChainState, CollateralBalance, ContractAddresses, TxOutcome,
};

/// Chain client for the lending protocol's pool, collateral manager and oracle.
#[derive(Debug)]
pub struct ChainClient {
    rpc_url: Url,
    contracts: ContractAddresses,
    sender: TransactionSender,
}

impl ChainClient {
    /// Connect and verify the endpoint serves `expected_chain_id`.
    pub async fn connect(
        rpc_url: Url,
        expected_chain_id: u64,
        contracts: ContractAddresses,
        sender: TransactionSender,
    ) -> Result<Self, ChainError> {
        let provider = ProviderBuilder::new().on_http(rpc_url.clone());

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::call("eth_chainId", e))?;
        if chain_id != expected_chain_id {
            return Err(ChainError::WrongChain {
                expected: expected_chain_id,
                actual: chain_id,
            });
        }

        let block = provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::call("eth_blockNumber", e))?;

        info!(
            chain_id,
            block,
            lending_pool = %contracts.lending_pool,
            collateral_manager = %contracts.collateral_manager,
            oracle = %contracts.oracle_aggregator,
            "Chain connection verified"
        );

        Ok(Self {
            rpc_url,
            contracts,
            sender,
        })
    }

    fn provider(&self) -> impl Provider {
        ProviderBuilder::new().on_http(self.rpc_url.clone())
    }
}

#[async_trait]
impl ChainState for ChainClient {
    fn wallet(&self) -> Address {
        self.sender.address()
    }

    async fn health_factor(&self, user: Address) -> Result<U256, ChainError> {
        let provider = self.provider();
        let pool = ILendingPool::new(self.contracts.lending_pool, &provider);
        let hf = pool
            .getHealthFactor(user)
            .call()
            .await
            .map_err(|e| ChainError::call("getHealthFactor", e))?;
        Ok(hf._0)
    }

    async fn position(&self, user: Address) -> Result<ChainPosition, ChainError> {
        let provider = self.provider();
        let pool = ILendingPool::new(self.contracts.lending_pool, &provider);
        let position = pool
            .getPosition(user)
            .call()
            .await
            .map_err(|e| ChainError::call("getPosition", e))?;

        Ok(ChainPosition {
            collateral: position.collateral,
            borrowed_usd: position.borrowed,
            last_update: position.lastUpdate.saturating_to(),
        })
    }

    async fn collateral_value_usd(&self, user: Address) -> Result<U256, ChainError> {
        let provider = self.provider();
        let manager = ICollateralManager::new(self.contracts.collateral_manager, &provider);
        let value = manager
            .getCollateralValueUSD(user)
            .call()
            .await
            .map_err(|e| ChainError::call("getCollateralValueUSD", e))?;
        Ok(value._0)
    }

    async fn user_collaterals(&self, user: Address) -> Result<Vec<CollateralBalance>, ChainError> {
        let provider = self.provider();
        let manager = ICollateralManager::new(self.contracts.collateral_manager, &provider);
        let result = manager
            .getUserCollaterals(user)
            .call()
            .await
            .map_err(|e| ChainError::call("getUserCollaterals", e))?;

        let balances: Vec<CollateralBalance> = result
            .assets
            .into_iter()
            .zip(result.amounts)
            .map(|(asset, amount)| CollateralBalance { asset, amount })
            .collect();

        debug!(user = %user, assets = balances.len(), "Fetched collateral breakdown");
        Ok(balances)
    }

    async fn max_borrow_value(&self, user: Address) -> Result<U256, ChainError> {
        let provider = self.provider();
        let manager = ICollateralManager::new(self.contracts.collateral_manager, &provider);
        let value = manager
            .getMaxBorrowValue(user)
            .call()
            .await
            .map_err(|e| ChainError::call("getMaxBorrowValue", e))?;
        Ok(value._0)
    }

    async fn price(&self, asset: Address) -> Result<U256, ChainError> {
        let provider = self.provider();
        let oracle = IOracleAggregator::new(self.contracts.oracle_aggregator, &provider);
        let price = oracle
            .getPrice(asset)
            .call()
            .await
            .map_err(|e| ChainError::call("getPrice", e))?;
        Ok(price._0)
    }

    async fn cached_price(&self, asset: Address) -> Result<CachedPrice, ChainError> {
        let provider = self.provider();
        let oracle = IOracleAggregator::new(self.contracts.oracle_aggregator, &provider);
        let cached = oracle
            .getCachedPrice(asset)
            .call()
            .await
            .map_err(|e| ChainError::call("getCachedPrice", e))?;

        Ok(CachedPrice {
            price: cached.price,
            updated_at: cached.updatedAt.saturating_to(),
            source: cached.source,
        })
    }

    async fn emergency_mode(&self) -> Result<bool, ChainError> {
        let provider = self.provider();
        let oracle = IOracleAggregator::new(self.contracts.oracle_aggregator, &provider);
        let mode = oracle
            .emergencyMode()
            .call()
            .await
            .map_err(|e| ChainError::call("emergencyMode", e))?;
        Ok(mode._0)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        self.provider()
            .get_gas_price()
            .await
            .map_err(|e| ChainError::call("eth_gasPrice", e))
    }

    async fn balance(&self, wallet: Address) -> Result<U256, ChainError> {
        self.provider()
            .get_balance(wallet)
            .await
            .map_err(|e| ChainError::call("eth_getBalance", e))
    }

    async fn nonce(&self, wallet: Address) -> Result<u64, ChainError> {
        self.provider()
            .get_transaction_count(wallet)
            .await
            .map_err(|e| ChainError::call("eth_getTransactionCount", e))
    }

    #[instrument(skip(self), fields(user = %user, value = %value))]
    async fn liquidate(&self, user: Address, value: U256) -> Result<TxOutcome, ChainError> {
        let calldata = Bytes::from(ILendingPool::liquidateCall { user }.abi_encode());
        self.sender
            .send(self.contracts.lending_pool, calldata, value)
            .await
    }
}
