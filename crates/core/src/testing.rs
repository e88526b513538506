//! In-memory fakes for the index, chain and price reference seams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;

use lendforge_api::{
    GlobalMetrics, IndexError, IndexedPosition, LiquidationRecord, PositionIndex, PositionQuery,
    PositionStatus, PriceFeedError, PriceReference,
};
use lendforge_chain::{
    CachedPrice, ChainError, ChainPosition, ChainState, CollateralBalance, TxOutcome,
};

use crate::assets::NATIVE_ASSET;
use crate::units::{USD_SCALE, WEI_PER_ETH};

pub const fn usd(dollars: i128) -> i128 {
    dollars * USD_SCALE
}

fn rpc_error(call: &'static str) -> ChainError {
    ChainError::Call {
        call,
        message: "connection refused".to_string(),
    }
}

#[derive(Debug, Clone)]
struct FakeAccount {
    health_factor: u64,
    collateral_usd: i128,
    borrowed_usd: i128,
    max_borrow_usd: i128,
    collaterals: Vec<CollateralBalance>,
}

#[derive(Debug, Clone, Copy)]
enum LiquidationBehavior {
    Confirm,
    Revert,
    Fail,
}

/// Chain fake with per-account state and call counters.
pub struct FakeChain {
    wallet: Address,
    accounts: HashMap<Address, FakeAccount>,
    unreadable: HashSet<Address>,
    fail_health_factor: bool,
    gas_price: Option<u128>,
    prices: HashMap<Address, i128>,
    cached_prices: HashMap<Address, CachedPrice>,
    emergency_mode: bool,
    balance: U256,
    liquidation: LiquidationBehavior,
    /// Confirmed liquidations take time and leave the account healthy
    settle_on_confirm: bool,
    settled: Mutex<HashSet<Address>>,
    liquidate_calls: AtomicUsize,
    last_value: Mutex<Option<U256>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            wallet: Address::repeat_byte(0x77),
            accounts: HashMap::new(),
            unreadable: HashSet::new(),
            fail_health_factor: false,
            gas_price: Some(0),
            prices: HashMap::new(),
            cached_prices: HashMap::new(),
            emergency_mode: false,
            balance: U256::ZERO,
            liquidation: LiquidationBehavior::Confirm,
            settle_on_confirm: false,
            settled: Mutex::new(HashSet::new()),
            liquidate_calls: AtomicUsize::new(0),
            last_value: Mutex::new(None),
        }
    }

    /// Account with `asset_count` collateral balances of 1 token each.
    pub fn with_account(
        mut self,
        user: Address,
        health_factor: u64,
        collateral_usd: i128,
        borrowed_usd: i128,
        asset_count: usize,
    ) -> Self {
        let collaterals = (0..asset_count)
            .map(|i| CollateralBalance {
                asset: if i == 0 { NATIVE_ASSET } else { Address::repeat_byte(i as u8) },
                amount: WEI_PER_ETH,
            })
            .collect();
        self.accounts.insert(
            user,
            FakeAccount {
                health_factor,
                collateral_usd,
                borrowed_usd,
                max_borrow_usd: collateral_usd * 66 / 100,
                collaterals,
            },
        );
        self
    }

    pub fn with_health_factor(mut self, user: Address, health_factor: u64) -> Self {
        if let Some(account) = self.accounts.get_mut(&user) {
            account.health_factor = health_factor;
        }
        self
    }

    /// Every read for `user` fails.
    pub fn with_unreadable(mut self, user: Address) -> Self {
        self.unreadable.insert(user);
        self
    }

    pub fn with_gas_price(mut self, wei: u128) -> Self {
        self.gas_price = Some(wei);
        self
    }

    pub fn with_native_price(self, price_usd: i128) -> Self {
        self.with_price(NATIVE_ASSET, price_usd)
    }

    pub fn with_price(mut self, asset: Address, price_usd: i128) -> Self {
        self.prices.insert(asset, price_usd);
        self
    }

    pub fn with_cached_price(mut self, asset: Address, cached: CachedPrice) -> Self {
        self.cached_prices.insert(asset, cached);
        self
    }

    pub fn with_emergency_mode(mut self) -> Self {
        self.emergency_mode = true;
        self
    }

    pub fn with_balance(mut self, wei: U256) -> Self {
        self.balance = wei;
        self
    }

    pub fn failing_health_factor(mut self) -> Self {
        self.fail_health_factor = true;
        self
    }

    pub fn failing_gas_price(mut self) -> Self {
        self.gas_price = None;
        self
    }

    pub fn failing_liquidation(mut self) -> Self {
        self.liquidation = LiquidationBehavior::Fail;
        self
    }

    pub fn reverting_liquidation(mut self) -> Self {
        self.liquidation = LiquidationBehavior::Revert;
        self
    }

    /// Each confirmed liquidation takes 50ms, after which the user's health
    /// factor reads 2.50.
    pub fn settling_liquidation(mut self) -> Self {
        self.settle_on_confirm = true;
        self
    }

    pub fn liquidate_calls(&self) -> usize {
        self.liquidate_calls.load(Ordering::SeqCst)
    }

    pub fn last_liquidation_value(&self) -> Option<U256> {
        *self.last_value.lock()
    }

    fn account(&self, user: Address, call: &'static str) -> Result<&FakeAccount, ChainError> {
        if self.unreadable.contains(&user) {
            return Err(rpc_error(call));
        }
        self.accounts.get(&user).ok_or_else(|| ChainError::Call {
            call,
            message: format!("no account {user}"),
        })
    }
}

#[async_trait]
impl ChainState for FakeChain {
    fn wallet(&self) -> Address {
        self.wallet
    }

    async fn health_factor(&self, user: Address) -> Result<U256, ChainError> {
        if self.fail_health_factor {
            return Err(rpc_error("getHealthFactor"));
        }
        let account = self.account(user, "getHealthFactor")?;
        if self.settled.lock().contains(&user) {
            return Ok(U256::from(250u64));
        }
        Ok(U256::from(account.health_factor))
    }

    async fn position(&self, user: Address) -> Result<ChainPosition, ChainError> {
        let account = self.account(user, "getPosition")?;
        Ok(ChainPosition {
            collateral: U256::ZERO,
            borrowed_usd: U256::from(account.borrowed_usd as u128),
            last_update: 0,
        })
    }

    async fn collateral_value_usd(&self, user: Address) -> Result<U256, ChainError> {
        let account = self.account(user, "getCollateralValueUSD")?;
        Ok(U256::from(account.collateral_usd as u128))
    }

    async fn user_collaterals(&self, user: Address) -> Result<Vec<CollateralBalance>, ChainError> {
        Ok(self.account(user, "getUserCollaterals")?.collaterals.clone())
    }

    async fn max_borrow_value(&self, user: Address) -> Result<U256, ChainError> {
        let account = self.account(user, "getMaxBorrowValue")?;
        Ok(U256::from(account.max_borrow_usd as u128))
    }

    async fn price(&self, asset: Address) -> Result<U256, ChainError> {
        self.prices
            .get(&asset)
            .map(|p| U256::from(*p as u128))
            .ok_or_else(|| rpc_error("getPrice"))
    }

    async fn cached_price(&self, asset: Address) -> Result<CachedPrice, ChainError> {
        self.cached_prices
            .get(&asset)
            .copied()
            .ok_or_else(|| rpc_error("getCachedPrice"))
    }

    async fn emergency_mode(&self) -> Result<bool, ChainError> {
        Ok(self.emergency_mode)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        self.gas_price.ok_or_else(|| rpc_error("eth_gasPrice"))
    }

    async fn balance(&self, _wallet: Address) -> Result<U256, ChainError> {
        Ok(self.balance)
    }

    async fn nonce(&self, _wallet: Address) -> Result<u64, ChainError> {
        Ok(self.liquidate_calls() as u64)
    }

    async fn liquidate(&self, user: Address, value: U256) -> Result<TxOutcome, ChainError> {
        self.liquidate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_value.lock() = Some(value);
        let tx_hash = B256::repeat_byte(0x5a);
        match self.liquidation {
            LiquidationBehavior::Confirm => {
                if self.settle_on_confirm {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    self.settled.lock().insert(user);
                }
                Ok(TxOutcome::Confirmed {
                    tx_hash,
                    gas_used: 350_000,
                    effective_gas_price: 20_000_000_000,
                })
            }
            LiquidationBehavior::Revert => Ok(TxOutcome::Reverted {
                tx_hash,
                gas_used: 120_000,
            }),
            LiquidationBehavior::Fail => Err(ChainError::Send("nonce too low".to_string())),
        }
    }
}

/// Index fake serving a fixed candidate list.
#[derive(Default)]
pub struct FakeIndex {
    positions: Vec<IndexedPosition>,
    metrics: Option<GlobalMetrics>,
    liquidations: Vec<LiquidationRecord>,
    failing: AtomicBool,
    queries: Mutex<Vec<PositionQuery>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active record with 1500 USD debt and the given advisory health factor.
    pub fn record(user: Address, health_factor: f64) -> IndexedPosition {
        IndexedPosition {
            id: user.to_string().to_lowercase(),
            user,
            collateral: 0,
            borrowed: (1500 * USD_SCALE) as u128,
            health_factor,
            status: PositionStatus::Active,
        }
    }

    pub fn with_position(mut self, user: Address, health_factor: f64) -> Self {
        self.positions.push(Self::record(user, health_factor));
        self
    }

    /// Past liquidation of `user`. Add newest first.
    pub fn with_liquidation(mut self, user: Address, timestamp: u64) -> Self {
        self.liquidations.push(LiquidationRecord {
            id: format!("{user:#x}-{timestamp}"),
            user,
            liquidator: Address::repeat_byte(0x77),
            debt_cleared: (1500 * USD_SCALE) as u128,
            collateral_seized: WEI_PER_ETH.to::<u128>(),
            health_factor_before: 0.9,
            timestamp,
            tx_hash: format!("{:#x}", B256::repeat_byte(0x5a)),
        });
        self
    }

    pub fn with_metrics(mut self, metrics: GlobalMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<PositionQuery> {
        self.queries.lock().clone()
    }

    fn check(&self) -> Result<(), IndexError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(IndexError::Status(503))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PositionIndex for FakeIndex {
    async fn positions(&self, query: &PositionQuery) -> Result<Vec<IndexedPosition>, IndexError> {
        self.queries.lock().push(query.clone());
        self.check()?;
        Ok(self
            .positions
            .iter()
            .filter(|p| query.health_factor_below.map_or(true, |t| p.health_factor < t))
            .take(query.first)
            .cloned()
            .collect())
    }

    async fn position(&self, user: Address) -> Result<Option<IndexedPosition>, IndexError> {
        self.check()?;
        Ok(self.positions.iter().find(|p| p.user == user).cloned())
    }

    async fn global_metrics(&self) -> Result<GlobalMetrics, IndexError> {
        self.check()?;
        Ok(self.metrics.clone().unwrap_or_default())
    }

    async fn liquidation_history(&self, limit: usize) -> Result<Vec<LiquidationRecord>, IndexError> {
        self.check()?;
        Ok(self.liquidations.iter().take(limit).cloned().collect())
    }
}

/// Price reference fake with fixed quotes.
#[derive(Default)]
pub struct FakePrices {
    quotes: HashMap<String, f64>,
}

impl FakePrices {
    pub fn new(quotes: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            quotes: quotes.iter().map(|(s, p)| (s.to_uppercase(), *p)).collect(),
        })
    }
}

#[async_trait]
impl PriceReference for FakePrices {
    async fn usd_price(&self, symbol: &str) -> Result<f64, PriceFeedError> {
        self.quotes
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| PriceFeedError::MissingQuote(symbol.to_string()))
    }
}
