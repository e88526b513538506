//! Transaction signer and sender for liquidations.
//!
//! Nonces are tracked locally and resynced from chain whenever a send fails
//! or a transaction reverts. Receipt waits are bounded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use tracing::{debug, info, warn};

use crate::error::ChainError;
use crate::state::TxOutcome;

/// Gas limit for a liquidation call.
pub const DEFAULT_LIQUIDATION_GAS_LIMIT: u64 = 500_000;

/// Maximum time to wait for a receipt once a transaction is broadcast.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

/// Locally tracked account nonce.
#[derive(Debug)]
pub struct NonceManager {
    next: AtomicU64,
}

impl NonceManager {
    pub fn new(chain_nonce: u64) -> Self {
        Self {
            next: AtomicU64::new(chain_nonce),
        }
    }

    /// Take the next nonce.
    pub fn reserve(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Nonce the next transaction will use.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Overwrite with the chain's pending count.
    pub fn resync(&self, chain_nonce: u64) {
        self.next.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Signs, broadcasts and awaits liquidation transactions using legacy gas pricing.
pub struct TransactionSender {
    rpc_url: Url,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
    gas_limit: u64,
    receipt_timeout: Duration,
}

impl TransactionSender {
    /// Create a sender from a hex private key (with or without `0x`).
    pub async fn new(private_key: &str, rpc_url: Url, chain_id: u64) -> Result<Self, ChainError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| ChainError::InvalidKey(format!("{e}")))?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().on_http(rpc_url.clone());
        let initial_nonce = provider
            .get_transaction_count(address)
            .await
            .map_err(|e| ChainError::call("eth_getTransactionCount", e))?;

        info!(
            address = %address,
            chain_id,
            initial_nonce,
            "Transaction sender initialized"
        );

        Ok(Self {
            rpc_url,
            wallet,
            address,
            chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            gas_limit: DEFAULT_LIQUIDATION_GAS_LIMIT,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        })
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Signer address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign and broadcast a transaction, then wait for its receipt.
    ///
    /// A send error or missing receipt is an `Err`; a mined but failed
    /// transaction is `Ok(TxOutcome::Reverted)`. The local nonce is resynced
    /// from chain after anything but a confirmation.
    pub async fn send(&self, to: Address, calldata: Bytes, value: U256) -> Result<TxOutcome, ChainError> {
        let result = self.submit(to, calldata, value).await;
        if nonce_needs_resync(&result) {
            self.sync_nonce().await;
        }
        result
    }

    async fn submit(&self, to: Address, calldata: Bytes, value: U256) -> Result<TxOutcome, ChainError> {
        let started = Instant::now();

        let read_provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let gas_price = read_provider
            .get_gas_price()
            .await
            .map_err(|e| ChainError::call("eth_gasPrice", e))?;

        let nonce = self.nonce_manager.reserve();
        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_value(value)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        info!(
            to = %to,
            nonce,
            value = %value,
            gas_limit = self.gas_limit,
            gas_price_gwei = gas_price / 1_000_000_000,
            "Sending transaction"
        );

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.clone());

        let pending = provider.send_transaction(tx).await.map_err(|e| {
            warn!(nonce, error = %e, "Transaction send failed");
            ChainError::Send(e.to_string())
        })?;
        let tx_hash = *pending.tx_hash();

        info!(tx_hash = %tx_hash, "Transaction submitted, waiting for receipt");

        let receipt = match tokio::time::timeout(self.receipt_timeout, pending.get_receipt()).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                warn!(tx_hash = %tx_hash, error = %e, "Receipt lookup failed");
                return Err(ChainError::Receipt {
                    tx_hash,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(tx_hash = %tx_hash, "Receipt wait timed out");
                return Err(ChainError::ReceiptTimeout {
                    tx_hash,
                    timeout_secs: self.receipt_timeout.as_secs(),
                });
            }
        };

        let gas_used = receipt.gas_used as u64;
        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used,
                elapsed_ms = started.elapsed().as_millis(),
                "Transaction confirmed"
            );
            Ok(TxOutcome::Confirmed {
                tx_hash,
                gas_used,
                effective_gas_price: receipt.effective_gas_price as u128,
            })
        } else {
            warn!(tx_hash = %tx_hash, gas_used, "Transaction reverted");
            Ok(TxOutcome::Reverted { tx_hash, gas_used })
        }
    }

    /// Reload the nonce from chain.
    pub async fn sync_nonce(&self) {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                let local = self.nonce_manager.peek();
                self.nonce_manager.resync(chain_nonce);
                debug!(local, nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => warn!(error = %e, "Failed to sync nonce from chain"),
        }
    }
}

/// Whether the local nonce may have drifted from the chain after `result`.
/// A dropped or unconfirmed transaction leaves a gap that would stall every
/// later send.
fn nonce_needs_resync(result: &Result<TxOutcome, ChainError>) -> bool {
    !matches!(result, Ok(outcome) if outcome.is_confirmed())
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("gas_limit", &self.gas_limit)
            .field("receipt_timeout", &self.receipt_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    #[test]
    fn test_nonce_manager() {
        let manager = NonceManager::new(7);

        assert_eq!(manager.peek(), 7);
        assert_eq!(manager.reserve(), 7);
        assert_eq!(manager.reserve(), 8);
        assert_eq!(manager.peek(), 9);

        // A failed send leaves a gap; resync rewinds to the chain count
        manager.resync(8);
        assert_eq!(manager.reserve(), 8);
    }

    #[test]
    fn test_resync_after_anything_but_confirmation() {
        let tx_hash = B256::repeat_byte(0x11);

        assert!(!nonce_needs_resync(&Ok(TxOutcome::Confirmed {
            tx_hash,
            gas_used: 300_000,
            effective_gas_price: 1,
        })));
        assert!(nonce_needs_resync(&Ok(TxOutcome::Reverted {
            tx_hash,
            gas_used: 120_000,
        })));
        assert!(nonce_needs_resync(&Err(ChainError::Send("nonce too low".into()))));
        assert!(nonce_needs_resync(&Err(ChainError::ReceiptTimeout {
            tx_hash,
            timeout_secs: 180,
        })));
        assert!(nonce_needs_resync(&Err(ChainError::Receipt {
            tx_hash,
            message: "connection reset".into(),
        })));
    }

    #[tokio::test]
    async fn test_rejects_malformed_key() {
        let url: Url = "http://127.0.0.1:1".parse().unwrap();
        let result = TransactionSender::new("0xnot-a-key", url, 11155111).await;
        assert!(matches!(result, Err(ChainError::InvalidKey(_))));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_sender_creation() {
        // Test private key (DO NOT USE IN PRODUCTION)
        let private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let url: Url = std::env::var("RPC_URL").unwrap().parse().unwrap();
        let sender = TransactionSender::new(private_key, url, 11155111).await.unwrap();

        assert_eq!(
            format!("{:?}", sender.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }
}
