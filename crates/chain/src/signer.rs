//! Transaction signer and sender.
//!
//! Transactions are signed locally and pushed as raw bytes through an
//! [`RpcClient`], so sends inherit whatever retry behaviour the client has.
//! The nonce is tracked locally and re-synced from the chain after any
//! failed send.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, ReceiptResponse as _, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{RequestFailure, SdkError};
use crate::multicall::Submission;
use crate::transport::RpcClient;

const BPS_DENOMINATOR: u64 = 10_000;

/// Cached nonce manager.
/// Avoids an RPC round trip per transaction by tracking the nonce locally.
#[derive(Debug)]
pub struct NonceManager {
    current: AtomicU64,
    /// Last value read from chain
    last_synced: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
            last_synced: AtomicU64::new(initial_nonce),
        }
    }

    /// Get next nonce and increment counter.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn last_synced(&self) -> u64 {
        self.last_synced.load(Ordering::SeqCst)
    }

    /// Move forward to the chain value; never moves backwards.
    pub fn sync(&self, chain_nonce: u64) {
        self.current.fetch_max(chain_nonce, Ordering::SeqCst);
        self.last_synced.store(chain_nonce, Ordering::SeqCst);
    }

    /// Force the chain value (after a failed send).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
        self.last_synced.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Transaction submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Extra gas on top of the node estimate, in basis points
    #[serde(default = "default_gas_buffer_bps")]
    pub gas_buffer_bps: u64,

    /// Upper bound for the gas price in gwei (0 = no cap)
    #[serde(default)]
    pub max_gas_price_gwei: u64,

    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,

    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
}

fn default_gas_buffer_bps() -> u64 {
    2_000
}
fn default_receipt_timeout_secs() -> u64 {
    120
}
fn default_receipt_poll_ms() -> u64 {
    1_000
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            gas_buffer_bps: default_gas_buffer_bps(),
            max_gas_price_gwei: 0,
            receipt_timeout_secs: default_receipt_timeout_secs(),
            receipt_poll_ms: default_receipt_poll_ms(),
        }
    }
}

/// `gas * (1 + bps / 10000)`, saturating.
pub fn apply_gas_buffer(gas: u64, buffer_bps: u64) -> u64 {
    let buffered = gas as u128 * (BPS_DENOMINATOR + buffer_bps) as u128 / BPS_DENOMINATOR as u128;
    buffered.min(u64::MAX as u128) as u64
}

/// Builder for [`TransactionSender`].
pub struct TransactionSenderBuilder {
    rpc: Arc<dyn RpcClient>,
    chain_id: Option<u64>,
    config: TransactionConfig,
}

impl TransactionSenderBuilder {
    pub fn new(rpc: Arc<dyn RpcClient>) -> Self {
        Self {
            rpc,
            chain_id: None,
            config: TransactionConfig::default(),
        }
    }

    /// Skip the `eth_chainId` lookup.
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn config(mut self, config: TransactionConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self, private_key: &str) -> Result<TransactionSender, SdkError> {
        let key_str = private_key.trim().trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str
            .parse()
            .map_err(|e| SdkError::Signer(format!("invalid private key: {e}")))?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let chain_id = match self.chain_id {
            Some(id) => id,
            None => self.rpc.get_chain_id().await?,
        };
        let initial_nonce = self.rpc.get_transaction_count(address).await?;

        info!(
            address = %address,
            chain_id,
            initial_nonce,
            gas_buffer_bps = self.config.gas_buffer_bps,
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            rpc: self.rpc,
            wallet,
            address,
            chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            config: self.config,
        })
    }
}

/// Signs locally and submits through the configured RPC client.
pub struct TransactionSender {
    rpc: Arc<dyn RpcClient>,
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
    config: TransactionConfig,
}

impl TransactionSender {
    pub async fn new(
        rpc: Arc<dyn RpcClient>,
        private_key: &str,
        config: TransactionConfig,
    ) -> Result<Self, SdkError> {
        TransactionSenderBuilder::new(rpc)
            .config(config)
            .build(private_key)
            .await
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce_manager.current()
    }

    /// Sign and broadcast; returns once the node accepted the transaction.
    #[instrument(skip(self, calldata), fields(calldata_len = calldata.len()))]
    pub async fn submit(&self, to: Address, calldata: Bytes, value: U256) -> Result<TxHash, SdkError> {
        let request = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_value(value);

        // Estimate before taking a nonce so a reverting call burns nothing
        let estimate = self.rpc.estimate_gas(&request).await?;
        let gas_limit = apply_gas_buffer(estimate, self.config.gas_buffer_bps);
        let gas_price = self.gas_price().await?;
        let nonce = self.nonce_manager.next();

        let tx = request
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        let envelope = tx
            .build(&self.wallet)
            .await
            .map_err(|e| SdkError::Signer(e.to_string()))?;
        let raw: Bytes = envelope.encoded_2718().into();

        debug!(
            nonce,
            gas_estimate = estimate,
            gas_limit,
            gas_price_gwei = gas_price / 1_000_000_000,
            "Sending transaction"
        );

        match self.rpc.send_raw_transaction(raw).await {
            Ok(tx_hash) => {
                info!(tx_hash = %tx_hash, nonce, "Transaction submitted");
                Ok(tx_hash)
            }
            Err(e) => {
                warn!(nonce, error = %e, "Send failed, syncing nonce");
                self.sync_nonce().await;
                Err(e)
            }
        }
    }

    /// Poll for the receipt. A reverted receipt is a contract rejection.
    #[instrument(skip(self))]
    pub async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, SdkError> {
        let poll = Duration::from_millis(self.config.receipt_poll_ms.max(1));
        let deadline = Instant::now() + Duration::from_secs(self.config.receipt_timeout_secs);
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            if let Some(receipt) = self.rpc.get_transaction_receipt(tx_hash).await? {
                if receipt.status() {
                    info!(
                        tx_hash = %tx_hash,
                        block = receipt.block_number.unwrap_or(0),
                        gas_used = receipt.gas_used,
                        "Transaction confirmed"
                    );
                    return Ok(receipt);
                }

                warn!(tx_hash = %tx_hash, "Transaction reverted, syncing nonce");
                self.sync_nonce().await;
                return Err(SdkError::ContractRejection(RequestFailure::new(format!(
                    "transaction {tx_hash} reverted"
                ))));
            }

            if Instant::now() + poll > deadline {
                return Err(SdkError::TransientInfra {
                    attempts: polls,
                    failure: RequestFailure::new(format!(
                        "timed out waiting for receipt of {tx_hash}"
                    )),
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Submit and wait for confirmation.
    pub async fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
    ) -> Result<TransactionReceipt, SdkError> {
        let tx_hash = self.submit(to, calldata, value).await?;
        self.wait_for_receipt(tx_hash).await
    }

    /// Send a routed submission.
    pub async fn send_submission(
        &self,
        submission: &Submission,
        value: U256,
    ) -> Result<TransactionReceipt, SdkError> {
        debug!(
            to = %submission.to(),
            batched = submission.is_batched(),
            price_updates = submission.price_update_count(),
            "Sending submission"
        );
        self.send_transaction(submission.to(), submission.calldata(), value)
            .await
    }

    /// Re-read the nonce from chain.
    pub async fn sync_nonce(&self) {
        match self.rpc.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }

    pub async fn get_balance(&self) -> Result<U256, SdkError> {
        self.rpc.get_balance(self.address).await
    }

    async fn gas_price(&self) -> Result<u128, SdkError> {
        let price = self.rpc.gas_price().await?;
        if self.config.max_gas_price_gwei == 0 {
            return Ok(price);
        }
        let cap = self.config.max_gas_price_gwei as u128 * 1_000_000_000;
        if price > cap {
            warn!(
                gas_price_gwei = price / 1_000_000_000,
                cap_gwei = self.config.max_gas_price_gwei,
                "Gas price above cap, clamping"
            );
        }
        Ok(price.min(cap))
    }
}

impl fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("nonce", &self.nonce_manager.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ScriptedRpc;
    use alloy::consensus::{Transaction as _, TxEnvelope};
    use alloy::eips::eip2718::Decodable2718;

    // Well-known test key (DO NOT USE IN PRODUCTION)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    async fn sender(rpc: Arc<ScriptedRpc>, config: TransactionConfig) -> TransactionSender {
        TransactionSenderBuilder::new(rpc)
            .config(config)
            .build(TEST_KEY)
            .await
            .unwrap()
    }

    #[test]
    fn test_nonce_manager() {
        let manager = NonceManager::new(10);

        assert_eq!(manager.current(), 10);
        assert_eq!(manager.next(), 10);
        assert_eq!(manager.next(), 11);
        assert_eq!(manager.current(), 12);

        manager.sync(15);
        assert_eq!(manager.current(), 15);

        // sync never decreases
        manager.sync(10);
        assert_eq!(manager.current(), 15);
        assert_eq!(manager.last_synced(), 10);

        manager.reset(5);
        assert_eq!(manager.current(), 5);
    }

    #[test]
    fn test_gas_buffer() {
        assert_eq!(apply_gas_buffer(100_000, 2_000), 120_000);
        assert_eq!(apply_gas_buffer(100_000, 0), 100_000);
        assert_eq!(apply_gas_buffer(u64::MAX, 5_000), u64::MAX);
    }

    #[tokio::test]
    async fn test_builder_reads_chain_state() {
        let rpc = Arc::new(ScriptedRpc::healthy());
        let sender = sender(rpc, TransactionConfig::default()).await;

        assert_eq!(
            format!("{:?}", sender.address).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(sender.chain_id(), 1);
        assert_eq!(sender.current_nonce(), 7);
    }

    #[tokio::test]
    async fn test_rejects_bad_key() {
        let rpc: Arc<dyn RpcClient> = Arc::new(ScriptedRpc::healthy());
        let err = TransactionSenderBuilder::new(rpc)
            .build("not-a-key")
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Signer(_)));
    }

    #[tokio::test]
    async fn test_submit_signs_legacy_transaction() {
        let rpc = Arc::new(ScriptedRpc::healthy());
        let sender = sender(Arc::clone(&rpc), TransactionConfig::default()).await;
        let to = Address::repeat_byte(0x42);

        sender
            .submit(to, Bytes::from(vec![0x01, 0x02]), U256::ZERO)
            .await
            .unwrap();

        assert_eq!(sender.current_nonce(), 8);
        let sent = rpc.sent.lock().clone();
        assert_eq!(sent.len(), 1);

        let envelope = TxEnvelope::decode_2718(&mut sent[0].as_ref()).unwrap();
        assert!(envelope.is_legacy());
        assert_eq!(envelope.nonce(), 7);
        assert_eq!(envelope.gas_limit(), 120_000);
        assert_eq!(envelope.to(), Some(to));
        assert_eq!(envelope.chain_id(), Some(1));
    }

    #[tokio::test]
    async fn test_gas_price_cap() {
        let rpc = Arc::new(ScriptedRpc {
            gas_price: 50_000_000_000,
            ..ScriptedRpc::healthy()
        });
        let config = TransactionConfig {
            max_gas_price_gwei: 10,
            ..Default::default()
        };
        let sender = sender(Arc::clone(&rpc), config).await;

        sender
            .submit(Address::repeat_byte(0x01), Bytes::new(), U256::ZERO)
            .await
            .unwrap();

        let sent = rpc.sent.lock().clone();
        let envelope = TxEnvelope::decode_2718(&mut sent[0].as_ref()).unwrap();
        assert_eq!(envelope.gas_price(), Some(10_000_000_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_timeout() {
        let rpc = Arc::new(ScriptedRpc::healthy());
        let config = TransactionConfig {
            receipt_timeout_secs: 5,
            receipt_poll_ms: 1_000,
            ..Default::default()
        };
        let sender = sender(rpc, config).await;

        let err = sender.wait_for_receipt(TxHash::ZERO).await.unwrap_err();
        assert!(matches!(err, SdkError::TransientInfra { .. }));
        assert!(err.to_string().contains("timed out waiting for receipt"));
    }
}
