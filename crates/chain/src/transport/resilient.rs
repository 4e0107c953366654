//! Retrying [`RpcClient`] decorator.

use std::sync::Arc;

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::rpc::types::{
    Block, BlockNumberOrTag, Filter, Log, Transaction, TransactionReceipt, TransactionRequest,
};
use async_trait::async_trait;
use tracing::info;

use super::retry::{retry_with_backoff, SharedRetryPolicy};
use super::rpc::RpcClient;
use crate::error::SdkError;

/// Wraps every [`RpcClient`] operation in [`retry_with_backoff`]. Arguments
/// and results pass through untouched.
#[derive(Debug, Clone)]
pub struct ResilientRpc<C> {
    inner: C,
    policy: SharedRetryPolicy,
}

/// The node already holds this exact transaction in its pool.
fn is_already_known(err: &SdkError) -> bool {
    err.failure()
        .is_some_and(|f| f.message.to_lowercase().contains("already known"))
}

impl<C: RpcClient> ResilientRpc<C> {
    pub fn new(inner: C, policy: SharedRetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Handle to the live policy; updates apply to in-flight calls from
    /// their next attempt.
    pub fn policy(&self) -> &SharedRetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Erase the concrete client type.
    pub fn into_shared(self) -> Arc<dyn RpcClient>
    where
        C: 'static,
    {
        Arc::new(self)
    }
}

#[async_trait]
impl<C: RpcClient> RpcClient for ResilientRpc<C> {
    async fn get_balance(&self, address: Address) -> Result<U256, SdkError> {
        retry_with_backoff(&self.policy, "eth_getBalance", || {
            self.inner.get_balance(address)
        })
        .await
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, SdkError> {
        retry_with_backoff(&self.policy, "eth_getCode", || self.inner.get_code(address)).await
    }

    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<U256, SdkError> {
        retry_with_backoff(&self.policy, "eth_getStorageAt", || {
            self.inner.get_storage_at(address, slot)
        })
        .await
    }

    async fn get_block_number(&self) -> Result<u64, SdkError> {
        retry_with_backoff(&self.policy, "eth_blockNumber", || {
            self.inner.get_block_number()
        })
        .await
    }

    async fn get_block(&self, number: BlockNumberOrTag) -> Result<Option<Block>, SdkError> {
        retry_with_backoff(&self.policy, "eth_getBlockByNumber", || {
            self.inner.get_block(number)
        })
        .await
    }

    async fn get_transaction(&self, hash: TxHash) -> Result<Option<Transaction>, SdkError> {
        retry_with_backoff(&self.policy, "eth_getTransactionByHash", || {
            self.inner.get_transaction(hash)
        })
        .await
    }

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, SdkError> {
        retry_with_backoff(&self.policy, "eth_getTransactionReceipt", || {
            self.inner.get_transaction_receipt(hash)
        })
        .await
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, SdkError> {
        retry_with_backoff(&self.policy, "eth_getTransactionCount", || {
            self.inner.get_transaction_count(address)
        })
        .await
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, SdkError> {
        retry_with_backoff(&self.policy, "eth_call", || self.inner.call(tx)).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, SdkError> {
        retry_with_backoff(&self.policy, "eth_estimateGas", || {
            self.inner.estimate_gas(tx)
        })
        .await
    }

    async fn gas_price(&self) -> Result<u128, SdkError> {
        retry_with_backoff(&self.policy, "eth_gasPrice", || self.inner.gas_price()).await
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, SdkError> {
        // A resend after a lost response may find the first attempt in the
        // pool; that is acceptance of the same bytes, not a rejection.
        let hash = keccak256(&encoded);
        let mut attempt: u32 = 0;
        retry_with_backoff(&self.policy, "eth_sendRawTransaction", || {
            let resend = attempt > 0;
            attempt += 1;
            let send = self.inner.send_raw_transaction(encoded.clone());
            async move {
                match send.await {
                    Err(err) if resend && is_already_known(&err) => {
                        info!(tx = %hash, "Resent transaction already in pool");
                        Ok(hash)
                    }
                    other => other,
                }
            }
        })
        .await
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, SdkError> {
        retry_with_backoff(&self.policy, "eth_getLogs", || self.inner.get_logs(filter)).await
    }

    async fn get_chain_id(&self) -> Result<u64, SdkError> {
        retry_with_backoff(&self.policy, "eth_chainId", || self.inner.get_chain_id()).await
    }
}
