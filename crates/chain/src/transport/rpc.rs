//! Node RPC surface used by the SDK.
//!
//! The trait lists every operation the SDK performs against a node, so
//! decorators such as [`super::ResilientRpc`] can wrap each one explicitly.

use std::fmt;

use alloy::primitives::{Address, Bytes, TxHash, U256, U64};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{
    Block, BlockId, BlockNumberOrTag, Filter, Log, Transaction, TransactionReceipt,
    TransactionRequest,
};
use async_trait::async_trait;
use tracing::info;

use crate::error::SdkError;

/// Finite set of node operations.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn get_balance(&self, address: Address) -> Result<U256, SdkError>;

    async fn get_code(&self, address: Address) -> Result<Bytes, SdkError>;

    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<U256, SdkError>;

    async fn get_block_number(&self) -> Result<u64, SdkError>;

    /// Block header and transaction hashes (not full bodies).
    async fn get_block(&self, number: BlockNumberOrTag) -> Result<Option<Block>, SdkError>;

    async fn get_transaction(&self, hash: TxHash) -> Result<Option<Transaction>, SdkError>;

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, SdkError>;

    /// Pending-inclusive nonce.
    async fn get_transaction_count(&self, address: Address) -> Result<u64, SdkError>;

    /// `eth_call` at the latest block.
    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, SdkError>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, SdkError>;

    /// Legacy gas price in wei.
    async fn gas_price(&self) -> Result<u128, SdkError>;

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, SdkError>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, SdkError>;

    async fn get_chain_id(&self) -> Result<u64, SdkError>;
}

/// [`RpcClient`] over an alloy provider.
#[derive(Clone)]
pub struct AlloyRpcClient<P> {
    provider: P,
}

impl<P> AlloyRpcClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl AlloyRpcClient<RootProvider> {
    /// Connect over HTTP.
    pub fn connect_http(url: &str) -> Result<Self, SdkError> {
        let url: reqwest::Url = url
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid rpc url {url}: {e}")))?;
        info!(%url, "Using HTTP RPC provider");
        Ok(Self::new(RootProvider::new_http(url)))
    }
}

impl<P> fmt::Debug for AlloyRpcClient<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlloyRpcClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl<P: Provider + Send + Sync> RpcClient for AlloyRpcClient<P> {
    async fn get_balance(&self, address: Address) -> Result<U256, SdkError> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, SdkError> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<U256, SdkError> {
        Ok(self.provider.get_storage_at(address, slot).await?)
    }

    async fn get_block_number(&self) -> Result<u64, SdkError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_block(&self, number: BlockNumberOrTag) -> Result<Option<Block>, SdkError> {
        Ok(self
            .provider
            .raw_request("eth_getBlockByNumber".into(), (number, false))
            .await?)
    }

    async fn get_transaction(&self, hash: TxHash) -> Result<Option<Transaction>, SdkError> {
        Ok(self.provider.get_transaction_by_hash(hash).await?)
    }

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, SdkError> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, SdkError> {
        let count: U64 = self
            .provider
            .raw_request(
                "eth_getTransactionCount".into(),
                (address, BlockId::Number(BlockNumberOrTag::Pending)),
            )
            .await?;
        Ok(count.to::<u64>())
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, SdkError> {
        Ok(self
            .provider
            .raw_request("eth_call".into(), (tx.clone(), BlockId::latest()))
            .await?)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, SdkError> {
        let gas: U64 = self
            .provider
            .raw_request("eth_estimateGas".into(), (tx.clone(),))
            .await?;
        Ok(gas.to::<u64>())
    }

    async fn gas_price(&self) -> Result<u128, SdkError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, SdkError> {
        let pending = self.provider.send_raw_transaction(&encoded).await?;
        Ok(*pending.tx_hash())
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, SdkError> {
        Ok(self.provider.get_logs(filter).await?)
    }

    async fn get_chain_id(&self) -> Result<u64, SdkError> {
        Ok(self.provider.get_chain_id().await?)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory node for unit tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    pub struct ScriptedRpc {
        /// Errors returned, in order, before calls start succeeding
        pub errors: Mutex<VecDeque<SdkError>>,
        pub calls: AtomicU32,
        pub chain_id: u64,
        pub nonce: u64,
        pub gas_price: u128,
        pub gas_estimate: u64,
        pub call_result: Bytes,
        pub sent: Mutex<Vec<Bytes>>,
    }

    impl ScriptedRpc {
        pub fn failing_with(errors: Vec<SdkError>) -> Self {
            Self {
                errors: Mutex::new(errors.into()),
                ..Self::healthy()
            }
        }

        pub fn healthy() -> Self {
            Self {
                chain_id: 1,
                nonce: 7,
                gas_price: 2_000_000_000,
                gas_estimate: 100_000,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn step(&self) -> Result<(), SdkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.errors.lock().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RpcClient for ScriptedRpc {
        async fn get_balance(&self, _address: Address) -> Result<U256, SdkError> {
            self.step()?;
            Ok(U256::from(1_000u64))
        }

        async fn get_code(&self, _address: Address) -> Result<Bytes, SdkError> {
            self.step()?;
            Ok(Bytes::new())
        }

        async fn get_storage_at(&self, _address: Address, slot: U256) -> Result<U256, SdkError> {
            self.step()?;
            Ok(slot)
        }

        async fn get_block_number(&self) -> Result<u64, SdkError> {
            self.step()?;
            Ok(19_000_000)
        }

        async fn get_block(&self, _number: BlockNumberOrTag) -> Result<Option<Block>, SdkError> {
            self.step()?;
            Ok(None)
        }

        async fn get_transaction(&self, _hash: TxHash) -> Result<Option<Transaction>, SdkError> {
            self.step()?;
            Ok(None)
        }

        async fn get_transaction_receipt(
            &self,
            _hash: TxHash,
        ) -> Result<Option<TransactionReceipt>, SdkError> {
            self.step()?;
            Ok(None)
        }

        async fn get_transaction_count(&self, _address: Address) -> Result<u64, SdkError> {
            self.step()?;
            Ok(self.nonce)
        }

        async fn call(&self, _tx: &TransactionRequest) -> Result<Bytes, SdkError> {
            self.step()?;
            Ok(self.call_result.clone())
        }

        async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, SdkError> {
            self.step()?;
            Ok(self.gas_estimate)
        }

        async fn gas_price(&self) -> Result<u128, SdkError> {
            self.step()?;
            Ok(self.gas_price)
        }

        async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, SdkError> {
            self.step()?;
            let hash = alloy::primitives::keccak256(&encoded);
            self.sent.lock().push(encoded);
            Ok(hash)
        }

        async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>, SdkError> {
            self.step()?;
            Ok(Vec::new())
        }

        async fn get_chain_id(&self) -> Result<u64, SdkError> {
            self.step()?;
            Ok(self.chain_id)
        }
    }
}
