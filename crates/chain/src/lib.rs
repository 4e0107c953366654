//! Lending SDK chain interaction layer.
//!
//! This crate provides:
//! - The SDK error taxonomy shared by RPC and HTTP clients
//! - Resilient transport: failure classification, bounded backoff and a
//!   retrying RPC client
//! - Contract bindings for market tokens, zapper, position manager and the
//!   push-oracle adapter
//! - Multicall batch assembly
//! - Transaction signing and sending

pub mod contracts;
mod error;
mod multicall;
mod signer;
pub mod transport;

pub use error::{RequestFailure, SdkError};
pub use multicall::{CallAction, CallBatch, MulticallAssembler, Submission};
pub use signer::{
    apply_gas_buffer, NonceManager, TransactionConfig, TransactionSender,
    TransactionSenderBuilder,
};
pub use transport::{
    classify, retry_with_backoff, AlloyRpcClient, ErrorClass, ResilientRpc, RetryConfig,
    RetryObserver, RetryPolicy, RpcClient, SharedRetryPolicy,
};
