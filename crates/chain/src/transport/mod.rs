//! Resilient transport: failure classification, bounded backoff and a
//! retrying RPC client.

pub mod classify;
mod resilient;
pub mod retry;
mod rpc;

pub use classify::{classify, classify_failure, ErrorClass};
pub use resilient::ResilientRpc;
pub use retry::{retry_with_backoff, RetryConfig, RetryObserver, RetryPolicy, SharedRetryPolicy};
pub use rpc::{AlloyRpcClient, RpcClient};

#[cfg(test)]
pub(crate) use rpc::mock;
