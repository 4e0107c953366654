//! Swap-quote providers.
//!
//! Zap, leverage and deleverage need swap calldata from an external
//! aggregator. Each aggregator implements [`QuoteProvider`]; the registry
//! picks providers per chain and falls back to the next one on failure.
//!
//! # Supported providers
//!
//! - [`RouteBuildProvider`]: stateless quote-then-build flow
//! - [`TokenGatedProvider`]: credential handshake plus bearer-authenticated
//!   quotes under a provider-declared request rate

mod route_build;
mod token_gated;

pub use route_build::RouteBuildProvider;
pub use token_gated::TokenGatedProvider;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use alloy::primitives::{address, Address, Bytes, U256};
use async_trait::async_trait;
use lending_sdk_chain::{RequestFailure, SdkError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Placeholder address aggregators use for the chain's native asset.
pub const NATIVE_TOKEN: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

const BPS_DENOMINATOR: u64 = 10_000;

/// Parameters for requesting a swap quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub token_in: Address,
    pub token_out: Address,
    /// Input amount (raw, with decimals)
    pub amount_in: U256,
    /// Slippage tolerance in basis points (e.g., 50 = 0.5%)
    pub slippage_bps: u32,
    /// Address executing the swap (zapper or position manager)
    pub sender: Address,
    pub recipient: Address,
}

impl QuoteRequest {
    pub fn new(token_in: Address, token_out: Address, amount_in: U256, sender: Address) -> Self {
        Self {
            token_in,
            token_out,
            amount_in,
            slippage_bps: 50,
            sender,
            recipient: sender,
        }
    }

    pub fn with_slippage_bps(mut self, slippage_bps: u32) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = recipient;
        self
    }

    /// Native value to attach when the input is the native asset.
    pub fn native_value(&self) -> U256 {
        if self.token_in == NATIVE_TOKEN {
            self.amount_in
        } else {
            U256::ZERO
        }
    }
}

/// Executable swap quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    pub provider: String,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub expected_output: U256,
    /// Minimum output guaranteed by the calldata
    pub min_output: U256,
    /// Contract the calldata is executed against
    pub router: Address,
    pub calldata: Bytes,
    pub value: U256,
}

/// `amount * (10000 - bps) / 10000`.
pub fn min_output_after_slippage(amount: U256, slippage_bps: u32) -> U256 {
    let bps = (slippage_bps as u64).min(BPS_DENOMINATOR);
    amount * U256::from(BPS_DENOMINATOR - bps) / U256::from(BPS_DENOMINATOR)
}

/// Trait for swap-quote providers.
#[async_trait]
pub trait QuoteProvider: Send + Sync + Debug {
    /// Provider identifier (e.g., "route-build").
    fn provider_id(&self) -> &str;

    fn supported_chains(&self) -> &[u64];

    fn supports_chain(&self, chain_id: u64) -> bool {
        self.supported_chains().contains(&chain_id)
    }

    async fn quote(&self, chain_id: u64, request: &QuoteRequest) -> Result<SwapQuote, SdkError>;
}

/// Providers indexed by chain, tried in registration order.
#[derive(Debug, Default)]
pub struct QuoteProviderRegistry {
    providers: HashMap<u64, Vec<Arc<dyn QuoteProvider>>>,
}

impl QuoteProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn QuoteProvider>) -> Self {
        for chain_id in provider.supported_chains() {
            self.providers
                .entry(*chain_id)
                .or_default()
                .push(Arc::clone(&provider));
        }
        self
    }

    pub fn providers_for_chain(&self, chain_id: u64) -> &[Arc<dyn QuoteProvider>] {
        self.providers
            .get(&chain_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Ask each provider for the chain in turn; first success wins.
    pub async fn quote_with_fallback(
        &self,
        chain_id: u64,
        request: &QuoteRequest,
    ) -> Result<SwapQuote, SdkError> {
        let mut last_error = None;

        for provider in self.providers_for_chain(chain_id) {
            match provider.quote(chain_id, request).await {
                Ok(quote) => return Ok(quote),
                Err(e) => {
                    warn!(
                        provider = provider.provider_id(),
                        chain_id,
                        error = %e,
                        "Quote provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SdkError::Config(format!("no quote provider configured for chain {chain_id}"))
        }))
    }
}

/// Quote provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    #[serde(default = "default_slippage_bps")]
    pub default_slippage_bps: u32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub route_build: Option<RouteBuildConfig>,

    #[serde(default)]
    pub token_gated: Option<TokenGatedConfig>,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            default_slippage_bps: default_slippage_bps(),
            request_timeout_ms: default_request_timeout_ms(),
            route_build: None,
            token_gated: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteBuildConfig {
    pub base_url: String,
    /// Sent as `x-client-id`
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGatedConfig {
    pub base_url: String,
    pub chains: Vec<u64>,
    /// Ceiling applied until the handshake declares one
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_slippage_bps() -> u32 {
    50
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_requests_per_second() -> u32 {
    1
}

pub(crate) fn http_client(timeout_ms: u64) -> Result<reqwest::Client, SdkError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| SdkError::Config(format!("http client: {e}")))
}

/// Decode a JSON body, turning non-2xx responses into request failures.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SdkError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SdkError::Request(
            RequestFailure::new(body).with_status(status.as_u16()),
        ));
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decimal integer carried as a JSON string.
pub(crate) fn parse_amount(field: &str, raw: &str) -> Result<U256, SdkError> {
    raw.parse::<U256>()
        .map_err(|e| SdkError::Decode(format!("{field}: {raw:?} is not an integer: {e}")))
}

/// Either a string or a number in JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Numeric {
    Text(String),
    Number(u64),
}

impl Numeric {
    pub(crate) fn to_u256(&self, field: &str) -> Result<U256, SdkError> {
        match self {
            Self::Text(raw) => parse_amount(field, raw),
            Self::Number(n) => Ok(U256::from(*n)),
        }
    }
}
