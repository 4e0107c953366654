//! SDK configuration.
//!
//! A single TOML file with one section per component:
//! - `[chain]`: chain id and RPC endpoint
//! - `[retry]`: backoff policy shared by RPC and HTTP clients
//! - `[push_oracle]`: signer-network gateways and quorum
//! - `[contracts]`: zapper, position manager and push-oracle adapter
//! - `[quotes]`: swap-quote providers
//! - `[transaction]`: gas buffer and receipt polling
//! - `[[markets]]`: market tokens and their price adapters
//!
//! `${VAR}` references are expanded from the environment before parsing.
//! The signing key is never read from the file; see [`private_key_from_env`].

mod markets;

pub use markets::{MarketConfig, MarketRegistry};

use std::path::Path;

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use lending_sdk_api::{PushOracleConfig, QuoteConfig};
use lending_sdk_chain::{RetryConfig, TransactionConfig};
use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Environment variable selecting the config file.
pub const CONFIG_ENV: &str = "SDK_CONFIG";
/// Environment variable holding the signing key.
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
const DEFAULT_CONFIG_PATH: &str = "./config/sdk.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub push_oracle: PushOracleConfig,

    #[serde(default)]
    pub contracts: ContractsConfig,

    #[serde(default)]
    pub quotes: QuoteConfig,

    #[serde(default)]
    pub transaction: TransactionConfig,

    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

/// Chain endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

fn default_chain_id() -> u64 {
    1
}
fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            rpc_url: default_rpc_url(),
        }
    }
}

/// Protocol-wide contracts. Market contracts live in `[[markets]]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    #[serde(default)]
    pub zapper: Option<Address>,
    #[serde(default)]
    pub position_manager: Option<Address>,
    /// Receives bundled `writePrice` calls
    #[serde(default)]
    pub push_oracle_adapter: Option<Address>,
}

impl SdkConfig {
    /// Parse TOML, expanding `${VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env(content)?;
        let config: SdkConfig = toml::from_str(&expanded).context("Invalid SDK config")?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Load from `SDK_CONFIG`, or `./config/sdk.toml` when unset.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config = Self::from_file(&path)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-section checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;

        let markets = MarketRegistry::from_configs(&self.markets).map_err(anyhow::Error::msg)?;
        if markets.uses_push_oracle() {
            if self.contracts.push_oracle_adapter.is_none() {
                bail!("markets use a push-signed adapter but contracts.push_oracle_adapter is not set");
            }
            self.push_oracle
                .validate()
                .map_err(|e| anyhow::anyhow!("push_oracle: {e}"))?;
        }
        if self.transaction.receipt_poll_ms == 0 {
            bail!("transaction.receipt_poll_ms must be positive");
        }
        Ok(())
    }

    pub fn market_registry(&self) -> Result<MarketRegistry> {
        MarketRegistry::from_configs(&self.markets).map_err(anyhow::Error::msg)
    }

    /// Log the loaded configuration.
    pub fn log_config(&self) {
        info!(
            chain_id = self.chain.chain_id,
            markets = self.markets.len(),
            "SDK configuration loaded"
        );
        info!(
            max_retries = self.retry.max_retries,
            base_delay_ms = self.retry.base_delay_ms,
            max_delay_ms = self.retry.max_delay_ms,
            multiplier = self.retry.backoff_multiplier,
            "Retry policy"
        );
        info!(
            data_service = %self.push_oracle.data_service_id,
            gateways = self.push_oracle.gateway_urls.len(),
            required_signers = self.push_oracle.required_signers,
            authorized_signers = self.push_oracle.authorized_signers.len(),
            "Push oracle"
        );
    }
}

/// Signing key from `PRIVATE_KEY`, if set and non-empty.
pub fn private_key_from_env() -> Option<String> {
    std::env::var(PRIVATE_KEY_ENV)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
/// Unset variables are left untouched.
pub fn expand_env(s: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").context("env pattern")?;
    Ok(re
        .replace_all(s, |caps: &Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned())
}
