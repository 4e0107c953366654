//! Push-oracle client.
//!
//! Fetches signed data packages for an asset from the signer-network
//! gateways, keeps only allowlisted signers, picks the newest timestamp that
//! reaches quorum and serializes exactly `required_signers` packages into the
//! payload appended to a price-update call. Every call fetches; payloads are
//! never kept between actions.

pub mod payload;
mod types;

pub use types::{DataPackage, DataPoint, GatewayResponse, PushOracleConfig, SignedPricePayload};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use futures::future::join_all;
use lending_sdk_chain::{retry_with_backoff, RequestFailure, SdkError, SharedRetryPolicy};
use tracing::{debug, info, instrument, warn};

use crate::throttle::RateLimiter;

/// Anything that can produce a signed price payload for an asset.
#[async_trait]
pub trait PricePayloadSource: Send + Sync {
    async fn get_payload(&self, asset_symbol: &str) -> Result<SignedPricePayload, SdkError>;
}

/// Signer-network gateway client with quorum selection.
pub struct PushOracleClient {
    http: reqwest::Client,
    config: PushOracleConfig,
    retry: SharedRetryPolicy,
    /// Keyed by gateway URL
    limiter: RateLimiter,
}

impl std::fmt::Debug for PushOracleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushOracleClient")
            .field("data_service_id", &self.config.data_service_id)
            .field("gateways", &self.config.gateway_urls)
            .field("required_signers", &self.config.required_signers)
            .finish()
    }
}

impl PushOracleClient {
    pub fn new(config: PushOracleConfig, retry: SharedRetryPolicy) -> Result<Self, SdkError> {
        config.validate().map_err(SdkError::Config)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SdkError::Config(format!("http client: {e}")))?;

        info!(
            data_service_id = %config.data_service_id,
            gateways = config.gateway_urls.len(),
            required_signers = config.required_signers,
            authorized_signers = config.authorized_signers.len(),
            "Push oracle client initialized"
        );

        Ok(Self {
            http,
            limiter: RateLimiter::per_second(config.requests_per_second),
            config,
            retry,
        })
    }

    pub fn config(&self) -> &PushOracleConfig {
        &self.config
    }

    async fn fetch_gateway(&self, gateway: &str) -> Result<GatewayResponse, SdkError> {
        let url = format!(
            "{}/data-packages/latest/{}",
            gateway.trim_end_matches('/'),
            self.config.data_service_id
        );
        let url = url.as_str();

        retry_with_backoff(&self.retry, "push_oracle_gateway", move || async move {
            self.limiter.throttle(gateway).await;
            let response = self.http.get(url).send().await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SdkError::Request(
                    RequestFailure::new(format!("gateway {gateway}: {body}"))
                        .with_status(status.as_u16()),
                ));
            }
            Ok::<_, SdkError>(response.json::<GatewayResponse>().await?)
        })
        .await
    }

    /// Packages for `asset` from every gateway that answered.
    async fn fetch_packages(&self, asset: &str) -> Result<Vec<DataPackage>, SdkError> {
        let responses = join_all(
            self.config
                .gateway_urls
                .iter()
                .map(|gateway| self.fetch_gateway(gateway)),
        )
        .await;

        let mut packages = Vec::new();
        let mut last_error = None;
        for (gateway, response) in self.config.gateway_urls.iter().zip(responses) {
            match response {
                Ok(mut body) => packages.extend(body.remove(asset).unwrap_or_default()),
                Err(e) => {
                    warn!(gateway = %gateway, error = %e, "Gateway request failed");
                    last_error = Some(e);
                }
            }
        }

        if packages.is_empty() {
            // every gateway failed
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(packages)
    }

    /// Quorum selection, freshness check and encoding.
    pub fn build_payload(
        &self,
        asset: &str,
        packages: Vec<DataPackage>,
        now_ms: u64,
    ) -> Result<SignedPricePayload, SdkError> {
        let (timestamp_ms, selected) = select_quorum(
            asset,
            packages,
            &self.config.authorized_signers,
            self.config.required_signers,
        )?;

        if let Some(max_age_secs) = self.config.max_payload_age_secs {
            let age_secs = now_ms.saturating_sub(timestamp_ms) / 1_000;
            if age_secs > max_age_secs {
                return Err(SdkError::StalePayload {
                    asset: asset.to_string(),
                    age_secs,
                    max_age_secs,
                });
            }
        }

        let encoded_packages =
            payload::encode_payload(&selected, self.config.unsigned_metadata.as_bytes())?;

        Ok(SignedPricePayload {
            asset: asset.to_string(),
            encoded_packages,
            timestamp: timestamp_ms / 1_000,
            signer_count: selected.len(),
        })
    }
}

#[async_trait]
impl PricePayloadSource for PushOracleClient {
    #[instrument(skip(self))]
    async fn get_payload(&self, asset_symbol: &str) -> Result<SignedPricePayload, SdkError> {
        let packages = self.fetch_packages(asset_symbol).await?;
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let payload = self.build_payload(asset_symbol, packages, now_ms)?;

        info!(
            timestamp = payload.timestamp,
            signers = payload.signer_count,
            bytes = payload.encoded_packages.len(),
            "Signed price payload ready"
        );
        Ok(payload)
    }
}

/// Newest timestamp with at least `required` distinct authorized signers,
/// and exactly `required` of its packages (ordered by signer address).
pub fn select_quorum(
    asset: &str,
    packages: Vec<DataPackage>,
    authorized: &[Address],
    required: usize,
) -> Result<(u64, Vec<DataPackage>), SdkError> {
    let allowlist: HashSet<&Address> = authorized.iter().collect();

    let mut by_timestamp: BTreeMap<u64, HashMap<Address, DataPackage>> = BTreeMap::new();
    for package in packages {
        if !allowlist.contains(&package.signer_address) {
            debug!(signer = %package.signer_address, "Ignoring package from unauthorized signer");
            continue;
        }
        by_timestamp
            .entry(package.timestamp_milliseconds)
            .or_default()
            .entry(package.signer_address)
            .or_insert(package);
    }

    let best_count = by_timestamp.values().map(HashMap::len).max().unwrap_or(0);

    let (timestamp_ms, signers) = by_timestamp
        .into_iter()
        .rev()
        .find(|(_, signers)| signers.len() >= required.max(1))
        .ok_or_else(|| SdkError::QuorumFailure {
            asset: asset.to_string(),
            required,
            received: best_count,
        })?;

    let mut selected: Vec<DataPackage> = signers.into_values().collect();
    selected.sort_by_key(|p| p.signer_address);
    selected.truncate(required);

    Ok((timestamp_ms, selected))
}
