//! Signer-network gateway types and client configuration.

use std::collections::HashMap;

use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

/// `GET /data-packages/latest/{service}` body: asset symbol to packages.
pub type GatewayResponse = HashMap<String, Vec<DataPackage>>;

/// One signer's attestation for a set of feeds at one timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPackage {
    pub timestamp_milliseconds: u64,
    /// 65-byte `r || s || v` signature, hex encoded
    pub signature: String,
    pub signer_address: Address,
    pub data_points: Vec<DataPoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub data_feed_id: String,
    pub value: f64,
}

/// Quorum-signed price data ready to append to a price-update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPricePayload {
    pub asset: String,
    pub encoded_packages: Bytes,
    /// Package timestamp, seconds
    pub timestamp: u64,
    pub signer_count: usize,
}

/// Push-oracle client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOracleConfig {
    #[serde(default = "default_data_service_id")]
    pub data_service_id: String,

    #[serde(default = "default_gateway_urls")]
    pub gateway_urls: Vec<String>,

    /// Distinct authorized signatures required per payload
    #[serde(default = "default_required_signers")]
    pub required_signers: usize,

    #[serde(default)]
    pub authorized_signers: Vec<Address>,

    /// Reject packages older than this; `None` disables the check
    #[serde(default = "default_max_payload_age_secs")]
    pub max_payload_age_secs: Option<u64>,

    /// Per-gateway request ceiling
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Appended verbatim to the payload trailer
    #[serde(default)]
    pub unsigned_metadata: String,
}

fn default_data_service_id() -> String {
    "redstone-primary-prod".to_string()
}
fn default_gateway_urls() -> Vec<String> {
    vec![
        "https://oracle-gateway-1.a.redstone.finance".to_string(),
        "https://oracle-gateway-2.a.redstone.finance".to_string(),
    ]
}
fn default_required_signers() -> usize {
    3
}
fn default_max_payload_age_secs() -> Option<u64> {
    Some(180)
}
fn default_requests_per_second() -> u32 {
    10
}
fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for PushOracleConfig {
    fn default() -> Self {
        Self {
            data_service_id: default_data_service_id(),
            gateway_urls: default_gateway_urls(),
            required_signers: default_required_signers(),
            authorized_signers: Vec::new(),
            max_payload_age_secs: default_max_payload_age_secs(),
            requests_per_second: default_requests_per_second(),
            request_timeout_ms: default_request_timeout_ms(),
            unsigned_metadata: String::new(),
        }
    }
}

impl PushOracleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.required_signers == 0 {
            return Err("required_signers must be at least 1".to_string());
        }
        if self.authorized_signers.len() < self.required_signers {
            return Err(format!(
                "{} authorized signers cannot satisfy a quorum of {}",
                self.authorized_signers.len(),
                self.required_signers
            ));
        }
        if self.gateway_urls.is_empty() {
            return Err("at least one gateway url is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gateway_response() {
        let json = r#"{
            "ETH": [{
                "timestampMilliseconds": 1700000000000,
                "signature": "0xabcd",
                "signerAddress": "0x8bb8f32df04c8b654987daaed53d6b6091e3b774",
                "dataPoints": [{ "dataFeedId": "ETH", "value": 2034.56 }]
            }]
        }"#;

        let response: GatewayResponse = serde_json::from_str(json).unwrap();
        let packages = &response["ETH"];
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].timestamp_milliseconds, 1_700_000_000_000);
        assert_eq!(packages[0].data_points[0].data_feed_id, "ETH");
        assert_eq!(packages[0].data_points[0].value, 2034.56);
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = PushOracleConfig::default();
        assert_eq!(config.required_signers, 3);
        assert_eq!(config.max_payload_age_secs, Some(180));
        // no allowlist configured
        assert!(config.validate().is_err());

        let config = PushOracleConfig {
            authorized_signers: (1..=4u8).map(Address::repeat_byte).collect(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
