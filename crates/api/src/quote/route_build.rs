//! Stateless quote-then-build aggregator.
//!
//! `GET {base}/{chain}/api/v1/routes` returns an opaque route summary;
//! `POST {base}/{chain}/api/v1/route/build` turns it into router calldata
//! with the slippage guard applied.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use lending_sdk_chain::{retry_with_backoff, SdkError, SharedRetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    http_client, min_output_after_slippage, read_json, Numeric, QuoteProvider, QuoteRequest,
    RouteBuildConfig, SwapQuote,
};

const SUPPORTED_CHAINS: &[u64] = &[1, 10, 56, 137, 8453, 42161];

/// Path segment the aggregator uses for a chain.
fn chain_slug(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("ethereum"),
        10 => Some("optimism"),
        56 => Some("bsc"),
        137 => Some("polygon"),
        8453 => Some("base"),
        42161 => Some("arbitrum"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, step: &str) -> Result<T, SdkError> {
        if self.code != 0 {
            return Err(SdkError::request(format!(
                "{step} failed with code {}: {}",
                self.code, self.message
            )));
        }
        self.data
            .ok_or_else(|| SdkError::Decode(format!("{step}: response has no data")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutesData {
    /// Passed back verbatim to the build step
    route_summary: serde_json::Value,
    router_address: Address,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildRequest<'a> {
    route_summary: &'a serde_json::Value,
    sender: Address,
    recipient: Address,
    slippage_tolerance: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildData {
    amount_out: Numeric,
    data: Bytes,
    router_address: Address,
}

/// Quote-then-build aggregator client.
#[derive(Clone)]
pub struct RouteBuildProvider {
    http: reqwest::Client,
    base_url: String,
    client_id: Option<String>,
    retry: SharedRetryPolicy,
}

impl std::fmt::Debug for RouteBuildProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBuildProvider")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl RouteBuildProvider {
    pub fn new(
        config: &RouteBuildConfig,
        timeout_ms: u64,
        retry: SharedRetryPolicy,
    ) -> Result<Self, SdkError> {
        Ok(Self {
            http: http_client(timeout_ms)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            retry,
        })
    }

    fn endpoint(&self, chain_id: u64, path: &str) -> Result<String, SdkError> {
        let slug = chain_slug(chain_id).ok_or_else(|| {
            SdkError::Config(format!("route-build provider does not support chain {chain_id}"))
        })?;
        Ok(format!("{}/{}/api/v1/{}", self.base_url, slug, path))
    }

    fn with_client_id(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.client_id {
            Some(id) => request.header("x-client-id", id),
            None => request,
        }
    }

    async fn fetch_route(&self, chain_id: u64, request: &QuoteRequest) -> Result<RoutesData, SdkError> {
        let url = self.endpoint(chain_id, "routes")?;
        let url = url.as_str();
        let query = [
            ("tokenIn", request.token_in.to_string()),
            ("tokenOut", request.token_out.to_string()),
            ("amountIn", request.amount_in.to_string()),
        ];
        let query = &query;

        let envelope: Envelope<RoutesData> =
            retry_with_backoff(&self.retry, "quote_routes", move || async move {
                let response = self
                    .with_client_id(self.http.get(url).query(query))
                    .send()
                    .await?;
                read_json(response).await
            })
            .await?;
        envelope.into_data("routes")
    }

    async fn build_route(
        &self,
        chain_id: u64,
        request: &QuoteRequest,
        route: &RoutesData,
    ) -> Result<BuildData, SdkError> {
        let url = self.endpoint(chain_id, "route/build")?;
        let url = url.as_str();
        let body = BuildRequest {
            route_summary: &route.route_summary,
            sender: request.sender,
            recipient: request.recipient,
            slippage_tolerance: request.slippage_bps,
        };
        let body = &body;

        let envelope: Envelope<BuildData> =
            retry_with_backoff(&self.retry, "quote_build", move || async move {
                let response = self
                    .with_client_id(self.http.post(url).json(body))
                    .send()
                    .await?;
                read_json(response).await
            })
            .await?;
        envelope.into_data("route build")
    }
}

#[async_trait]
impl QuoteProvider for RouteBuildProvider {
    fn provider_id(&self) -> &str {
        "route-build"
    }

    fn supported_chains(&self) -> &[u64] {
        SUPPORTED_CHAINS
    }

    #[instrument(skip(self, request), fields(token_in = %request.token_in, token_out = %request.token_out))]
    async fn quote(&self, chain_id: u64, request: &QuoteRequest) -> Result<SwapQuote, SdkError> {
        let route = self.fetch_route(chain_id, request).await?;
        let built = self.build_route(chain_id, request, &route).await?;

        let expected_output: U256 = built.amount_out.to_u256("amountOut")?;
        if route.router_address != built.router_address {
            debug!(
                quoted = %route.router_address,
                built = %built.router_address,
                "Router changed between quote and build"
            );
        }

        Ok(SwapQuote {
            provider: self.provider_id().to_string(),
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: request.amount_in,
            expected_output,
            min_output: min_output_after_slippage(expected_output, request.slippage_bps),
            router: built.router_address,
            calldata: built.data,
            value: request.native_value(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lending_sdk_chain::RetryPolicy;

    fn provider() -> RouteBuildProvider {
        let config = RouteBuildConfig {
            base_url: "https://aggregator.example/".to_string(),
            client_id: Some("lending-sdk".to_string()),
        };
        RouteBuildProvider::new(&config, 5_000, RetryPolicy::none().into()).unwrap()
    }

    #[test]
    fn test_endpoint() {
        let provider = provider();
        assert_eq!(
            provider.endpoint(8453, "routes").unwrap(),
            "https://aggregator.example/base/api/v1/routes"
        );
        assert_eq!(
            provider.endpoint(42161, "route/build").unwrap(),
            "https://aggregator.example/arbitrum/api/v1/route/build"
        );
        assert!(matches!(provider.endpoint(999, "routes"), Err(SdkError::Config(_))));
    }

    #[test]
    fn test_every_supported_chain_has_slug() {
        for chain_id in SUPPORTED_CHAINS {
            assert!(chain_slug(*chain_id).is_some(), "chain {chain_id}");
        }
    }

    #[test]
    fn test_parse_routes_envelope() {
        let json = r#"{
            "code": 0,
            "message": "successfully",
            "data": {
                "routeSummary": { "amountOut": "998000", "route": [] },
                "routerAddress": "0x6131b5fae19ea4f9d964eac0408e4408b66337b5"
            }
        }"#;
        let envelope: Envelope<RoutesData> = serde_json::from_str(json).unwrap();
        let data = envelope.into_data("routes").unwrap();
        assert_eq!(data.route_summary["amountOut"], "998000");
    }

    #[test]
    fn test_envelope_error_code() {
        let json = r#"{ "code": 4008, "message": "route not found", "data": null }"#;
        let envelope: Envelope<RoutesData> = serde_json::from_str(json).unwrap();
        let err = envelope.into_data("routes").unwrap_err();
        assert!(err.to_string().contains("route not found"));
    }

    #[test]
    fn test_parse_build_data() {
        let json = r#"{
            "code": 0,
            "data": {
                "amountIn": "1000000",
                "amountOut": "998000",
                "data": "0xe21fd0e9",
                "routerAddress": "0x6131b5fae19ea4f9d964eac0408e4408b66337b5"
            }
        }"#;
        let envelope: Envelope<BuildData> = serde_json::from_str(json).unwrap();
        let data = envelope.into_data("route build").unwrap();
        assert_eq!(data.amount_out.to_u256("amountOut").unwrap(), U256::from(998_000u64));
        assert_eq!(data.data, Bytes::from(vec![0xe2, 0x1f, 0xd0, 0xe9]));
    }

    #[test]
    fn test_build_request_shape() {
        let summary = serde_json::json!({ "amountOut": "1" });
        let body = BuildRequest {
            route_summary: &summary,
            sender: Address::repeat_byte(1),
            recipient: Address::repeat_byte(2),
            slippage_tolerance: 50,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["slippageTolerance"], 50);
        assert_eq!(value["routeSummary"]["amountOut"], "1");
    }
}
