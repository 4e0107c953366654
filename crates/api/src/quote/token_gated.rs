//! Credential-gated quote provider.
//!
//! A short-lived bearer token is obtained per wallet through
//! `POST {base}/auth/token`. The handshake also declares a requests-per-second
//! ceiling, which is applied to that wallet's subsequent quote calls.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use lending_sdk_chain::{retry_with_backoff, SdkError, SharedRetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{http_client, read_json, Numeric, QuoteProvider, QuoteRequest, SwapQuote, TokenGatedConfig};
use crate::throttle::{Credential, CredentialCache, RateLimiter};

/// Lifetime assumed when the handshake omits one.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct TokenRequest {
    address: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    /// Seconds until expiry
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    rate_limit: Option<DeclaredRateLimit>,
}

#[derive(Debug, Deserialize)]
struct DeclaredRateLimit {
    rps: u32,
}

impl TokenResponse {
    fn into_credential(self) -> Credential {
        let ttl = self
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let credential = Credential::new(self.token, ttl);
        match self.rate_limit {
            Some(limit) => credential.with_rate_limit(limit.rps),
            None => credential,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBody {
    chain_id: u64,
    token_in: Address,
    token_out: Address,
    amount_in: String,
    slippage_bps: u32,
    sender: Address,
    recipient: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    amount_out: Numeric,
    min_amount_out: Numeric,
    router: Address,
    calldata: Bytes,
    #[serde(default)]
    value: Option<Numeric>,
}

/// Quote provider behind a per-wallet credential handshake.
pub struct TokenGatedProvider {
    http: reqwest::Client,
    base_url: String,
    chains: Vec<u64>,
    retry: SharedRetryPolicy,
    credentials: CredentialCache,
    limiter: RateLimiter,
}

impl std::fmt::Debug for TokenGatedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGatedProvider")
            .field("base_url", &self.base_url)
            .field("chains", &self.chains)
            .field("cached_credentials", &self.credentials.len())
            .finish()
    }
}

impl TokenGatedProvider {
    pub fn new(
        config: &TokenGatedConfig,
        timeout_ms: u64,
        retry: SharedRetryPolicy,
    ) -> Result<Self, SdkError> {
        Ok(Self {
            http: http_client(timeout_ms)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chains: config.chains.clone(),
            retry,
            credentials: CredentialCache::new(),
            limiter: RateLimiter::per_second(config.requests_per_second),
        })
    }

    async fn handshake(&self, wallet: Address) -> Result<Credential, SdkError> {
        let url = format!("{}/auth/token", self.base_url);
        let url = url.as_str();
        let body = &TokenRequest { address: wallet };

        let response: TokenResponse =
            retry_with_backoff(&self.retry, "quote_auth", move || async move {
                read_json(self.http.post(url).json(body).send().await?).await
            })
            .await?;

        let credential = response.into_credential();
        info!(
            wallet = %wallet,
            rps = ?credential.requests_per_second,
            "Quote provider credential issued"
        );
        Ok(credential)
    }

    /// Cached credential for `wallet`, performing the handshake when needed.
    async fn credential(&self, wallet: Address) -> Result<Credential, SdkError> {
        let identity = wallet.to_string();
        let credential = self
            .credentials
            .ensure_credential(&identity, || self.handshake(wallet))
            .await?;

        if let Some(rps) = credential.requests_per_second {
            self.limiter.set_limit(&identity, rps).await;
        }
        Ok(credential)
    }

    async fn request_quote(
        &self,
        credential: &Credential,
        body: &QuoteBody,
    ) -> Result<QuoteResponse, SdkError> {
        let url = format!("{}/quote", self.base_url);
        let url = url.as_str();
        let identity = body.sender.to_string();
        let identity = identity.as_str();
        let token = credential.token.as_str();

        retry_with_backoff(&self.retry, "quote_request", move || async move {
            let waited = self.limiter.throttle(identity).await;
            if !waited.is_zero() {
                debug!(wait_ms = waited.as_millis() as u64, "Quote request throttled");
            }
            let response = self
                .http
                .post(url)
                .bearer_auth(token)
                .json(body)
                .send()
                .await?;
            read_json(response).await
        })
        .await
    }
}

fn is_unauthorized(err: &SdkError) -> bool {
    err.failure()
        .and_then(|f| f.status)
        .is_some_and(|status| status == 401 || status == 403)
}

#[async_trait]
impl QuoteProvider for TokenGatedProvider {
    fn provider_id(&self) -> &str {
        "token-gated"
    }

    fn supported_chains(&self) -> &[u64] {
        &self.chains
    }

    #[instrument(skip(self, request), fields(token_in = %request.token_in, token_out = %request.token_out))]
    async fn quote(&self, chain_id: u64, request: &QuoteRequest) -> Result<SwapQuote, SdkError> {
        let body = QuoteBody {
            chain_id,
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: request.amount_in.to_string(),
            slippage_bps: request.slippage_bps,
            sender: request.sender,
            recipient: request.recipient,
        };

        let credential = self.credential(request.sender).await?;
        let response = match self.request_quote(&credential, &body).await {
            Err(e) if is_unauthorized(&e) => {
                // token revoked early; one fresh handshake
                warn!(wallet = %request.sender, "Credential rejected, re-authenticating");
                self.credentials.invalidate(&request.sender.to_string()).await;
                let credential = self.credential(request.sender).await?;
                self.request_quote(&credential, &body).await?
            }
            other => other?,
        };

        let value = match &response.value {
            Some(value) => value.to_u256("value")?,
            None => request.native_value(),
        };

        Ok(SwapQuote {
            provider: self.provider_id().to_string(),
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: request.amount_in,
            expected_output: response.amount_out.to_u256("amountOut")?,
            min_output: response.min_amount_out.to_u256("minAmountOut")?,
            router: response.router,
            calldata: response.calldata,
            value,
        })
    }
}
