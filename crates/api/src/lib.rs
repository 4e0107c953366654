//! Off-chain service clients for the lending SDK.
//!
//! This crate provides HTTP clients for:
//! - Push-oracle gateways: quorum-signed price payloads
//! - Swap aggregators: quotes and router calldata for zap and leverage flows
//!
//! plus the per-identity credential cache and rate limiter they share.

pub mod push_oracle;
pub mod quote;
mod throttle;

pub use push_oracle::{
    select_quorum, DataPackage, DataPoint, GatewayResponse, PricePayloadSource, PushOracleClient,
    PushOracleConfig, SignedPricePayload,
};
pub use quote::{
    min_output_after_slippage, QuoteConfig, QuoteProvider, QuoteProviderRegistry, QuoteRequest,
    RouteBuildConfig, RouteBuildProvider, SwapQuote, TokenGatedConfig, TokenGatedProvider,
    NATIVE_TOKEN,
};
pub use throttle::{Credential, CredentialCache, RateLimiter, RequestWindow};
