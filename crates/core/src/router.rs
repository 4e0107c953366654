//! Price-freshness routing.
//!
//! Markets priced by a push adapter only see a fresh price if it is written
//! in the same transaction as the action reading it. The router detects those
//! markets and wraps the action in a `[price update, action]` multicall.
//! Only the acting market's own price is refreshed.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use lending_sdk_api::{PricePayloadSource, SignedPricePayload};
use lending_sdk_chain::contracts::IPushOracleAdapter;
use lending_sdk_chain::{CallAction, MulticallAssembler, Submission};
use tracing::{debug, info, instrument};

use crate::action::Action;
use crate::error::{Error, Result};
use crate::token::Token;

/// Decides per action whether a price update must accompany it.
#[derive(Clone)]
pub struct PriceFreshnessRouter {
    payloads: Arc<dyn PricePayloadSource>,
    /// Push-oracle adapter receiving `writePrice`
    push_adapter: Option<Address>,
    /// Written prices are denominated in USD
    price_in_usd: bool,
}

impl std::fmt::Debug for PriceFreshnessRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFreshnessRouter")
            .field("push_adapter", &self.push_adapter)
            .field("price_in_usd", &self.price_in_usd)
            .finish()
    }
}

impl PriceFreshnessRouter {
    pub fn new(payloads: Arc<dyn PricePayloadSource>, push_adapter: Option<Address>) -> Self {
        Self {
            payloads,
            push_adapter,
            price_in_usd: true,
        }
    }

    pub fn with_price_in_usd(mut self, price_in_usd: bool) -> Self {
        self.price_in_usd = price_in_usd;
        self
    }

    /// `writePrice(asset, inUSD, timestamp)` with the signed payload appended.
    pub fn encode_price_update(
        &self,
        token: &Token,
        payload: &SignedPricePayload,
    ) -> Result<CallAction> {
        let adapter = self.push_adapter.ok_or(Error::MissingContract("push oracle adapter"))?;
        let mut data = IPushOracleAdapter::writePriceCall {
            asset: token.underlying(),
            inUSD: self.price_in_usd,
            timestamp: U256::from(payload.timestamp),
        }
        .abi_encode();
        data.extend_from_slice(&payload.encoded_packages);
        Ok(MulticallAssembler::build_price_update(adapter, data))
    }

    /// Final submission for `action` on `token`.
    ///
    /// A payload failure aborts here, before anything is sent.
    #[instrument(skip(self, action, token), fields(action = action.name(), market = token.symbol()))]
    pub async fn route(&self, action: &Action, token: &Token) -> Result<Submission> {
        if action.requires_borrowable() && !token.is_borrowable() {
            return Err(Error::NotBorrowable {
                action: action.name(),
                token: token.symbol().to_string(),
            });
        }

        let call = action.encode(token.address());
        if !action.reads_market_price() || !token.requires_price_update() {
            debug!(adapters = ?token.adapters(), "No bundled price update needed");
            return Ok(MulticallAssembler::single(call));
        }
        if self.push_adapter.is_none() {
            return Err(Error::MissingContract("push oracle adapter"));
        }

        let payload = self.payloads.get_payload(token.asset_symbol()).await?;
        let update = self.encode_price_update(token, &payload)?;
        info!(
            asset = token.asset_symbol(),
            price_timestamp = payload.timestamp,
            signers = payload.signer_count,
            "Bundling price update"
        );

        let entry_point = call.target;
        Ok(MulticallAssembler::assemble(entry_point, [update], call))
    }
}
