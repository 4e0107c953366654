//! Decimal-in SDK facade.
//!
//! Callers pass human decimal amounts; they are floored to on-chain units
//! before anything touches the network. Every state-changing call goes
//! through the [`PriceFreshnessRouter`] and then the transaction sender.

use std::sync::Arc;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use fastnum::D256;
use lending_sdk_api::{
    PricePayloadSource, PushOracleClient, QuoteProviderRegistry, QuoteRequest, RouteBuildProvider,
    SignedPricePayload, TokenGatedProvider,
};
use lending_sdk_chain::contracts::{IBorrowableCToken, ICToken, IERC20};
use lending_sdk_chain::{
    AlloyRpcClient, MulticallAssembler, ResilientRpc, RetryPolicy, RpcClient, SdkError,
    SharedRetryPolicy, Submission, TransactionSender, TransactionSenderBuilder,
};
use tracing::{debug, info, instrument};

use crate::action::{swap_from_quote, Action};
use crate::config::{ContractsConfig, MarketRegistry, SdkConfig};
use crate::error::{Error, Result};
use crate::fixed_point::{basis_points_to_wad, decimal_to_integer, integer_to_decimal};
use crate::router::PriceFreshnessRouter;
use crate::token::Token;

/// Payload source for deployments without push-priced markets.
struct NoPushOracle;

#[async_trait]
impl PricePayloadSource for NoPushOracle {
    async fn get_payload(&self, asset_symbol: &str) -> std::result::Result<SignedPricePayload, SdkError> {
        Err(SdkError::Config(format!(
            "price payload requested for {asset_symbol} but no push oracle is configured"
        )))
    }
}

/// Lending SDK client.
pub struct LendingClient {
    rpc: Arc<dyn RpcClient>,
    router: PriceFreshnessRouter,
    sender: Option<TransactionSender>,
    quotes: QuoteProviderRegistry,
    markets: MarketRegistry,
    contracts: ContractsConfig,
    chain_id: u64,
    default_slippage_bps: u32,
    /// Owner and receiver of positions
    account: Address,
}

impl std::fmt::Debug for LendingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LendingClient")
            .field("chain_id", &self.chain_id)
            .field("account", &self.account)
            .field("markets", &self.markets.len())
            .field("can_send", &self.sender.is_some())
            .finish()
    }
}

impl LendingClient {
    pub fn new(
        rpc: Arc<dyn RpcClient>,
        router: PriceFreshnessRouter,
        markets: MarketRegistry,
        contracts: ContractsConfig,
        chain_id: u64,
    ) -> Self {
        Self {
            rpc,
            router,
            sender: None,
            quotes: QuoteProviderRegistry::new(),
            markets,
            contracts,
            chain_id,
            default_slippage_bps: 50,
            account: Address::ZERO,
        }
    }

    /// Enable sending; the signer becomes the acting account.
    pub fn with_sender(mut self, sender: TransactionSender) -> Self {
        self.account = sender.address;
        self.sender = Some(sender);
        self
    }

    /// Acting account for a read-only client.
    pub fn with_account(mut self, account: Address) -> Self {
        self.account = account;
        self
    }

    pub fn with_quotes(mut self, quotes: QuoteProviderRegistry, default_slippage_bps: u32) -> Self {
        self.quotes = quotes;
        self.default_slippage_bps = default_slippage_bps;
        self
    }

    /// Wire every component from configuration. Without a key the client can
    /// plan and read but not send.
    pub async fn connect(config: &SdkConfig, private_key: Option<&str>) -> Result<Self> {
        let retry: SharedRetryPolicy = RetryPolicy::from(&config.retry).into();
        let rpc = ResilientRpc::new(AlloyRpcClient::connect_http(&config.chain.rpc_url)?, retry.clone())
            .into_shared();

        let markets = config
            .market_registry()
            .map_err(|e| SdkError::Config(e.to_string()))?;
        let payloads: Arc<dyn PricePayloadSource> = if markets.uses_push_oracle() {
            Arc::new(PushOracleClient::new(config.push_oracle.clone(), retry.clone())?)
        } else {
            Arc::new(NoPushOracle)
        };
        let router = PriceFreshnessRouter::new(payloads, config.contracts.push_oracle_adapter);

        let mut quotes = QuoteProviderRegistry::new();
        if let Some(route_build) = &config.quotes.route_build {
            quotes = quotes.with_provider(Arc::new(RouteBuildProvider::new(
                route_build,
                config.quotes.request_timeout_ms,
                retry.clone(),
            )?));
        }
        if let Some(token_gated) = &config.quotes.token_gated {
            quotes = quotes.with_provider(Arc::new(TokenGatedProvider::new(
                token_gated,
                config.quotes.request_timeout_ms,
                retry.clone(),
            )?));
        }

        let mut client = Self::new(
            rpc.clone(),
            router,
            markets,
            config.contracts.clone(),
            config.chain.chain_id,
        )
        .with_quotes(quotes, config.quotes.default_slippage_bps);

        if let Some(key) = private_key {
            let sender = TransactionSenderBuilder::new(rpc)
                .chain_id(config.chain.chain_id)
                .config(config.transaction.clone())
                .build(key)
                .await?;
            client = client.with_sender(sender);
        }

        info!(
            chain_id = client.chain_id,
            account = %client.account,
            markets = client.markets.len(),
            can_send = client.sender.is_some(),
            "Lending client ready"
        );
        Ok(client)
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn markets(&self) -> &MarketRegistry {
        &self.markets
    }

    pub fn market(&self, symbol: &str) -> Result<&Token> {
        self.markets
            .get(symbol)
            .ok_or_else(|| Error::UnknownMarket(symbol.to_string()))
    }

    fn sender(&self) -> Result<&TransactionSender> {
        self.sender.as_ref().ok_or(Error::ReadOnly)
    }

    fn slippage(&self, slippage_bps: Option<u32>) -> u32 {
        slippage_bps.unwrap_or(self.default_slippage_bps)
    }

    /// Routed submission for `action`, without sending.
    pub async fn plan(&self, action: &Action, token: &Token) -> Result<Submission> {
        self.router.route(action, token).await
    }

    /// Route and send `action`, waiting for the receipt.
    #[instrument(skip(self, action, token), fields(action = action.name(), market = token.symbol()))]
    pub async fn execute(&self, action: &Action, token: &Token) -> Result<TransactionReceipt> {
        let sender = self.sender()?;
        let submission = self.router.route(action, token).await?;
        Ok(sender.send_submission(&submission, action.value()).await?)
    }

    async fn read<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return> {
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(call.abi_encode());
        let output = self.rpc.call(&request).await?;
        C::abi_decode_returns(&output, true)
            .map_err(|e| Error::Sdk(SdkError::Decode(format!("{}: {e}", C::SIGNATURE))))
    }

    pub async fn deposit(&self, market: &str, amount: D256) -> Result<TransactionReceipt> {
        let token = self.market(market)?;
        let action = Action::Deposit {
            assets: decimal_to_integer(amount, token.decimals())?,
            receiver: self.account,
        };
        self.execute(&action, token).await
    }

    pub async fn redeem(&self, market: &str, shares: D256) -> Result<TransactionReceipt> {
        let token = self.market(market)?;
        let action = Action::Redeem {
            shares: decimal_to_integer(shares, token.decimals())?,
            receiver: self.account,
            owner: self.account,
        };
        self.execute(&action, token).await
    }

    pub async fn borrow(&self, market: &str, amount: D256) -> Result<TransactionReceipt> {
        let token = self.market(market)?;
        let action = Action::Borrow {
            assets: decimal_to_integer(amount, token.decimals())?,
            receiver: self.account,
        };
        self.execute(&action, token).await
    }

    pub async fn repay(&self, market: &str, amount: D256) -> Result<TransactionReceipt> {
        let token = self.market(market)?;
        let action = Action::Repay {
            assets: decimal_to_integer(amount, token.decimals())?,
        };
        self.execute(&action, token).await
    }

    async fn convert_to_shares(&self, token: &Token, assets: U256) -> Result<U256> {
        Ok(self
            .read(token.address(), ICToken::convertToSharesCall { assets })
            .await?
            ._0)
    }

    fn require_borrowable(action: &'static str, token: &Token) -> Result<()> {
        if token.is_borrowable() {
            Ok(())
        } else {
            Err(Error::NotBorrowable {
                action,
                token: token.symbol().to_string(),
            })
        }
    }

    /// Swap `amount` of `input_token` into `market`'s underlying and deposit.
    pub async fn build_zap(
        &self,
        market: &str,
        input_token: Address,
        input_decimals: u8,
        amount: D256,
        slippage_bps: Option<u32>,
    ) -> Result<Action> {
        let token = self.market(market)?;
        let amount_in = decimal_to_integer(amount, input_decimals)?;
        let zapper = self.contracts.zapper.ok_or(Error::MissingContract("zapper"))?;
        let slippage_bps = self.slippage(slippage_bps);

        let request = QuoteRequest::new(input_token, token.underlying(), amount_in, zapper)
            .with_slippage_bps(slippage_bps);
        let quote = self.quotes.quote_with_fallback(self.chain_id, &request).await?;
        debug!(
            provider = %quote.provider,
            expected = %quote.expected_output,
            min = %quote.min_output,
            "Zap quote"
        );

        Ok(Action::Zap {
            zapper,
            swaps: vec![swap_from_quote(&quote, slippage_bps)],
            expected_shares: self.convert_to_shares(token, quote.min_output).await?,
            receiver: self.account,
            deposit_as_wrapped_native: false,
            value: request.native_value(),
        })
    }

    pub async fn zap(
        &self,
        market: &str,
        input_token: Address,
        input_decimals: u8,
        amount: D256,
        slippage_bps: Option<u32>,
    ) -> Result<TransactionReceipt> {
        let action = self
            .build_zap(market, input_token, input_decimals, amount, slippage_bps)
            .await?;
        self.execute(&action, self.market(market)?).await
    }

    /// Borrow from `debt_market`, swap into `collateral_market`'s underlying
    /// and deposit it as collateral.
    pub async fn build_leverage(
        &self,
        collateral_market: &str,
        debt_market: &str,
        borrow_amount: D256,
        slippage_bps: Option<u32>,
    ) -> Result<Action> {
        let collateral = self.market(collateral_market)?;
        let debt = self.market(debt_market)?;
        Self::require_borrowable("leverage", debt)?;
        let borrow_assets = decimal_to_integer(borrow_amount, debt.decimals())?;
        let position_manager = self
            .contracts
            .position_manager
            .ok_or(Error::MissingContract("position manager"))?;
        let slippage_bps = self.slippage(slippage_bps);

        let request = QuoteRequest::new(debt.underlying(), collateral.underlying(), borrow_assets, position_manager)
            .with_slippage_bps(slippage_bps);
        let quote = self.quotes.quote_with_fallback(self.chain_id, &request).await?;

        Ok(Action::Leverage {
            position_manager,
            collateral: collateral.address(),
            borrow_assets,
            swap: swap_from_quote(&quote, slippage_bps),
            expected_shares: self.convert_to_shares(collateral, quote.min_output).await?,
            slippage: basis_points_to_wad(slippage_bps),
        })
    }

    pub async fn leverage(
        &self,
        collateral_market: &str,
        debt_market: &str,
        borrow_amount: D256,
        slippage_bps: Option<u32>,
    ) -> Result<TransactionReceipt> {
        let action = self
            .build_leverage(collateral_market, debt_market, borrow_amount, slippage_bps)
            .await?;
        self.execute(&action, self.market(debt_market)?).await
    }

    /// Withdraw collateral, swap it into the debt asset and repay.
    pub async fn build_deleverage(
        &self,
        collateral_market: &str,
        debt_market: &str,
        collateral_amount: D256,
        repay_amount: D256,
        slippage_bps: Option<u32>,
    ) -> Result<Action> {
        let collateral = self.market(collateral_market)?;
        let debt = self.market(debt_market)?;
        Self::require_borrowable("deleverage", debt)?;
        let collateral_assets = decimal_to_integer(collateral_amount, collateral.decimals())?;
        let repay_assets = decimal_to_integer(repay_amount, debt.decimals())?;
        let position_manager = self
            .contracts
            .position_manager
            .ok_or(Error::MissingContract("position manager"))?;
        let slippage_bps = self.slippage(slippage_bps);

        let request = QuoteRequest::new(
            collateral.underlying(),
            debt.underlying(),
            collateral_assets,
            position_manager,
        )
        .with_slippage_bps(slippage_bps);
        let quote = self.quotes.quote_with_fallback(self.chain_id, &request).await?;

        Ok(Action::Deleverage {
            position_manager,
            collateral: collateral.address(),
            collateral_assets,
            repay_assets,
            swaps: vec![swap_from_quote(&quote, slippage_bps)],
            slippage: basis_points_to_wad(slippage_bps),
        })
    }

    pub async fn deleverage(
        &self,
        collateral_market: &str,
        debt_market: &str,
        collateral_amount: D256,
        repay_amount: D256,
        slippage_bps: Option<u32>,
    ) -> Result<TransactionReceipt> {
        let action = self
            .build_deleverage(collateral_market, debt_market, collateral_amount, repay_amount, slippage_bps)
            .await?;
        self.execute(&action, self.market(debt_market)?).await
    }

    /// Approve `spender` for at least `amount` of `token`. Returns `None` when
    /// the current allowance already covers it.
    pub async fn ensure_allowance(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<Option<TransactionReceipt>> {
        let current = self
            .read(token, IERC20::allowanceCall { owner: self.account, spender })
            .await?
            ._0;
        if current >= amount {
            debug!(%token, %spender, allowance = %current, "Allowance sufficient");
            return Ok(None);
        }

        let approve = Action::Approve { token, spender, amount };
        let submission = MulticallAssembler::single(approve.encode(token));
        let receipt = self.sender()?.send_submission(&submission, U256::ZERO).await?;
        Ok(Some(receipt))
    }

    /// Market token balance of the account, in shares.
    pub async fn balance_of(&self, market: &str) -> Result<D256> {
        let token = self.market(market)?;
        let shares = self
            .read(token.address(), ICToken::balanceOfCall { account: self.account })
            .await?
            ._0;
        Ok(integer_to_decimal(shares, token.decimals())?)
    }

    /// Outstanding debt of the account in a borrowable market.
    pub async fn debt_balance(&self, market: &str) -> Result<D256> {
        let token = self.market(market)?;
        Self::require_borrowable("debt balance", token)?;
        let debt = self
            .read(token.address(), IBorrowableCToken::debtBalanceCall { account: self.account })
            .await?
            ._0;
        Ok(integer_to_decimal(debt, token.decimals())?)
    }
}
