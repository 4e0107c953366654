//! Lending SDK command-line planner
//!
//! Loads the SDK config, builds one market action from the environment and
//! prints the routed submission. With `EXECUTE=1` and a `PRIVATE_KEY` the
//! action is sent and the receipt printed.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lending_sdk_core::config::private_key_from_env;
use lending_sdk_core::fixed_point::{decimal_to_integer, parse_amount};
use lending_sdk_core::{Action, LendingClient, SdkConfig};

/// Environment variable names.
mod env {
    pub const ACTION: &str = "ACTION";
    pub const MARKET: &str = "MARKET";
    pub const AMOUNT: &str = "AMOUNT";
    pub const EXECUTE: &str = "EXECUTE";
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,lending_sdk_core=debug,lending_sdk_chain=debug")
            }),
        )
        .init();

    let config = SdkConfig::from_env()?;
    config.log_config();

    let private_key = private_key_from_env();
    let client = LendingClient::connect(&config, private_key.as_deref()).await?;

    for token in client.markets().iter() {
        info!(
            market = token.symbol(),
            address = %token.address(),
            adapters = ?token.adapters(),
            borrowable = token.is_borrowable(),
            "Market"
        );
    }

    let Ok(action_name) = std::env::var(env::ACTION) else {
        info!("No {} set; nothing to plan", env::ACTION);
        return Ok(());
    };
    let market = std::env::var(env::MARKET).with_context(|| format!("{} is required", env::MARKET))?;
    let amount = std::env::var(env::AMOUNT).with_context(|| format!("{} is required", env::AMOUNT))?;

    let token = client.market(&market)?.clone();
    let units = decimal_to_integer(parse_amount(&amount)?, token.decimals())?;
    let account = client.account();
    let action = match action_name.to_lowercase().as_str() {
        "deposit" => Action::Deposit { assets: units, receiver: account },
        "redeem" => Action::Redeem { shares: units, receiver: account, owner: account },
        "borrow" => Action::Borrow { assets: units, receiver: account },
        "repay" => Action::Repay { assets: units },
        other => bail!("Unsupported action {other}; expected deposit, redeem, borrow or repay"),
    };

    let submission = client.plan(&action, &token).await?;
    println!("action:        {}", action.name());
    println!("market:        {} ({})", token.symbol(), token.address());
    println!("to:            {}", submission.to());
    println!("batched:       {}", submission.is_batched());
    println!("price updates: {}", submission.price_update_count());
    println!("calldata:      0x{}", alloy::hex::encode(submission.calldata()));

    if std::env::var(env::EXECUTE).is_ok_and(|v| v == "1") {
        let receipt = client.execute(&action, &token).await?;
        info!(
            tx = %receipt.transaction_hash,
            block = ?receipt.block_number,
            "Action executed"
        );
    }

    Ok(())
}
