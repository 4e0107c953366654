//! Market definitions.

use std::collections::HashMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::token::{AdapterKind, Token, TokenInfo};

/// One `[[markets]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Market token symbol (e.g. "cWETH")
    pub symbol: String,
    /// Market token contract
    pub address: Address,
    /// Underlying asset contract
    pub underlying: Address,
    /// Market token decimals
    pub decimals: u8,
    /// Price adapter pair, in the order the market reports them
    pub adapters: [AdapterKind; 2],
    /// Feed id on the signer network (defaults to `symbol`)
    #[serde(default)]
    pub asset_symbol: Option<String>,
    #[serde(default)]
    pub borrowable: bool,
}

impl MarketConfig {
    pub fn to_token(&self) -> Token {
        let mut info = TokenInfo::new(
            self.address,
            self.underlying,
            self.symbol.clone(),
            self.decimals,
            self.adapters,
        );
        if let Some(asset_symbol) = &self.asset_symbol {
            info = info.with_asset_symbol(asset_symbol.clone());
        }
        if self.borrowable {
            Token::Borrowable(info)
        } else {
            Token::Simple(info)
        }
    }
}

/// Markets by symbol (case-insensitive) and by address.
#[derive(Debug, Clone, Default)]
pub struct MarketRegistry {
    markets: Vec<Token>,
    by_symbol: HashMap<String, usize>,
    by_address: HashMap<Address, usize>,
}

impl MarketRegistry {
    pub fn from_configs(configs: &[MarketConfig]) -> Result<Self, String> {
        let mut registry = Self::default();
        for config in configs {
            registry.insert(config.to_token())?;
        }
        Ok(registry)
    }

    /// Rejects duplicate symbols and addresses.
    pub fn insert(&mut self, token: Token) -> Result<(), String> {
        let key = token.symbol().to_lowercase();
        if self.by_symbol.contains_key(&key) {
            return Err(format!("duplicate market symbol {}", token.symbol()));
        }
        if self.by_address.contains_key(&token.address()) {
            return Err(format!("duplicate market address {}", token.address()));
        }
        let index = self.markets.len();
        self.by_symbol.insert(key, index);
        self.by_address.insert(token.address(), index);
        self.markets.push(token);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&Token> {
        self.by_symbol
            .get(&symbol.to_lowercase())
            .map(|&i| &self.markets[i])
    }

    pub fn by_address(&self, address: Address) -> Option<&Token> {
        self.by_address.get(&address).map(|&i| &self.markets[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.markets.iter()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Whether any market needs signed price payloads.
    pub fn uses_push_oracle(&self) -> bool {
        self.markets.iter().any(Token::requires_price_update)
    }
}
