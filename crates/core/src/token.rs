//! Market token model.
//!
//! A market token is either a plain collateral token or a borrowable one.
//! Routing branches on that capability, so it is a tag on [`Token`] rather
//! than a flag callers have to remember to check.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Price adapter behind a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    /// Continuously updated on-chain feed
    #[serde(rename = "chainlink", alias = "chainlink-pull")]
    ChainlinkPull,
    /// Signed prices written in the same transaction as the action
    PushSigned,
    /// Older push deployment whose prices are kept fresh off-band
    PushSignedLegacy,
    Mock,
}

impl AdapterKind {
    /// Whether actions on this market must carry a price-update call.
    pub const fn requires_bundled_update(self) -> bool {
        matches!(self, Self::PushSigned)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChainlinkPull => "chainlink",
            Self::PushSigned => "push-signed",
            Self::PushSignedLegacy => "push-signed-legacy",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chainlink" | "chainlink-pull" => Ok(Self::ChainlinkPull),
            "push-signed" | "push" => Ok(Self::PushSigned),
            "push-signed-legacy" => Ok(Self::PushSignedLegacy),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown price adapter {other:?}")),
        }
    }
}

/// Immutable description of one market token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    address: Address,
    underlying: Address,
    symbol: String,
    /// Feed id on the signer network
    asset_symbol: String,
    decimals: u8,
    adapters: [AdapterKind; 2],
}

impl TokenInfo {
    /// The price symbol defaults to `symbol`.
    pub fn new(
        address: Address,
        underlying: Address,
        symbol: impl Into<String>,
        decimals: u8,
        adapters: [AdapterKind; 2],
    ) -> Self {
        let symbol = symbol.into();
        Self {
            address,
            underlying,
            asset_symbol: symbol.clone(),
            symbol,
            decimals,
            adapters,
        }
    }

    pub fn with_asset_symbol(mut self, asset_symbol: impl Into<String>) -> Self {
        self.asset_symbol = asset_symbol.into();
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn underlying(&self) -> Address {
        self.underlying
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn asset_symbol(&self) -> &str {
        &self.asset_symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn adapters(&self) -> [AdapterKind; 2] {
        self.adapters
    }
}

/// Market token, tagged by capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Simple(TokenInfo),
    Borrowable(TokenInfo),
}

impl Token {
    pub fn info(&self) -> &TokenInfo {
        match self {
            Self::Simple(info) | Self::Borrowable(info) => info,
        }
    }

    pub fn is_borrowable(&self) -> bool {
        matches!(self, Self::Borrowable(_))
    }

    pub fn address(&self) -> Address {
        self.info().address()
    }

    pub fn underlying(&self) -> Address {
        self.info().underlying()
    }

    pub fn symbol(&self) -> &str {
        self.info().symbol()
    }

    pub fn asset_symbol(&self) -> &str {
        self.info().asset_symbol()
    }

    pub fn decimals(&self) -> u8 {
        self.info().decimals()
    }

    pub fn adapters(&self) -> [AdapterKind; 2] {
        self.info().adapters()
    }

    pub fn requires_price_update(&self) -> bool {
        self.adapters().iter().any(|a| a.requires_bundled_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(adapters: [AdapterKind; 2]) -> TokenInfo {
        TokenInfo::new(Address::repeat_byte(1), Address::repeat_byte(2), "cWETH", 18, adapters)
    }

    #[test]
    fn test_only_push_signed_bundles() {
        assert!(AdapterKind::PushSigned.requires_bundled_update());
        assert!(!AdapterKind::PushSignedLegacy.requires_bundled_update());
        assert!(!AdapterKind::ChainlinkPull.requires_bundled_update());
        assert!(!AdapterKind::Mock.requires_bundled_update());
    }

    #[test]
    fn test_requires_price_update_from_either_slot() {
        use AdapterKind::*;
        assert!(Token::Simple(info([PushSigned, ChainlinkPull])).requires_price_update());
        assert!(Token::Simple(info([ChainlinkPull, PushSigned])).requires_price_update());
        assert!(!Token::Simple(info([ChainlinkPull, Mock])).requires_price_update());
        assert!(!Token::Simple(info([PushSignedLegacy, Mock])).requires_price_update());
    }

    #[test]
    fn test_token_capability() {
        let token = Token::Borrowable(info([AdapterKind::Mock, AdapterKind::Mock]));
        assert!(token.is_borrowable());
        assert_eq!(token.decimals(), 18);
        assert!(!Token::Simple(token.info().clone()).is_borrowable());
    }

    #[test]
    fn test_asset_symbol_override() {
        let info = info([AdapterKind::Mock, AdapterKind::Mock]).with_asset_symbol("ETH");
        assert_eq!(info.symbol(), "cWETH");
        assert_eq!(info.asset_symbol(), "ETH");
    }

    #[test]
    fn test_adapter_parsing() {
        assert_eq!("chainlink".parse::<AdapterKind>().unwrap(), AdapterKind::ChainlinkPull);
        assert_eq!("Push-Signed".parse::<AdapterKind>().unwrap(), AdapterKind::PushSigned);
        assert_eq!("push-signed-legacy".parse::<AdapterKind>().unwrap(), AdapterKind::PushSignedLegacy);
        assert!("pyth".parse::<AdapterKind>().is_err());

        #[derive(Deserialize)]
        struct Wrapper {
            adapters: [AdapterKind; 2],
        }
        let parsed: Wrapper = toml::from_str(r#"adapters = ["push-signed", "chainlink"]"#).unwrap();
        assert_eq!(parsed.adapters, [AdapterKind::PushSigned, AdapterKind::ChainlinkPull]);
    }
}
