//! Lending SDK core.
//!
//! This crate provides the user-facing SDK:
//! - Market tokens and their price-adapter pairs
//! - Decimal/integer fixed-point conversion
//! - Market actions and their call encoding
//! - Price-freshness routing that bundles signed price updates
//! - Configuration loading
//! - The [`LendingClient`] facade

mod action;
mod client;
pub mod config;
mod error;
pub mod fixed_point;
mod router;
mod token;

pub use action::{swap_from_quote, Action};
pub use client::LendingClient;
pub use config::{MarketConfig, MarketRegistry, SdkConfig};
pub use error::{Error, Result};
pub use fixed_point::ConversionError;
pub use router::PriceFreshnessRouter;
pub use token::{AdapterKind, Token, TokenInfo};

pub use fastnum::D256;
