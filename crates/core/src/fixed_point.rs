//! Conversion between human decimal amounts and integer on-chain units.
//!
//! Decimal amounts are `fastnum::D256`; integer amounts are `U256` at a token's
//! `decimals` scale. Every conversion toward the chain floors, so a caller can
//! never move more value than the decimal they specified. Basis points round
//! to nearest.

use alloy::primitives::U256;
use fastnum::bint::UInt;
use fastnum::decimal::{Context, RoundingMode, Sign};
use fastnum::{dec256, D256};
use thiserror::Error;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// USD values on chain carry 18 decimals.
pub const USD_DECIMALS: u8 = 18;

/// Largest supported token scale.
pub const MAX_DECIMALS: u8 = 36;

/// Invalid input to a fixed-point conversion. Raised before any network access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("not a numeric amount: {0:?}")]
    NotNumeric(String),

    #[error("amount must not be negative: {0}")]
    Negative(String),

    #[error("price must be greater than zero")]
    ZeroPrice,

    #[error("decimals {0} out of range (max {MAX_DECIMALS})")]
    DecimalsOutOfRange(u8),

    #[error("basis points {0} out of range (max 10000)")]
    BasisPointsOutOfRange(u32),

    #[error("amount {0} does not fit in 256 bits")]
    Overflow(String),
}

fn check_decimals(decimals: u8) -> Result<(), ConversionError> {
    if decimals > MAX_DECIMALS {
        return Err(ConversionError::DecimalsOutOfRange(decimals));
    }
    Ok(())
}

fn check_non_negative(value: &D256) -> Result<(), ConversionError> {
    if !value.is_finite() {
        return Err(ConversionError::NotNumeric(value.to_string()));
    }
    if value.is_negative() && !value.is_zero() {
        return Err(ConversionError::Negative(value.to_string()));
    }
    Ok(())
}

/// Coefficient of an already rescaled, non-negative decimal.
fn coefficient(value: &D256) -> U256 {
    U256::from_le_slice(value.digits().to_radix_le(256).as_slice())
}

/// Parse a human-entered amount. Rejects non-numeric and negative input.
pub fn parse_amount(raw: &str) -> Result<D256, ConversionError> {
    let value = raw
        .trim()
        .parse::<D256>()
        .map_err(|_| ConversionError::NotNumeric(raw.to_string()))?;
    check_non_negative(&value)?;
    Ok(value)
}

/// `value / 10^decimals`. Exact for every `U256`.
pub fn integer_to_decimal(value: U256, decimals: u8) -> Result<D256, ConversionError> {
    check_decimals(decimals)?;
    let digits = UInt::<4>::from_le_slice(value.as_le_slice())
        .ok_or_else(|| ConversionError::Overflow(value.to_string()))?;
    Ok(D256::from_parts(
        digits,
        -(decimals as i32),
        Sign::Plus,
        Context::default().with_rounding_mode(RoundingMode::Floor),
    ))
}

/// `floor(value * 10^decimals)`.
pub fn decimal_to_integer(value: D256, decimals: u8) -> Result<U256, ConversionError> {
    check_decimals(decimals)?;
    check_non_negative(&value)?;
    if value > integer_to_decimal(U256::MAX, decimals)? {
        return Err(ConversionError::Overflow(value.to_string()));
    }
    let scaled = value
        .with_rounding_mode(RoundingMode::Floor)
        .rescale(decimals as i16);
    Ok(coefficient(&scaled))
}

/// Token amount a USD budget buys at `price`, floored to `decimals` places.
pub fn usd_to_decimal_tokens(
    usd_value: D256,
    price: D256,
    decimals: u8,
) -> Result<D256, ConversionError> {
    check_decimals(decimals)?;
    check_non_negative(&usd_value)?;
    check_non_negative(&price)?;
    if price.is_zero() {
        return Err(ConversionError::ZeroPrice);
    }
    Ok((usd_value / price)
        .with_rounding_mode(RoundingMode::Floor)
        .rescale(decimals as i16))
}

/// Fraction to basis points, rounded to nearest (`0.005` -> `50`).
pub fn percentage_to_basis_points(value: D256) -> Result<u32, ConversionError> {
    check_non_negative(&value)?;
    let bps = (value * dec256!(10000))
        .with_rounding_mode(RoundingMode::HalfUp)
        .rescale(0);
    if bps > dec256!(4294967295) {
        return Err(ConversionError::Overflow(bps.to_string()));
    }
    u32::try_from(coefficient(&bps)).map_err(|_| ConversionError::Overflow(bps.to_string()))
}

/// `bps * 1e18 / 10000` with integer floor division.
pub fn basis_points_to_wad(bps: u32) -> U256 {
    U256::from(bps) * WAD / BPS_DENOMINATOR
}

/// 18-decimal integer to decimal.
pub fn wad_to_decimal(value: U256) -> D256 {
    // USD_DECIMALS is within range and every U256 fits the coefficient
    integer_to_decimal(value, USD_DECIMALS).unwrap_or(D256::ZERO)
}

/// `amount * (10000 - bps) / 10000`, floored.
pub fn apply_slippage_bps(amount: U256, bps: u32) -> Result<U256, ConversionError> {
    if bps > 10_000 {
        return Err(ConversionError::BasisPointsOutOfRange(bps));
    }
    let keep = U256::from(10_000 - bps);
    // divide first when the product would not fit
    Ok(match amount.checked_mul(keep) {
        Some(product) => product / BPS_DENOMINATOR,
        None => amount / BPS_DENOMINATOR * keep,
    })
}
