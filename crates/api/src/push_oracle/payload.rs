//! Binary payload appended to price-update calldata.
//!
//! ```text
//! package: [feed id 32][value 32]*n [timestamp ms 6][value size 4][n 3][signature 65]
//! trailer: [package count 2][unsigned metadata][metadata size 3][marker 9]
//! ```
//!
//! All integers are big-endian. Values carry 8 decimals.

use alloy::primitives::{Bytes, U256};
use fastnum::decimal::RoundingMode;
use fastnum::D256;
use lending_sdk_chain::SdkError;

use super::types::DataPackage;

/// Trailing marker identifying a signed price payload.
pub const PAYLOAD_MARKER: [u8; 9] = [0x00, 0x00, 0x02, 0xed, 0x57, 0x01, 0x1e, 0x00, 0x00];

pub const VALUE_DECIMALS: i32 = 8;
const DATA_FEED_ID_BYTES: usize = 32;
const DATA_POINT_VALUE_BYTES: usize = 32;
const SIGNATURE_BYTES: usize = 65;
const TIMESTAMP_BYTES: usize = 6;
const VALUE_SIZE_BYTES: usize = 4;
const POINTS_COUNT_BYTES: usize = 3;
const PACKAGES_COUNT_BYTES: usize = 2;
const METADATA_SIZE_BYTES: usize = 3;
/// Keeps the scaled value well inside 256 bits.
const MAX_VALUE: f64 = 1e60;

fn push_be(out: &mut Vec<u8>, value: u64, len: usize) -> Result<(), SdkError> {
    if len < 8 && value >> (len * 8) != 0 {
        return Err(SdkError::Decode(format!("{value} does not fit in {len} bytes")));
    }
    out.extend_from_slice(&value.to_be_bytes()[8 - len..]);
    Ok(())
}

/// Feed id as left-aligned ASCII, zero padded to 32 bytes.
pub fn encode_feed_id(feed_id: &str) -> Result<[u8; DATA_FEED_ID_BYTES], SdkError> {
    let raw = feed_id.as_bytes();
    if raw.is_empty() || raw.len() > DATA_FEED_ID_BYTES {
        return Err(SdkError::Decode(format!("invalid data feed id {feed_id:?}")));
    }
    let mut out = [0u8; DATA_FEED_ID_BYTES];
    out[..raw.len()].copy_from_slice(raw);
    Ok(out)
}

/// Decimal price scaled to 8 decimals (half-up), as a 32-byte word.
///
/// The gateway value is re-read through its shortest decimal form so the
/// scaling is exact decimal arithmetic rather than a float multiply.
pub fn encode_value(value: f64) -> Result<[u8; DATA_POINT_VALUE_BYTES], SdkError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SdkError::Decode(format!("invalid data point value {value}")));
    }
    if value >= MAX_VALUE {
        return Err(SdkError::Decode(format!("data point value {value} too large")));
    }
    let decimal: D256 = value
        .to_string()
        .parse()
        .map_err(|_| SdkError::Decode(format!("invalid data point value {value}")))?;
    let scaled = decimal
        .with_rounding_mode(RoundingMode::HalfUp)
        .rescale(VALUE_DECIMALS as i16);
    let word = U256::from_le_slice(scaled.digits().to_radix_le(256).as_slice());
    Ok(word.to_be_bytes::<DATA_POINT_VALUE_BYTES>())
}

fn decode_signature(signature: &str) -> Result<Vec<u8>, SdkError> {
    let raw = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|e| SdkError::Decode(format!("signature is not hex: {e}")))?;
    if raw.len() != SIGNATURE_BYTES {
        return Err(SdkError::Decode(format!(
            "signature must be {SIGNATURE_BYTES} bytes, got {}",
            raw.len()
        )));
    }
    Ok(raw)
}

/// Serialize one data package.
pub fn encode_package(package: &DataPackage, out: &mut Vec<u8>) -> Result<(), SdkError> {
    if package.data_points.is_empty() {
        return Err(SdkError::Decode("data package has no data points".to_string()));
    }
    let signature = decode_signature(&package.signature)?;

    for point in &package.data_points {
        out.extend_from_slice(&encode_feed_id(&point.data_feed_id)?);
        out.extend_from_slice(&encode_value(point.value)?);
    }
    push_be(out, package.timestamp_milliseconds, TIMESTAMP_BYTES)?;
    push_be(out, DATA_POINT_VALUE_BYTES as u64, VALUE_SIZE_BYTES)?;
    push_be(out, package.data_points.len() as u64, POINTS_COUNT_BYTES)?;
    out.extend_from_slice(&signature);
    Ok(())
}

/// Serialize packages plus trailer into the final payload.
pub fn encode_payload(packages: &[DataPackage], unsigned_metadata: &[u8]) -> Result<Bytes, SdkError> {
    let points: usize = packages.iter().map(|p| p.data_points.len()).sum();
    let mut out = Vec::with_capacity(
        points * (DATA_FEED_ID_BYTES + DATA_POINT_VALUE_BYTES)
            + packages.len() * (TIMESTAMP_BYTES + VALUE_SIZE_BYTES + POINTS_COUNT_BYTES + SIGNATURE_BYTES)
            + PACKAGES_COUNT_BYTES
            + unsigned_metadata.len()
            + METADATA_SIZE_BYTES
            + PAYLOAD_MARKER.len(),
    );

    for package in packages {
        encode_package(package, &mut out)?;
    }
    push_be(&mut out, packages.len() as u64, PACKAGES_COUNT_BYTES)?;
    out.extend_from_slice(unsigned_metadata);
    push_be(&mut out, unsigned_metadata.len() as u64, METADATA_SIZE_BYTES)?;
    out.extend_from_slice(&PAYLOAD_MARKER);

    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::DataPoint;
    use alloy::primitives::Address;

    fn package(signer: u8, timestamp_ms: u64, value: f64) -> DataPackage {
        DataPackage {
            timestamp_milliseconds: timestamp_ms,
            signature: format!("0x{}", hex::encode([signer; 65])),
            signer_address: Address::repeat_byte(signer),
            data_points: vec![DataPoint {
                data_feed_id: "ETH".to_string(),
                value,
            }],
        }
    }

    #[test]
    fn test_feed_id_padding() {
        let id = encode_feed_id("ETH").unwrap();
        assert_eq!(&id[..3], b"ETH");
        assert!(id[3..].iter().all(|b| *b == 0));
        assert!(encode_feed_id("").is_err());
        assert!(encode_feed_id(&"X".repeat(33)).is_err());
    }

    #[test]
    fn test_value_scaling() {
        let word = encode_value(2034.56).unwrap();
        assert_eq!(U256::from_be_bytes(word), U256::from(203_456_000_000u64));

        let word = encode_value(0.123456789).unwrap();
        assert_eq!(U256::from_be_bytes(word), U256::from(12_345_679u64));

        assert!(encode_value(-1.0).is_err());
        assert!(encode_value(f64::NAN).is_err());
        assert!(encode_value(1e61).is_err());
    }

    #[test]
    fn test_value_scaling_is_decimal_exact() {
        // exactly half a unit at the 8th decimal rounds up
        let word = encode_value(0.000000015).unwrap();
        assert_eq!(U256::from_be_bytes(word), U256::from(2u64));

        let word = encode_value(0.1 + 0.2).unwrap();
        assert_eq!(U256::from_be_bytes(word), U256::from(30_000_000u64));

        let word = encode_value(0.0).unwrap();
        assert_eq!(U256::from_be_bytes(word), U256::ZERO);
    }

    #[test]
    fn test_package_layout() {
        let mut out = Vec::new();
        encode_package(&package(0x11, 1_700_000_000_000, 1.0), &mut out).unwrap();

        assert_eq!(out.len(), 32 + 32 + 6 + 4 + 3 + 65);
        assert_eq!(&out[..3], b"ETH");
        assert_eq!(U256::from_be_slice(&out[32..64]), U256::from(100_000_000u64));
        // 1_700_000_000_000 = 0x018b_cfe5_6800
        assert_eq!(&out[64..70], &[0x01, 0x8b, 0xcf, 0xe5, 0x68, 0x00]);
        assert_eq!(&out[70..74], &[0, 0, 0, 32]);
        assert_eq!(&out[74..77], &[0, 0, 1]);
        assert!(out[77..].iter().all(|b| *b == 0x11));
    }

    #[test]
    fn test_payload_trailer() {
        let packages = vec![package(1, 1_000, 1.0), package(2, 1_000, 1.0)];
        let payload = encode_payload(&packages, b"sdk").unwrap();

        let n = payload.len();
        assert_eq!(&payload[n - 9..], &PAYLOAD_MARKER);
        assert_eq!(&payload[n - 12..n - 9], &[0, 0, 3]);
        assert_eq!(&payload[n - 15..n - 12], b"sdk");
        assert_eq!(&payload[n - 17..n - 15], &[0, 2]);
        assert_eq!(n, 2 * 142 + 2 + 3 + 3 + 9);
    }

    #[test]
    fn test_rejects_bad_signature() {
        let mut bad = package(1, 1_000, 1.0);
        bad.signature = "0x1234".to_string();
        assert!(encode_payload(&[bad], &[]).is_err());

        let mut bad = package(1, 1_000, 1.0);
        bad.signature = "zz".repeat(65);
        assert!(encode_payload(&[bad], &[]).is_err());
    }
}
