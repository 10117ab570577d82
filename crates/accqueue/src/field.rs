//! Field elements and their text encodings
//!
//! Leaves, zero values and roots are all elements of the BN254 scalar field,
//! the domain of the circom-compatible Poseidon permutation.

use std::{fmt, str::FromStr};

use ark_ff::{BigInteger, MontFp, PrimeField};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{AccumulatorError, Result};

/// BN254 scalar field element
pub type Field = ark_bn254::Fr;

/// Big-endian byte encoding of a field element
pub type FieldBytes = [u8; 32];

/// `keccak256("Maci") mod p`, the null leaf used by quinary state trees.
pub const NOTHING_UP_MY_SLEEVE: Field =
    MontFp!("8370432830353022751713833565135785980866757267633941821328460903436894336785");

/// Encode a field element as 32 big-endian bytes
pub fn to_be_bytes(value: &Field) -> FieldBytes {
    let mut out = [0u8; 32];
    out.copy_from_slice(&value.into_bigint().to_bytes_be());
    out
}

/// Format a field element as a decimal integer
pub fn format_field_decimal(value: &Field) -> String {
    value.into_bigint().to_string()
}

/// Format a field element as `0x`-prefixed big-endian hex
pub fn format_field_hex(value: &Field) -> String {
    format!("0x{}", hex::encode(to_be_bytes(value)))
}

/// Parse a field element from decimal or `0x` hex text.
///
/// Values must be canonical, i.e. strictly below the field modulus.
pub fn parse_field(text: &str) -> Result<Field> {
    let trimmed = text.trim();
    if let Some(digits) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return parse_hex(digits).ok_or_else(|| AccumulatorError::Parse(text.to_string()));
    }
    parse_decimal(trimmed).ok_or_else(|| AccumulatorError::Parse(text.to_string()))
}

fn parse_hex(digits: &str) -> Option<Field> {
    if digits.is_empty() || digits.len() > 64 {
        return None;
    }
    let padded = format!("{digits:0>64}");
    let bytes = hex::decode(padded).ok()?;
    let value = Field::from_be_bytes_mod_order(&bytes);
    (to_be_bytes(&value)[..] == bytes[..]).then_some(value)
}

fn parse_decimal(digits: &str) -> Option<Field> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = Field::from_str(digits).ok()?;
    // from_str reduces modulo p; only accept text that round-trips
    let canonical = digits.trim_start_matches('0');
    let rendered = format_field_decimal(&value);
    let matches = if canonical.is_empty() { rendered == "0" } else { rendered == canonical };
    matches.then_some(value)
}

/// Serde adapter that writes a field element as a decimal string, matching
/// how contract tooling stringifies uint256 values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DecimalField(pub Field);

impl fmt::Debug for DecimalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_field_decimal(&self.0))
    }
}

impl From<Field> for DecimalField {
    fn from(value: Field) -> Self {
        Self(value)
    }
}

impl From<DecimalField> for Field {
    fn from(value: DecimalField) -> Self {
        value.0
    }
}

impl Serialize for DecimalField {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_field_decimal(&self.0))
    }
}

impl<'de> Deserialize<'de> for DecimalField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_field(&text).map(Self).map_err(de::Error::custom)
    }
}
