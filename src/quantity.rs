// src/quantity.rs
//! Encoding rules for the numeric and hex fields of the bundler contract.
//!
//! The contract is not uniform: gas and fee values returned by
//! `eth_estimateUserOperationGas` and the gas-fee oracle are decimal strings,
//! while chain id and block number are `0x` hex quantities. Addresses and
//! hashes are fixed-length `0x` hex in either letter case.

use std::fmt;
use std::str::FromStr;

use ethers::types::{Address, H256, U256};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const ADDRESS_LEN: usize = 20;
const HASH_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("missing 0x prefix: {0}")]
    MissingPrefix(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid decimal quantity: {0}")]
    InvalidDecimal(String),
}

fn strip_prefix(value: &str) -> Result<&str, QuantityError> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| QuantityError::MissingPrefix(value.to_string()))
}

fn parse_fixed<const N: usize>(value: &str) -> Result<[u8; N], QuantityError> {
    let digits = strip_prefix(value)?;
    if digits.len() != N * 2 {
        return Err(QuantityError::InvalidLength {
            expected: N,
            actual: digits.len() / 2,
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|e| QuantityError::InvalidHex(e.to_string()))?;
    Ok(out)
}

/// Parses a `0x`-prefixed, 20-byte address.
pub fn parse_address(value: &str) -> Result<Address, QuantityError> {
    parse_fixed::<ADDRESS_LEN>(value).map(Address::from)
}

/// Parses a `0x`-prefixed, 32-byte hash.
pub fn parse_hash(value: &str) -> Result<H256, QuantityError> {
    parse_fixed::<HASH_LEN>(value).map(H256::from)
}

/// Parses a base-16 quantity such as `chainId` or `blockNumber`.
pub fn parse_hex_quantity(value: &str) -> Result<U256, QuantityError> {
    let digits = strip_prefix(value)?;
    if digits.is_empty() {
        return Err(QuantityError::InvalidHex(value.to_string()));
    }
    U256::from_str_radix(digits, 16).map_err(|_| QuantityError::InvalidHex(value.to_string()))
}

/// Parses a base-10 quantity. Hex input is rejected rather than reinterpreted.
pub fn parse_decimal_quantity(value: &str) -> Result<U256, QuantityError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QuantityError::InvalidDecimal(value.to_string()));
    }
    U256::from_dec_str(value).map_err(|_| QuantityError::InvalidDecimal(value.to_string()))
}

/// A gas or fee quantity carried on the wire as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecimalQuantity(pub U256);

impl DecimalQuantity {
    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<U256> for DecimalQuantity {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for DecimalQuantity {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<DecimalQuantity> for U256 {
    fn from(value: DecimalQuantity) -> Self {
        value.0
    }
}

impl fmt::Display for DecimalQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DecimalQuantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal_quantity(s).map(Self)
    }
}

impl Serialize for DecimalQuantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for DecimalQuantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}

/// Address fields read through [`parse_address`], so unprefixed or
/// wrong-length values are rejected on the receive path as well.
pub(crate) mod strict_address {
    use ethers::types::Address;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let value = String::deserialize(deserializer)?;
        super::parse_address(&value).map_err(de::Error::custom)
    }
}

/// Optional hash fields read through [`parse_hash`]. `null` and absence are `None`.
pub(crate) mod optional_hash {
    use ethers::types::H256;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<H256>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|value| super::parse_hash(&value).map_err(de::Error::custom))
            .transpose()
    }
}

/// A string where `null` means empty.
pub(crate) mod nullable_string {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
    }
}

/// The receipt `success` flag travels as the string `"true"` or `"false"`.
/// Some bundlers send a JSON bool instead; both are accepted.
pub(crate) mod success_flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Flag::deserialize(deserializer)? {
            Flag::Bool(value) => Ok(value),
            Flag::Text(text) => match text.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(de::Error::custom(format!("invalid success flag: {other}"))),
            },
        }
    }
}

/// A paymaster field where absence, `""` and `"0x"` all mean "no paymaster".
pub(crate) mod optional_paymaster {
    use ethers::types::Address;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Address>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(address) => serializer.serialize_str(&format!("{address:?}")),
            None => serializer.serialize_str("0x"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Address>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(value) if value.is_empty() || value == "0x" => Ok(None),
            Some(value) => super::parse_address(&value)
                .map(Some)
                .map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_quantities_parse_base_ten() {
        let q: DecimalQuantity = serde_json::from_str("\"1500000000\"").unwrap();
        assert_eq!(q.as_u256(), U256::from(1_500_000_000u64));
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"1500000000\"");
    }

    #[test]
    fn decimal_quantities_reject_hex() {
        assert!(serde_json::from_str::<DecimalQuantity>("\"0x10\"").is_err());
        assert!(serde_json::from_str::<DecimalQuantity>("\"\"").is_err());
        assert!(serde_json::from_str::<DecimalQuantity>("\"-1\"").is_err());
    }

    #[test]
    fn hex_quantities_parse_base_sixteen() {
        assert_eq!(parse_hex_quantity("0x7a69").unwrap(), U256::from(31337));
        assert_eq!(parse_hex_quantity("0x10").unwrap(), U256::from(16));
        assert!(matches!(
            parse_hex_quantity("10"),
            Err(QuantityError::MissingPrefix(_))
        ));
        assert!(parse_hex_quantity("0x").is_err());
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn addresses_must_be_twenty_bytes_of_hex() {
        let address = parse_address("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789").unwrap();
        assert_eq!(
            format!("{address:?}"),
            "0x5ff137d4b0fdcd49dca30c7cf57e578a026d2789"
        );
        assert_eq!(
            parse_address("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d27"),
            Err(QuantityError::InvalidLength {
                expected: 20,
                actual: 19
            })
        );
        assert!(matches!(
            parse_address("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d27zz"),
            Err(QuantityError::InvalidHex(_))
        ));
        assert!(parse_address("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789").is_err());
    }

    #[test]
    fn hashes_must_be_thirty_two_bytes_of_hex() {
        let zero = format!("0x{}", "0".repeat(64));
        assert_eq!(parse_hash(&zero).unwrap(), H256::zero());
        assert!(parse_hash("0x1234").is_err());
        assert!(matches!(
            parse_hash(&"11".repeat(32)),
            Err(QuantityError::MissingPrefix(_))
        ));
    }

    #[derive(Debug, serde::Deserialize)]
    struct Strict {
        #[serde(deserialize_with = "strict_address::deserialize")]
        address: Address,
        #[serde(default, deserialize_with = "optional_hash::deserialize")]
        hash: Option<H256>,
        #[serde(default, deserialize_with = "nullable_string::deserialize")]
        reason: String,
    }

    #[test]
    fn strict_fields_reject_unprefixed_values() {
        let parsed: Strict = serde_json::from_value(serde_json::json!({
            "address": "0x9c5754De1443984659E1b3a8d1931D83475ba29C",
            "hash": null,
            "reason": null,
        }))
        .unwrap();
        assert!(parsed.hash.is_none());
        assert!(parsed.reason.is_empty());
        assert_eq!(
            format!("{:?}", parsed.address),
            "0x9c5754de1443984659e1b3a8d1931d83475ba29c"
        );

        assert!(serde_json::from_value::<Strict>(serde_json::json!({
            "address": "9c5754De1443984659E1b3a8d1931D83475ba29C",
        }))
        .is_err());
        assert!(serde_json::from_value::<Strict>(serde_json::json!({
            "address": "0x9c5754De1443984659E1b3a8d1931D83475ba29C",
            "hash": "11".repeat(32),
        }))
        .is_err());
    }
}
