//! Owner address normalization.
//!
//! Wallet addresses arrive either as 20-byte Ethereum addresses or as 32-byte
//! native addresses. Everything keyed by owner (accounts, sessions, terms) uses
//! the lowercase form, and everything sent in the `O2-Owner-Id` header uses the
//! 32-byte (b256) form.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte length of an Ethereum-style address.
pub const ETH_ADDRESS_LEN: usize = 20;
/// Byte length of a native (b256) address.
pub const B256_LEN: usize = 32;

/// Signing scheme family an owner address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// 20-byte address, signs with an adapted foreign scheme.
    Ethereum,
    /// 32-byte native address.
    Fuel,
}

/// Normalized (trimmed, lowercase, `0x`-prefixed) owner wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerAddress(String);

impl OwnerAddress {
    /// Parse and normalize an owner address.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidAddress` for empty input, non-hex input, or a
    /// byte length other than 20 or 32.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        let body = normalized
            .strip_prefix("0x")
            .ok_or_else(|| CoreError::InvalidAddress(format!("missing 0x prefix: {raw:?}")))?;

        let bytes = hex::decode(body)
            .map_err(|e| CoreError::InvalidAddress(format!("{raw:?}: {e}")))?;

        match bytes.len() {
            ETH_ADDRESS_LEN | B256_LEN => Ok(Self(normalized)),
            n => Err(CoreError::InvalidAddress(format!(
                "{raw:?}: expected 20 or 32 bytes, got {n}"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address family, inferred from byte length.
    pub fn kind(&self) -> AddressKind {
        // 0x + 40 hex chars
        if self.0.len() == 2 + ETH_ADDRESS_LEN * 2 {
            AddressKind::Ethereum
        } else {
            AddressKind::Fuel
        }
    }

    /// Canonical 32-byte form used for the `O2-Owner-Id` header.
    pub fn to_b256(&self) -> String {
        left_pad_b256(&self.0[2..])
    }
}

impl fmt::Display for OwnerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OwnerAddress {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<OwnerAddress> for String {
    fn from(a: OwnerAddress) -> Self {
        a.0
    }
}

/// Left-pad a hex string (without prefix) to 32 bytes.
fn left_pad_b256(hex_body: &str) -> String {
    format!("0x{:0>64}", hex_body)
}

/// Normalize any hex identifier (address, contract id, asset id) to b256.
///
/// # Errors
/// Returns `CoreError::InvalidAddress` if the input is not hex or longer than
/// 32 bytes.
pub fn normalize_b256(raw: &str) -> Result<String> {
    let lower = raw.trim().to_lowercase();
    let body = lower.strip_prefix("0x").unwrap_or(&lower);
    if body.is_empty() || body.len() > B256_LEN * 2 || hex::decode(pad_even(body)).is_err() {
        return Err(CoreError::InvalidAddress(format!("not a b256 value: {raw:?}")));
    }
    Ok(left_pad_b256(body))
}

/// Decode a b256 hex string into raw bytes.
///
/// Unlike [`normalize_b256`] nothing is padded: the value must carry exactly
/// 64 hex digits, with or without the `0x` prefix.
///
/// # Errors
/// Returns `CoreError::InvalidAddress` when the value is not 32 bytes of hex.
pub fn b256_bytes(raw: &str) -> Result<[u8; 32]> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if body.len() != B256_LEN * 2 {
        return Err(CoreError::InvalidAddress(format!("{raw:?}: not 32 bytes")));
    }
    let bytes = hex::decode(body).map_err(|e| CoreError::InvalidAddress(format!("{raw:?}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::InvalidAddress(format!("{raw:?}: not 32 bytes")))
}

fn pad_even(body: &str) -> String {
    if body.len() % 2 == 1 {
        format!("0{body}")
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

    #[test]
    fn test_parse_lowercases() {
        let addr = OwnerAddress::parse(ETH).unwrap();
        assert_eq!(addr.as_str(), ETH.to_lowercase());
        assert_eq!(addr.kind(), AddressKind::Ethereum);
    }

    #[test]
    fn test_eth_owner_id_is_left_padded() {
        let addr = OwnerAddress::parse(ETH).unwrap();
        let b256 = addr.to_b256();
        assert_eq!(b256.len(), 66);
        assert!(b256.starts_with("0x000000000000000000000000abcdef"));
        assert!(b256.ends_with(&ETH.to_lowercase()[2..]));
    }

    #[test]
    fn test_fuel_owner_id_passes_through() {
        let raw = format!("0x{}", "ab".repeat(32));
        let addr = OwnerAddress::parse(&raw).unwrap();
        assert_eq!(addr.kind(), AddressKind::Fuel);
        assert_eq!(addr.to_b256(), raw);
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(OwnerAddress::parse("").is_err());
        assert!(OwnerAddress::parse("abcdef").is_err());
        assert!(OwnerAddress::parse("0x1234").is_err());
        assert!(OwnerAddress::parse("0xzz23456789abcdef0123456789abcdef01234567").is_err());
    }

    #[test]
    fn test_serde_roundtrip_normalizes() {
        let json = format!("\"{ETH}\"");
        let addr: OwnerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(addr.as_str(), ETH.to_lowercase());
    }

    #[test]
    fn test_normalize_b256() {
        assert_eq!(
            normalize_b256("0xABC").unwrap(),
            format!("0x{}abc", "0".repeat(61))
        );
        assert!(normalize_b256(&format!("0x{}", "1".repeat(66))).is_err());
    }

    #[test]
    fn test_b256_bytes_requires_full_width() {
        let full = format!("0x{}01", "0".repeat(62));
        assert_eq!(b256_bytes(&full).unwrap()[31], 1);
        assert_eq!(b256_bytes(&full[2..]).unwrap()[31], 1);
        assert!(b256_bytes("0x01").is_err());
        assert!(b256_bytes("0x12").is_err());
        assert!(b256_bytes(&format!("0x{}", "1".repeat(66))).is_err());
        assert!(b256_bytes(&format!("0x{}", "zz".repeat(32))).is_err());
    }
}
