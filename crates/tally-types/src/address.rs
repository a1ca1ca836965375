//! 32-byte account identifiers.
//!
//! Holders, contracts, custody accounts and assets all share one address
//! space. The all-zero address is the null address and is rejected wherever
//! a real holder, recipient or receiver is required.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error returned when parsing an [`Address`] from a hex string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// The string was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded bytes were not 32 bytes long.
    #[error("invalid address length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte account or asset identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The null address.
    pub const ZERO: Address = Address([0u8; 32]);

    /// The largest address, as an upper range bound.
    pub const MAX: Address = Address([0xffu8; 32]);

    /// Derive a deterministic address from a human-readable label.
    ///
    /// Used by scenarios and tests to name holders and assets; the label is
    /// hashed with BLAKE3 so distinct labels never collide in practice.
    pub fn derive(label: &str) -> Self {
        Address(*blake3::hash(label.as_bytes()).as_bytes())
    }

    /// Whether this is the null address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First four bytes only.
        write!(f, "0x{}..", hex::encode(&self.0[..4]))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength(bytes.len()))?;
        Ok(Address(array))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
