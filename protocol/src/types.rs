//! # Core Value Types
//!
//! The handful of types every other module speaks in: account addresses,
//! token amounts and basis-point ratios.
//!
//! Amounts are `u128` so that `amount × amount` style intermediates used by
//! share pricing stay inside a native integer for any realistic 18-decimal
//! supply. All arithmetic on them is checked by the callers; nothing in this
//! workspace relies on wrapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::crypto::sha256_array;

/// Token amount in the smallest unit of the underlying asset.
pub type Amount = u128;

/// Ratio expressed in basis points (1/10 000).
pub type Bps = u32;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Errors produced while parsing an [`Address`] from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The input is not valid hexadecimal.
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    /// The decoded byte string has the wrong length.
    #[error("invalid address length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length actually decoded.
        actual: usize,
    },
}

/// A 20-byte account or component identifier.
///
/// Rendered as `0x`-prefixed lowercase hex, both by `Display` and by serde,
/// so JSON scenario files and logs read the same way.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never a valid role holder.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Wraps raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives a deterministic address from a human-readable label.
    ///
    /// The first 20 bytes of `SHA-256(label)`. Used for fixtures, scenario
    /// accounts and component addresses in the simulator.
    pub fn from_label(label: &str) -> Self {
        let digest = sha256_array(label.as_bytes());
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    /// Derives the address of a component deployed by `deployer` under `salt`.
    pub fn derive(deployer: &Address, salt: &str) -> Self {
        let mut preimage = Vec::with_capacity(ADDRESS_LENGTH + salt.len());
        preimage.extend_from_slice(&deployer.0);
        preimage.extend_from_slice(salt.as_bytes());
        let digest = sha256_array(&preimage);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns `true` for [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// `0x`-prefixed hex encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses `0x`-prefixed or bare hex.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
