//! # Hashing Utilities
//!
//! SHA-256 is the only digest in the vault protocol. It identifies queued
//! governance transactions and seeds deterministic addresses.
//!
//! ## Canonical encoding
//!
//! [`sha256_parts`] hashes a sequence of byte strings, each prefixed with its
//! length as a big-endian `u64`. Without the prefix, `("ab", "c")` and
//! `("a", "bc")` would collide, which for a transaction identifier means two
//! different payloads sharing one approval.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Output length of SHA-256 in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use vault_protocol::crypto::sha256;
///
/// let hash = sha256(b"vault");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Vec<u8> {
    sha256_array(data).to_vec()
}

/// Compute the SHA-256 hash and return a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; DIGEST_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; DIGEST_LENGTH];
    output.copy_from_slice(&result);
    output
}

/// Hash a sequence of length-prefixed parts.
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; DIGEST_LENGTH] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; DIGEST_LENGTH];
    output.copy_from_slice(&result);
    output
}

/// Identifier of a queued time-lock transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash([u8; DIGEST_LENGTH]);

impl TxHash {
    /// Wraps a raw digest.
    pub const fn new(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// `0x`-prefixed hex encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses `0x`-prefixed or bare hex.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; DIGEST_LENGTH];
        hex::decode_to_slice(trimmed, &mut out)?;
        Ok(Self(out))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

impl FromStr for TxHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
