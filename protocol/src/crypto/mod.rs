//! # Cryptographic Primitives
//!
//! Thin wrappers around `sha2`. Transaction identifiers for the time lock
//! and deterministic addresses both come from here.

pub mod hash;

pub use hash::{sha256, sha256_array, sha256_parts, TxHash, DIGEST_LENGTH};
