// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vault Protocol: Core Primitives
//!
//! Shared building blocks for the pooled-capital vault and its governance:
//!
//! - **types**: addresses, amounts, basis points.
//! - **crypto**: SHA-256 digests and the time-lock transaction hash type.
//! - **chain**: a simulated block clock and the per-call context every
//!   component receives instead of reading global state.
//! - **config**: protocol constants and deployment parameters.
//!
//! Nothing here knows about vaults or strategies; that lives in
//! `vault-contracts`.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod types;

pub use chain::{CallContext, Chain};
pub use crypto::TxHash;
pub use types::{Address, Amount, Bps};
