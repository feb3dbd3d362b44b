//! # Vault Contracts
//!
//! Contract logic for a pooled-capital vault whose configuration is governed
//! through a time lock:
//!
//! - **TimeLock**: delayed queue/execute/cancel of privileged calls, with a
//!   grace window and a self-governed admin handoff.
//! - **Vault**: deposits and withdrawals against a receipt token, deposit
//!   limit, pause, per-account block delay, admin and time-lock handoffs.
//! - **FundManager**: strategy registry, debt ratios, allocation queue,
//!   borrow capacity and reconciliation of strategy reports.
//! - **Strategy adapters** and the **receipt token** are external
//!   collaborators, each specified as a trait with one in-memory
//!   implementation.
//!
//! ## Design Principles
//!
//! 1. All monetary arithmetic is checked. Underflow is an error, never a
//!    clamp.
//! 2. Role transfers and queue entries are explicit state machines.
//! 3. A failed call leaves no trace: checks come first, and multi-step
//!    allocator operations restore their ledger on error.
//! 4. Components never read the clock; every call receives a
//!    [`vault_protocol::CallContext`].

pub mod access;
pub mod deployment;
pub mod error;
pub mod events;
pub mod fund_manager;
pub mod math;
pub mod receipt;
pub mod reserve;
pub mod strategy;
pub mod timelock;
pub mod vault;

pub use deployment::{Deployment, DeploymentError, QueuedCall, Roles, Target};
pub use error::{CallFailure, ErrorKind};
pub use events::{Event, ReportEvent};
pub use fund_manager::{FundManager, FundManagerCall, FundManagerError, Recovery, ReportRequest};
pub use strategy::{HoldStrategy, StrategyAdapter, StrategyReport, YieldPool};
pub use timelock::{Governable, TimeLock, TimeLockCall, TimeLockError, TxState};
pub use vault::{Vault, VaultCall, VaultConfig, VaultError};
