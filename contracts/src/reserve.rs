//! # Idle Reserve
//!
//! The vault's uninvested balance of the underlying asset. The vault owns it;
//! the allocator borrows it mutably when funding strategies or returning
//! repayments, so every movement of idle capital goes through
//! [`Reserve::credit`] and [`Reserve::debit`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vault_protocol::Amount;

use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur when moving idle funds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReserveError {
    /// Attempted to debit more than is idle.
    #[error("insufficient reserve: available {available}, requested {requested}")]
    Insufficient {
        /// Current idle balance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// Credit would overflow the balance.
    #[error("reserve overflow: current {current}, credit {credit}")]
    Overflow {
        /// Balance before the failed credit.
        current: Amount,
        /// Amount that caused the overflow.
        credit: Amount,
    },
}

impl ReserveError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReserveError::Insufficient { .. } => ErrorKind::State,
            ReserveError::Overflow { .. } => ErrorKind::Arithmetic,
        }
    }
}

// ---------------------------------------------------------------------------
// Reserve
// ---------------------------------------------------------------------------

/// Idle balance held by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reserve {
    balance: Amount,
}

impl Reserve {
    /// An empty reserve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current idle balance.
    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Adds `amount` to the reserve.
    pub fn credit(&mut self, amount: Amount) -> Result<(), ReserveError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(ReserveError::Overflow {
                current: self.balance,
                credit: amount,
            })?;
        Ok(())
    }

    /// Removes `amount` from the reserve.
    pub fn debit(&mut self, amount: Amount) -> Result<(), ReserveError> {
        if amount > self.balance {
            return Err(ReserveError::Insufficient {
                available: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }
}
