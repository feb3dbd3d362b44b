//! # Receipt Token
//!
//! Depositors hold a fungible claim on the vault's assets. The token itself is
//! an external collaborator: the vault only needs supply, balances, and
//! minter-gated mint/burn, captured by [`ReceiptToken`].
//!
//! [`ShareToken`] is the in-memory implementation used by deployments and
//! tests. The minter is fixed at construction (the vault), so no other
//! address can inflate or destroy supply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vault_protocol::{Address, Amount};

use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during receipt-token operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    /// The caller is not the token's minter.
    #[error("unauthorized: {caller} is not the minter")]
    NotMinter {
        /// Address that attempted to mint or burn.
        caller: Address,
    },

    /// Burning more than the holder owns.
    #[error("insufficient balance: account has {balance}, tried to burn {amount}")]
    InsufficientBalance {
        /// Holder's balance.
        balance: Amount,
        /// Amount requested.
        amount: Amount,
    },

    /// Minting would overflow total supply.
    #[error("supply overflow: minting {amount} would exceed the maximum")]
    Overflow {
        /// Amount requested.
        amount: Amount,
    },
}

impl ReceiptError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReceiptError::NotMinter { .. } => ErrorKind::Authorization,
            ReceiptError::InsufficientBalance { .. } => ErrorKind::State,
            ReceiptError::Overflow { .. } => ErrorKind::Arithmetic,
        }
    }
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// Capability the vault needs from its claim token.
pub trait ReceiptToken: std::fmt::Debug + Send {
    /// Token address.
    fn address(&self) -> Address;

    /// Address allowed to mint and burn.
    fn minter(&self) -> Address;

    /// Outstanding supply.
    fn total_supply(&self) -> Amount;

    /// Balance of `account`.
    fn balance_of(&self, account: &Address) -> Amount;

    /// Creates `amount` for `to`. Only the minter may call this.
    fn mint(&mut self, minter: &Address, to: &Address, amount: Amount)
        -> Result<(), ReceiptError>;

    /// Destroys `amount` held by `from`. Only the minter may call this.
    fn burn(
        &mut self,
        minter: &Address,
        from: &Address,
        amount: Amount,
    ) -> Result<(), ReceiptError>;
}

// ---------------------------------------------------------------------------
// ShareToken
// ---------------------------------------------------------------------------

/// Minter-gated fungible ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareToken {
    address: Address,
    name: String,
    symbol: String,
    minter: Address,
    total_supply: Amount,
    balances: HashMap<Address, Amount>,
}

impl ShareToken {
    /// Creates an empty token whose supply only `minter` can change.
    pub fn new(address: Address, name: &str, symbol: &str, minter: Address) -> Self {
        Self {
            address,
            name: name.to_string(),
            symbol: symbol.to_string(),
            minter,
            total_supply: 0,
            balances: HashMap::new(),
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ticker.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Number of accounts with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    fn ensure_minter(&self, caller: &Address) -> Result<(), ReceiptError> {
        if *caller != self.minter {
            return Err(ReceiptError::NotMinter { caller: *caller });
        }
        Ok(())
    }
}

impl ReceiptToken for ShareToken {
    fn address(&self) -> Address {
        self.address
    }

    fn minter(&self) -> Address {
        self.minter
    }

    fn total_supply(&self) -> Amount {
        self.total_supply
    }

    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn mint(
        &mut self,
        minter: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), ReceiptError> {
        self.ensure_minter(minter)?;

        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(ReceiptError::Overflow { amount })?;
        // Balance cannot overflow if supply does not.
        let balance = self.balance_of(to) + amount;

        self.total_supply = new_supply;
        self.balances.insert(*to, balance);
        Ok(())
    }

    fn burn(
        &mut self,
        minter: &Address,
        from: &Address,
        amount: Amount,
    ) -> Result<(), ReceiptError> {
        self.ensure_minter(minter)?;

        let balance = self.balance_of(from);
        if balance < amount {
            return Err(ReceiptError::InsufficientBalance { balance, amount });
        }

        let remaining = balance - amount;
        if remaining == 0 {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, remaining);
        }
        self.total_supply -= amount;
        Ok(())
    }
}
