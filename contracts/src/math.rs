//! Checked fixed-point helpers. Every ratio and share computation in the
//! crate goes through here, so a silent truncation or wrap has exactly one
//! place to hide.

use thiserror::Error;
use vault_protocol::config::MAX_BPS;
use vault_protocol::{Amount, Bps};

use crate::error::ErrorKind;

/// Arithmetic failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    /// Result does not fit in the target type.
    #[error("arithmetic overflow")]
    Overflow,

    /// Subtraction below zero.
    #[error("arithmetic underflow: {minuend} - {subtrahend}")]
    Underflow {
        /// Left-hand side.
        minuend: Amount,
        /// Right-hand side.
        subtrahend: Amount,
    },

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

impl MathError {
    /// All math errors are [`ErrorKind::Arithmetic`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Arithmetic
    }
}

/// `a + b`, failing on overflow.
pub fn add(a: Amount, b: Amount) -> Result<Amount, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// `a - b`, failing on underflow.
pub fn sub(a: Amount, b: Amount) -> Result<Amount, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow {
        minuend: a,
        subtrahend: b,
    })
}

/// `a × b / d`, rounded down.
pub fn mul_div(a: Amount, b: Amount, d: Amount) -> Result<Amount, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(product / d)
}

/// `a × b / d`, rounded up.
pub fn mul_div_ceil(a: Amount, b: Amount, d: Amount) -> Result<Amount, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(product.div_ceil(d))
}

/// `amount × bps / MAX_BPS`.
pub fn bps_of(amount: Amount, bps: Bps) -> Result<Amount, MathError> {
    mul_div(amount, Amount::from(bps), Amount::from(MAX_BPS))
}
