//! # Error Classification
//!
//! Each component has its own error enum. They all classify into the same
//! small set of [`ErrorKind`]s so callers (and tests) can reason about *why*
//! something was rejected without matching every variant.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad category of a rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The caller lacks the required role.
    Authorization,
    /// The operation is invalid for the current state.
    State,
    /// An argument is out of bounds or mis-bound.
    Parameter,
    /// A time-lock entry is not yet executable or already expired.
    Timing,
    /// Checked arithmetic would overflow or underflow.
    Arithmetic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::Parameter => write!(f, "parameter"),
            ErrorKind::Timing => write!(f, "timing"),
            ErrorKind::Arithmetic => write!(f, "arithmetic"),
        }
    }
}

/// Failure of a call dispatched by the time lock into a governed component.
///
/// The nested error is flattened to its kind and message so the time lock
/// does not need to know every component's error type.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error: {reason}")]
pub struct CallFailure {
    /// Category of the nested failure.
    pub kind: ErrorKind,
    /// Rendered nested error.
    pub reason: String,
}

impl CallFailure {
    /// Builds a failure from a kind and any displayable reason.
    pub fn new(kind: ErrorKind, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
        }
    }

    /// The payload could not be decoded into a call the target understands.
    pub fn malformed(err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Parameter, format!("malformed payload: {err}"))
    }

    /// The target does not accept attached value.
    pub fn value_not_accepted(value: u128) -> Self {
        Self::new(ErrorKind::Parameter, format!("value {value} not accepted"))
    }
}
