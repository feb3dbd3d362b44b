//! # Access Control
//!
//! Privileged roles change hands in two phases: the current holder proposes
//! a candidate, and only that candidate can accept. A typo in the proposal
//! therefore never locks the role away, because the wrong address simply
//! never accepts.
//!
//! The state is explicit rather than a pair of nullable fields:
//!
//! ```text
//! Current(a) --propose(b)--> PendingAcceptance { a, b } --accept by b--> Current(b)
//!                               |
//!                               +--propose(c)--> PendingAcceptance { a, c }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vault_protocol::Address;

use crate::error::ErrorKind;

/// Named roles, used in error messages and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Governance authority.
    Admin,
    /// The time lock a component is governed by.
    TimeLock,
    /// Emergency pauser.
    Guardian,
    /// Routine harvest and allocation trigger.
    Keeper,
    /// An active strategy reporting to its allocator.
    Strategy,
    /// The vault an allocator is bound to.
    Vault,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::TimeLock => write!(f, "time lock"),
            Role::Guardian => write!(f, "guardian"),
            Role::Keeper => write!(f, "keeper"),
            Role::Strategy => write!(f, "strategy"),
            Role::Vault => write!(f, "vault"),
        }
    }
}

/// Errors raised by role checks and handoffs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The caller does not hold the required role.
    #[error("unauthorized: {caller} is not {role}")]
    Unauthorized {
        /// Role that was required.
        role: Role,
        /// Address that attempted the call.
        caller: Address,
    },

    /// Proposed candidate already holds the role.
    #[error("next {role} = current ({candidate})")]
    CandidateIsCurrent {
        /// Role being handed off.
        role: Role,
        /// The rejected candidate.
        candidate: Address,
    },

    /// Someone other than the pending candidate tried to accept.
    #[error("{caller} is not the pending {role}")]
    NotPendingCandidate {
        /// Role being handed off.
        role: Role,
        /// Address that attempted to accept.
        caller: Address,
    },

    /// Nothing is pending acceptance.
    #[error("no pending {role} handoff")]
    NoPendingCandidate {
        /// Role being handed off.
        role: Role,
    },
}

impl AccessError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Unauthorized { .. } | AccessError::NotPendingCandidate { .. } => {
                ErrorKind::Authorization
            }
            AccessError::CandidateIsCurrent { .. } => ErrorKind::Parameter,
            AccessError::NoPendingCandidate { .. } => ErrorKind::State,
        }
    }
}

/// Handoff state of a single role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoffState {
    /// Settled.
    Current(Address),
    /// `current` still holds the role until `candidate` accepts.
    PendingAcceptance {
        /// Present holder.
        current: Address,
        /// Proposed successor.
        candidate: Address,
    },
}

/// A role with a two-phase transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminHandoff {
    role: Role,
    state: HandoffState,
}

impl AdminHandoff {
    /// A settled role held by `holder`.
    pub fn new(role: Role, holder: Address) -> Self {
        Self {
            role,
            state: HandoffState::Current(holder),
        }
    }

    /// The role this handoff governs.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current holder. Unchanged while a handoff is pending.
    pub fn current(&self) -> Address {
        match self.state {
            HandoffState::Current(holder) => holder,
            HandoffState::PendingAcceptance { current, .. } => current,
        }
    }

    /// Proposed successor, if any.
    pub fn pending(&self) -> Option<Address> {
        match self.state {
            HandoffState::Current(_) => None,
            HandoffState::PendingAcceptance { candidate, .. } => Some(candidate),
        }
    }

    /// Full state.
    pub fn state(&self) -> HandoffState {
        self.state
    }

    /// `true` if `caller` holds the role.
    pub fn is(&self, caller: &Address) -> bool {
        self.current() == *caller
    }

    /// Fails unless `caller` holds the role.
    pub fn ensure(&self, caller: &Address) -> Result<(), AccessError> {
        if self.is(caller) {
            Ok(())
        } else {
            Err(AccessError::Unauthorized {
                role: self.role,
                caller: *caller,
            })
        }
    }

    /// Proposes `candidate`. Replaces any earlier pending proposal.
    ///
    /// The caller's authority is checked by the owning component; this only
    /// enforces the state transition.
    pub fn propose(&mut self, candidate: Address) -> Result<(), AccessError> {
        let current = self.current();
        if candidate == current {
            return Err(AccessError::CandidateIsCurrent {
                role: self.role,
                candidate,
            });
        }
        self.state = HandoffState::PendingAcceptance { current, candidate };
        Ok(())
    }

    /// Completes the handoff. Only the pending candidate may call this.
    pub fn accept(&mut self, caller: &Address) -> Result<Address, AccessError> {
        match self.state {
            HandoffState::Current(_) => Err(AccessError::NoPendingCandidate { role: self.role }),
            HandoffState::PendingAcceptance { candidate, .. } if candidate == *caller => {
                self.state = HandoffState::Current(candidate);
                Ok(candidate)
            }
            HandoffState::PendingAcceptance { .. } => Err(AccessError::NotPendingCandidate {
                role: self.role,
                caller: *caller,
            }),
        }
    }
}

/// Fails unless `caller` is one of `allowed`.
pub(crate) fn ensure_any(
    role: Role,
    caller: &Address,
    allowed: &[Address],
) -> Result<(), AccessError> {
    if allowed.contains(caller) {
        Ok(())
    } else {
        Err(AccessError::Unauthorized {
            role,
            caller: *caller,
        })
    }
}
