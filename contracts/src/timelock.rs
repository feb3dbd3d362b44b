//! # Time Lock
//!
//! Every privileged configuration change passes through a mandatory delay.
//! The admin queues a call, waits at least [`MIN_DELAY`], and then has a
//! [`GRACE_PERIOD`] window in which to execute it. Anyone watching the event
//! log sees the exact call (target, value, payload) a full delay before it
//! can take effect.
//!
//! ## Lifecycle
//!
//! ```text
//! queue ──► Queued ──execute (eta ≤ now ≤ eta + grace)──► Executed
//!              │
//!              ├──cancel──► Cancelled
//!              └──now > eta + grace──► Expired (logical; still cancellable)
//! ```
//!
//! An entry is identified by the hash of its full tuple
//! `(target, value, payload, eta, nonce)`. Executed and cancelled hashes may
//! be queued again; a hash that is still queued may not.
//!
//! ## Dispatch
//!
//! Governed components implement [`Governable`]. On execution the time lock
//! marks the entry consumed, then dispatches the payload with itself as the
//! caller. If the nested call fails the entry is restored to `Queued` and the
//! whole execution fails, carrying the nested error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use vault_protocol::config::{GRACE_PERIOD, MAX_DELAY, MIN_DELAY};
use vault_protocol::crypto::sha256_parts;
use vault_protocol::{Address, Amount, CallContext, TxHash};

use crate::access::{AccessError, AdminHandoff, Role};
use crate::error::{CallFailure, ErrorKind};
use crate::events::{Event, EventLog, LogOutcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during time-lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeLockError {
    /// Role check or admin handoff failed.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Requested delay is outside `[MIN_DELAY, MAX_DELAY]`.
    #[error("delay {delay}s out of range [{min}s, {max}s]")]
    DelayOutOfRange {
        /// Requested delay.
        delay: u64,
        /// Minimum allowed.
        min: u64,
        /// Maximum allowed.
        max: u64,
    },

    /// `now + delay` does not fit in a timestamp.
    #[error("eta overflow")]
    EtaOverflow,

    /// The same call is already waiting in the queue.
    #[error("transaction {0} already queued")]
    AlreadyQueued(TxHash),

    /// No queued entry for this hash.
    #[error("transaction {tx_hash} is not queued (state: {state:?})")]
    NotQueued {
        /// Hash of the call.
        tx_hash: TxHash,
        /// Recorded state, if the hash was ever seen.
        state: Option<TxState>,
    },

    /// Executed before the eta.
    #[error("transaction not ready: eta {eta}, now {now}")]
    NotReady {
        /// Earliest execution time.
        eta: u64,
        /// Current block timestamp.
        now: u64,
    },

    /// Executed after the grace window.
    #[error("transaction expired: deadline {deadline}, now {now}")]
    Expired {
        /// Last valid execution time.
        deadline: u64,
        /// Current block timestamp.
        now: u64,
    },

    /// The dispatched call failed inside the target.
    #[error("call to {target} reverted: {failure}")]
    CallReverted {
        /// Target component.
        target: Address,
        /// Nested failure.
        failure: CallFailure,
    },
}

impl TimeLockError {
    /// Classifies the error. Reverted calls report the nested kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimeLockError::Access(err) => err.kind(),
            TimeLockError::DelayOutOfRange { .. } => ErrorKind::Parameter,
            TimeLockError::EtaOverflow => ErrorKind::Arithmetic,
            TimeLockError::AlreadyQueued(_) | TimeLockError::NotQueued { .. } => ErrorKind::State,
            TimeLockError::NotReady { .. } | TimeLockError::Expired { .. } => ErrorKind::Timing,
            TimeLockError::CallReverted { failure, .. } => failure.kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A component whose privileged operations can be invoked by a time lock.
pub trait Governable {
    /// Address the component is deployed at. Part of the queued hash.
    fn address(&self) -> Address;

    /// Decodes `payload` and applies it with `ctx.caller` as the caller.
    fn dispatch(
        &mut self,
        ctx: &CallContext,
        value: Amount,
        payload: &[u8],
    ) -> Result<(), CallFailure>;
}

/// Lifecycle state of a queued call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    /// Waiting for execution.
    Queued,
    /// Executed successfully.
    Executed,
    /// Cancelled by the admin.
    Cancelled,
    /// Still queued but past its grace window. Never stored.
    Expired,
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxState::Queued => write!(f, "Queued"),
            TxState::Executed => write!(f, "Executed"),
            TxState::Cancelled => write!(f, "Cancelled"),
            TxState::Expired => write!(f, "Expired"),
        }
    }
}

/// The full tuple a queued call is identified by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTransaction {
    /// Component the call is dispatched to.
    pub target: Address,
    /// Value forwarded with the call.
    pub value: Amount,
    /// Encoded call.
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    /// Earliest execution timestamp.
    pub eta: u64,
    /// Disambiguates otherwise identical calls.
    pub nonce: u64,
}

impl QueuedTransaction {
    /// Builds the tuple.
    pub fn new(target: Address, value: Amount, payload: &[u8], eta: u64, nonce: u64) -> Self {
        Self {
            target,
            value,
            payload: payload.to_vec(),
            eta,
            nonce,
        }
    }

    /// SHA-256 over the length-prefixed, big-endian encoding of every field.
    pub fn hash(&self) -> TxHash {
        TxHash::new(sha256_parts(&[
            self.target.as_bytes(),
            &self.value.to_be_bytes(),
            &self.payload,
            &self.eta.to_be_bytes(),
            &self.nonce.to_be_bytes(),
        ]))
    }

    fn log(&self, tx_hash: TxHash, outcome: LogOutcome) -> Event {
        Event::Log {
            tx_hash,
            target: self.target,
            value: self.value,
            payload: self.payload.clone(),
            eta: self.eta,
            nonce: self.nonce,
            outcome,
        }
    }
}

/// Calls the time lock dispatches to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeLockCall {
    /// Propose a new admin.
    SetNextAdmin {
        /// Proposed admin.
        candidate: Address,
    },
}

impl TimeLockCall {
    /// Encodes the call as a queue payload.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    tx: QueuedTransaction,
    state: TxState,
}

// ---------------------------------------------------------------------------
// TimeLock
// ---------------------------------------------------------------------------

/// Delayed-execution queue for privileged calls.
#[derive(Debug)]
pub struct TimeLock {
    address: Address,
    admin: AdminHandoff,
    entries: HashMap<TxHash, Entry>,
    events: EventLog,
}

impl TimeLock {
    /// Deploys a time lock at `address` administered by `admin`.
    pub fn new(address: Address, admin: Address) -> Self {
        Self {
            address,
            admin: AdminHandoff::new(Role::Admin, admin),
            entries: HashMap::new(),
            events: EventLog::new(),
        }
    }

    /// Deployment address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current admin.
    pub fn admin(&self) -> Address {
        self.admin.current()
    }

    /// Admin candidate awaiting acceptance.
    pub fn next_admin(&self) -> Option<Address> {
        self.admin.pending()
    }

    /// Hash of a call tuple. Pure.
    pub fn tx_hash(
        target: Address,
        value: Amount,
        payload: &[u8],
        eta: u64,
        nonce: u64,
    ) -> TxHash {
        QueuedTransaction::new(target, value, payload, eta, nonce).hash()
    }

    /// `true` if `hash` is waiting for execution (expired entries included).
    pub fn queued(&self, hash: &TxHash) -> bool {
        matches!(
            self.entries.get(hash),
            Some(Entry {
                state: TxState::Queued,
                ..
            })
        )
    }

    /// State of `hash` as of `now`, or `None` if it was never queued.
    pub fn state(&self, hash: &TxHash, now: u64) -> Option<TxState> {
        let entry = self.entries.get(hash)?;
        match entry.state {
            TxState::Queued if now > entry.tx.eta.saturating_add(GRACE_PERIOD) => {
                Some(TxState::Expired)
            }
            state => Some(state),
        }
    }

    /// The tuple recorded for `hash`.
    pub fn transaction(&self, hash: &TxHash) -> Option<&QueuedTransaction> {
        self.entries.get(hash).map(|entry| &entry.tx)
    }

    /// Drains emitted events.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take()
    }

    /// Queues a call for execution no earlier than `now + delay`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeLockError::Access`] if the caller is not the admin,
    /// [`TimeLockError::DelayOutOfRange`] for a delay outside the bounds, and
    /// [`TimeLockError::AlreadyQueued`] if the identical call is pending.
    pub fn queue(
        &mut self,
        ctx: &CallContext,
        target: Address,
        value: Amount,
        payload: &[u8],
        delay: u64,
        nonce: u64,
    ) -> Result<TxHash, TimeLockError> {
        self.admin.ensure(&ctx.caller)?;

        if !(MIN_DELAY..=MAX_DELAY).contains(&delay) {
            return Err(TimeLockError::DelayOutOfRange {
                delay,
                min: MIN_DELAY,
                max: MAX_DELAY,
            });
        }

        let eta = ctx
            .timestamp
            .checked_add(delay)
            .ok_or(TimeLockError::EtaOverflow)?;
        let tx = QueuedTransaction::new(target, value, payload, eta, nonce);
        let tx_hash = tx.hash();

        if self.queued(&tx_hash) {
            return Err(TimeLockError::AlreadyQueued(tx_hash));
        }

        info!(%tx_hash, %target, value, eta, nonce, "transaction queued");
        self.events.emit(tx.log(tx_hash, LogOutcome::Queued));
        self.entries.insert(
            tx_hash,
            Entry {
                tx,
                state: TxState::Queued,
            },
        );
        Ok(tx_hash)
    }

    /// Executes a queued call against `target`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeLockError::NotQueued`] unless the entry is pending,
    /// [`TimeLockError::NotReady`] / [`TimeLockError::Expired`] outside the
    /// execution window, and [`TimeLockError::CallReverted`] if the target
    /// rejects the call. The entry stays queued in every error case.
    pub fn execute(
        &mut self,
        ctx: &CallContext,
        target: &mut dyn Governable,
        value: Amount,
        payload: &[u8],
        eta: u64,
        nonce: u64,
    ) -> Result<TxHash, TimeLockError> {
        let tx = QueuedTransaction::new(target.address(), value, payload, eta, nonce);
        let tx_hash = self.begin_execution(ctx, &tx)?;

        let inner = ctx.with_caller(self.address);
        if let Err(failure) = target.dispatch(&inner, value, payload) {
            return Err(self.revert_execution(tx_hash, tx.target, failure));
        }

        self.finish_execution(tx_hash, &tx);
        Ok(tx_hash)
    }

    /// Executes a queued call whose target is this time lock.
    pub fn execute_self(
        &mut self,
        ctx: &CallContext,
        value: Amount,
        payload: &[u8],
        eta: u64,
        nonce: u64,
    ) -> Result<TxHash, TimeLockError> {
        let tx = QueuedTransaction::new(self.address, value, payload, eta, nonce);
        let tx_hash = self.begin_execution(ctx, &tx)?;

        let inner = ctx.with_caller(self.address);
        if let Err(failure) = self.apply(&inner, value, payload) {
            return Err(self.revert_execution(tx_hash, tx.target, failure));
        }

        self.finish_execution(tx_hash, &tx);
        Ok(tx_hash)
    }

    /// Cancels a queued call. Expired entries can still be cancelled.
    pub fn cancel(
        &mut self,
        ctx: &CallContext,
        target: Address,
        value: Amount,
        payload: &[u8],
        eta: u64,
        nonce: u64,
    ) -> Result<TxHash, TimeLockError> {
        self.admin.ensure(&ctx.caller)?;

        let tx = QueuedTransaction::new(target, value, payload, eta, nonce);
        let tx_hash = tx.hash();
        self.ensure_queued(&tx_hash)?;

        self.set_state(&tx_hash, TxState::Cancelled);
        info!(%tx_hash, %target, "transaction cancelled");
        self.events.emit(tx.log(tx_hash, LogOutcome::Cancelled));
        Ok(tx_hash)
    }

    /// Proposes a new admin. Only the time lock itself may call this, so an
    /// admin change is always a delayed call.
    pub fn set_next_admin(
        &mut self,
        ctx: &CallContext,
        candidate: Address,
    ) -> Result<(), TimeLockError> {
        if ctx.caller != self.address {
            return Err(AccessError::Unauthorized {
                role: Role::TimeLock,
                caller: ctx.caller,
            }
            .into());
        }
        self.admin.propose(candidate)?;
        info!(%candidate, "time lock admin proposed");
        self.events.emit(Event::SetNextAdmin { candidate });
        Ok(())
    }

    /// Completes an admin handoff. Only the proposed candidate may call this.
    pub fn accept_admin(&mut self, ctx: &CallContext) -> Result<(), TimeLockError> {
        let admin = self.admin.accept(&ctx.caller)?;
        info!(%admin, "time lock admin accepted");
        self.events.emit(Event::AcceptAdmin { admin });
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn ensure_queued(&self, tx_hash: &TxHash) -> Result<(), TimeLockError> {
        match self.entries.get(tx_hash) {
            Some(Entry {
                state: TxState::Queued,
                ..
            }) => Ok(()),
            other => Err(TimeLockError::NotQueued {
                tx_hash: *tx_hash,
                state: other.map(|entry| entry.state),
            }),
        }
    }

    fn set_state(&mut self, tx_hash: &TxHash, state: TxState) {
        if let Some(entry) = self.entries.get_mut(tx_hash) {
            entry.state = state;
        }
    }

    /// Validates caller, entry and window, then marks the entry consumed.
    fn begin_execution(
        &mut self,
        ctx: &CallContext,
        tx: &QueuedTransaction,
    ) -> Result<TxHash, TimeLockError> {
        if let Err(err) = self.admin.ensure(&ctx.caller) {
            warn!(caller = %ctx.caller, "unauthorized execute");
            return Err(err.into());
        }

        let tx_hash = tx.hash();
        self.ensure_queued(&tx_hash)?;

        let now = ctx.timestamp;
        if now < tx.eta {
            warn!(%tx_hash, eta = tx.eta, now, "execute before eta");
            return Err(TimeLockError::NotReady { eta: tx.eta, now });
        }
        let deadline = tx.eta.saturating_add(GRACE_PERIOD);
        if now > deadline {
            warn!(%tx_hash, deadline, now, "execute after grace period");
            return Err(TimeLockError::Expired { deadline, now });
        }

        self.set_state(&tx_hash, TxState::Executed);
        Ok(tx_hash)
    }

    fn revert_execution(
        &mut self,
        tx_hash: TxHash,
        target: Address,
        failure: CallFailure,
    ) -> TimeLockError {
        self.set_state(&tx_hash, TxState::Queued);
        warn!(%tx_hash, %target, %failure, "queued call reverted");
        TimeLockError::CallReverted { target, failure }
    }

    fn finish_execution(&mut self, tx_hash: TxHash, tx: &QueuedTransaction) {
        info!(%tx_hash, target = %tx.target, "transaction executed");
        self.events.emit(tx.log(tx_hash, LogOutcome::Executed));
    }

    fn apply(
        &mut self,
        ctx: &CallContext,
        value: Amount,
        payload: &[u8],
    ) -> Result<(), CallFailure> {
        if value != 0 {
            return Err(CallFailure::value_not_accepted(value));
        }
        let call: TimeLockCall = bincode::deserialize(payload).map_err(CallFailure::malformed)?;
        match call {
            TimeLockCall::SetNextAdmin { candidate } => self
                .set_next_admin(ctx, candidate)
                .map_err(|err| CallFailure::new(err.kind(), err)),
        }
    }
}

/// Hex text form for payload bytes in JSON.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_protocol::config::DAY_SECS;
    use vault_protocol::Chain;

    fn setup() -> (TimeLock, Chain, Address) {
        let admin = Address::from_label("admin");
        let lock = TimeLock::new(Address::from_label("time-lock"), admin);
        (lock, Chain::new(1_700_000_000), admin)
    }

    #[derive(Debug, Default)]
    struct Counter {
        calls: u32,
        fail: bool,
    }

    impl Governable for Counter {
        fn address(&self) -> Address {
            Address::from_label("counter")
        }

        fn dispatch(
            &mut self,
            _ctx: &CallContext,
            _value: Amount,
            _payload: &[u8],
        ) -> Result<(), CallFailure> {
            if self.fail {
                return Err(CallFailure::new(ErrorKind::State, "refused"));
            }
            self.calls += 1;
            Ok(())
        }
    }

    #[test]
    fn hash_is_pure_and_field_sensitive() {
        let target = Address::from_label("t");
        let a = TimeLock::tx_hash(target, 1, &[0x12, 0x12], 100, 0);
        assert_eq!(a, TimeLock::tx_hash(target, 1, &[0x12, 0x12], 100, 0));
        assert_ne!(a, TimeLock::tx_hash(target, 1, &[0x12, 0x12], 100, 1));
        assert_ne!(a, TimeLock::tx_hash(target, 2, &[0x12, 0x12], 100, 0));
        assert_ne!(a, TimeLock::tx_hash(target, 1, &[0x12], 100, 0));
    }

    #[test]
    fn delay_bounds_are_enforced() {
        let (mut lock, chain, admin) = setup();
        let target = Address::from_label("t");
        let ctx = chain.ctx(admin);
        assert!(matches!(
            lock.queue(&ctx, target, 0, &[], MIN_DELAY - 1, 0),
            Err(TimeLockError::DelayOutOfRange { .. })
        ));
        assert!(lock.queue(&ctx, target, 0, &[], MAX_DELAY + 1, 0).is_err());
        assert!(lock.queue(&ctx, target, 0, &[], MIN_DELAY, 0).is_ok());
        assert!(lock.queue(&ctx, target, 0, &[], MAX_DELAY, 1).is_ok());
    }

    #[test]
    fn only_admin_queues() {
        let (mut lock, chain, _) = setup();
        let err = lock
            .queue(&chain.ctx(Address::from_label("eve")), Address::ZERO, 0, &[], DAY_SECS, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn duplicate_queue_rejected_until_consumed() {
        let (mut lock, mut chain, admin) = setup();
        let mut counter = Counter::default();
        let target = counter.address();

        let hash = lock.queue(&chain.ctx(admin), target, 0, &[], DAY_SECS, 0).unwrap();
        assert_eq!(
            lock.queue(&chain.ctx(admin), target, 0, &[], DAY_SECS, 0),
            Err(TimeLockError::AlreadyQueued(hash))
        );

        let eta = chain.now() + DAY_SECS;
        chain.sleep(DAY_SECS);
        lock.execute(&chain.ctx(admin), &mut counter, 0, &[], eta, 0).unwrap();
        assert_eq!(lock.state(&hash, chain.now()), Some(TxState::Executed));
        assert!(matches!(
            lock.execute(&chain.ctx(admin), &mut counter, 0, &[], eta, 0),
            Err(TimeLockError::NotQueued {
                state: Some(TxState::Executed),
                ..
            })
        ));
        assert_eq!(counter.calls, 1);
    }

    #[test]
    fn expired_entries_are_reported_and_cancellable() {
        let (mut lock, mut chain, admin) = setup();
        let target = Address::from_label("t");
        let hash = lock.queue(&chain.ctx(admin), target, 0, &[], DAY_SECS, 0).unwrap();
        let eta = chain.now() + DAY_SECS;

        chain.sleep(DAY_SECS + GRACE_PERIOD + 1);
        assert_eq!(lock.state(&hash, chain.now()), Some(TxState::Expired));
        assert!(lock.queued(&hash));

        lock.cancel(&chain.ctx(admin), target, 0, &[], eta, 0).unwrap();
        assert_eq!(lock.state(&hash, chain.now()), Some(TxState::Cancelled));
    }

    #[test]
    fn failed_dispatch_restores_entry() {
        let (mut lock, mut chain, admin) = setup();
        let mut counter = Counter {
            fail: true,
            ..Counter::default()
        };
        let hash = lock
            .queue(&chain.ctx(admin), counter.address(), 0, &[], DAY_SECS, 0)
            .unwrap();
        let eta = chain.now() + DAY_SECS;
        chain.sleep(DAY_SECS);

        let err = lock
            .execute(&chain.ctx(admin), &mut counter, 0, &[], eta, 0)
            .unwrap_err();
        assert!(matches!(err, TimeLockError::CallReverted { .. }));
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(lock.queued(&hash));

        counter.fail = false;
        lock.execute(&chain.ctx(admin), &mut counter, 0, &[], eta, 0).unwrap();
        assert_eq!(counter.calls, 1);
    }

    #[test]
    fn set_next_admin_requires_self_call() {
        let (mut lock, mut chain, admin) = setup();
        let bob = Address::from_label("bob");

        let err = lock.set_next_admin(&chain.ctx(admin), bob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let payload = TimeLockCall::SetNextAdmin { candidate: bob }.encode().unwrap();
        lock.queue(&chain.ctx(admin), lock.address(), 0, &payload, DAY_SECS, 0)
            .unwrap();
        let eta = chain.now() + DAY_SECS;
        chain.sleep(DAY_SECS);
        lock.execute_self(&chain.ctx(admin), 0, &payload, eta, 0).unwrap();
        assert_eq!(lock.next_admin(), Some(bob));
        assert_eq!(lock.admin(), admin);

        assert!(lock.accept_admin(&chain.ctx(admin)).is_err());
        lock.accept_admin(&chain.ctx(bob)).unwrap();
        assert_eq!(lock.admin(), bob);
        assert_eq!(lock.next_admin(), None);
    }

    #[test]
    fn self_call_proposing_current_admin_reverts() {
        let (mut lock, mut chain, admin) = setup();
        let payload = TimeLockCall::SetNextAdmin { candidate: admin }.encode().unwrap();
        let hash = lock
            .queue(&chain.ctx(admin), lock.address(), 0, &payload, DAY_SECS, 7)
            .unwrap();
        let eta = chain.now() + DAY_SECS;
        chain.sleep(DAY_SECS);

        let err = lock
            .execute_self(&chain.ctx(admin), 0, &payload, eta, 7)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);
        assert!(lock.queued(&hash));
    }

    #[test]
    fn transaction_json_uses_hex_payload() {
        let tx = QueuedTransaction::new(Address::from_label("t"), 1, &[0x12, 0x12], 5, 0);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["payload"], "1212");
        let back: QueuedTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back.hash(), tx.hash());
    }
}
