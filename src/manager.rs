//! The external transaction-manager boundary the core enlists against.
//!
//! The core never implements a distributed transaction manager itself (spec
//! §1 Non-goals); it only defines the interface an external one must present
//! — `current()`/`enlist_volatile()`/`on_completed()` — and the 2PC callback
//! traits ([`Participant`], [`Enlistment`]) that manager drives.

use std::sync::Arc;

use crate::error::Error;

/// Opaque identity of an ambient transaction.
///
/// Produced and owned by the external [`TxnManager`]; the core only ever
/// compares and hashes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Wraps a raw identifier minted by the transaction manager.
    pub fn from_raw(id: u64) -> Self {
        TransactionId(id)
    }

    /// Returns the raw identifier.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// The object each 2PC callback receives to report its outcome.
///
/// Exactly one of `done`/`force_rollback` is called per `prepare`
/// invocation path; `done` is called once by `commit`/`rollback`/`in_doubt`.
pub trait Enlistment: Send + Sync {
    /// Reports successful completion of Commit, Rollback, or InDoubt.
    fn done(&self);

    /// Reports that Prepare succeeded and the participant is ready to commit.
    fn prepared(&self);

    /// Reports that Prepare failed; the manager will subsequently drive
    /// Rollback.
    fn force_rollback(&self, err: Error);
}

/// The four 2PC callbacks a volatile participant must answer.
///
/// Implemented by [`crate::TransactionShadow`]. The manager guarantees to
/// invoke exactly one of `commit`, `rollback`, or `in_doubt`, optionally
/// preceded by `prepare`.
pub trait Participant: Send + Sync {
    /// Applies the overlay to the backing store and records undo information.
    fn prepare(&self, enlistment: &dyn Enlistment);

    /// Commits the transaction, running Prepare first in single-phase mode
    /// if it has not already run.
    fn commit(&self, enlistment: &dyn Enlistment);

    /// Reverses any changes Prepare applied, using the recorded undo log.
    fn rollback(&self, enlistment: &dyn Enlistment);

    /// Accepted silently: the backing store is left exactly as the most
    /// recent callback left it.
    fn in_doubt(&self, enlistment: &dyn Enlistment);
}

/// The ambient-transaction and enlistment interface the core consumes.
///
/// Supplied externally (spec §6); the core never implements this itself.
pub trait TxnManager: Send + Sync {
    /// Returns the ambient transaction for the calling context, if any.
    fn current(&self) -> Option<TransactionId>;

    /// Registers `participant` to receive 2PC callbacks for `txn`.
    fn enlist_volatile(&self, txn: TransactionId, participant: Arc<dyn Participant>);

    /// Registers a one-shot callback fired when `txn` terminates, for any
    /// reason. Used to unblock a [`crate::TransactionGate`] waiter whose
    /// transaction was aborted while still queued (spec §4.1).
    fn on_completed(&self, txn: TransactionId, callback: Box<dyn FnOnce() + Send>);
}
