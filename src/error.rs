//! Error types for the transaction-aware container.
//!
//! One canonical error enum covers every failure mode a caller can observe:
//! construction outside a transaction, a read-only backing store, a missing
//! key, and a failure partway through applying an overlay at Prepare time.

/// Errors surfaced by [`crate::TransactionalMap`] and its collaborators.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A [`crate::TransactionShadow`] was constructed with no ambient transaction.
    #[error("no ambient transaction for this operation")]
    InvalidState,

    /// The backing store is read-only; a shadow cannot be constructed over it.
    #[error("backing store is read-only")]
    InvalidArgument,

    /// A lookup-or-fail operation found no entry for the key.
    #[error("key not found")]
    KeyNotFound,

    /// Applying the overlay to the backing store failed during Prepare.
    ///
    /// The transaction manager converts this into a ForceRollback on the
    /// enlistment; any mutations already applied before the failure are
    /// reversed from the partial `undo` log once Rollback is delivered.
    #[error("prepare failed: {0}")]
    PrepareFailure(String),

    /// The backing store reported an error outside of Prepare (e.g. from a
    /// direct, non-transactional operation).
    #[error("backing store error: {0}")]
    Store(String),
}
