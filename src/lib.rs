//! A transaction-aware associative container.
//!
//! [`TransactionalMap`] is a mutable K→V mapping that participates in an
//! ambient, externally-driven two-phase-commit transaction. Writes made
//! inside a transaction are isolated from concurrent readers in other
//! transactions (or no transaction at all) until the owning transaction
//! commits; on rollback they vanish.
//!
//! The two collaborators that make isolation work are:
//!
//! - [`TransactionShadow`] — a per-transaction overlay over a shared
//!   [`BackingStore`] that also answers the four 2PC callbacks
//!   (`prepare`/`commit`/`rollback`/`in_doubt`) and computes the undo
//!   information needed to reverse a rollback after Prepare has already
//!   mutated the backing store.
//! - [`TransactionGate`] — a fair, transaction-scoped mutual exclusion
//!   primitive that serializes the Prepare/Commit critical sections of all
//!   enlisted shadows over the same backing store.
//!
//! This crate does not implement a transaction manager, persistence,
//! serialization, or deadlock/timeout detection: an external transaction
//! manager implementing [`TxnManager`] supplies the ambient transaction
//! handle and drives the 2PC callbacks; this crate only enlists correctly
//! and honors the protocol.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod backing;
mod error;
mod facade;
mod gate;
mod manager;
mod shadow;

pub use backing::{BackingStore, InMemoryStore};
pub use error::Error;
pub use facade::TransactionalMap;
pub use gate::{LockOutcome, TransactionGate};
pub use manager::{Enlistment, Participant, TransactionId, TxnManager};
pub use shadow::TransactionShadow;
