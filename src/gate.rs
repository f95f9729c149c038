//! A fair, transaction-scoped mutual-exclusion primitive.
//!
//! [`TransactionGate`] serializes the Prepare-to-finish critical section of
//! every [`crate::TransactionShadow`] sharing a backing store. Ownership is
//! granted FIFO across distinct waiting transactions and is reentrant for
//! the transaction that already holds it.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::manager::TransactionId;

/// One-shot wakeup signal handed to a queued waiter.
///
/// Closed (dropped) exactly once, after the waiter has been woken and has
/// returned from [`TransactionGate::lock`].
type Signal = Arc<(Mutex<bool>, Condvar)>;

struct Waiter {
    txn: TransactionId,
    signal: Signal,
}

struct GateState {
    owner: Option<TransactionId>,
    queue: VecDeque<Waiter>,
}

/// Outcome of a [`TransactionGate::lock`] call.
///
/// A queued waiter can be woken two ways: handed ownership by
/// [`unlock`](TransactionGate::unlock), or removed from the queue by
/// [`cancel`](TransactionGate::cancel) without ever owning the gate. Callers
/// must check this before treating the gate's critical section as entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum LockOutcome {
    /// The caller now owns the gate.
    Granted,
    /// The caller's transaction completed while still queued; the gate was
    /// never acquired.
    Cancelled,
}

/// Fair mutual exclusion keyed by transaction identity (spec §4.1).
///
/// `owner` and the pending queue are both protected by a single internal
/// mutex, and ownership transfer on [`unlock`](TransactionGate::unlock)
/// happens while that mutex is held, so no thread ever observes an unowned
/// gate with waiters still queued.
pub struct TransactionGate {
    state: Mutex<GateState>,
}

impl TransactionGate {
    /// Creates an unowned gate with an empty waiter queue.
    pub fn new() -> Self {
        TransactionGate {
            state: Mutex::new(GateState {
                owner: None,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Requests ownership on behalf of `txn`, blocking until it is granted
    /// or the waiter is cancelled.
    ///
    /// Reentrant: if `txn` already owns the gate this returns `Granted`
    /// immediately. Otherwise the caller is enqueued FIFO behind any other
    /// waiters and parks on its own signal until either [`unlock`]
    /// (`Granted`) or [`cancel`] (`Cancelled`) wakes it.
    ///
    /// Callers must check the returned [`LockOutcome`]: on `Cancelled` the
    /// gate was never acquired, so the caller must not touch whatever the
    /// gate was meant to protect, and must not call [`unlock`].
    ///
    /// [`unlock`]: TransactionGate::unlock
    /// [`cancel`]: TransactionGate::cancel
    pub fn lock(&self, txn: TransactionId) -> LockOutcome {
        let signal = {
            let mut state = self.state.lock();
            match state.owner {
                None => {
                    state.owner = Some(txn);
                    tracing::debug!(?txn, "gate granted immediately");
                    return LockOutcome::Granted;
                }
                Some(owner) if owner == txn => {
                    tracing::debug!(?txn, "gate re-entered by owner");
                    return LockOutcome::Granted;
                }
                Some(_) => {
                    let signal: Signal = Arc::new((Mutex::new(false), Condvar::new()));
                    state.queue.push_back(Waiter {
                        txn,
                        signal: signal.clone(),
                    });
                    tracing::debug!(?txn, queue_len = state.queue.len(), "gate wait enqueued");
                    signal
                }
            }
        };

        let (ready_lock, cvar) = &*signal;
        let mut ready = ready_lock.lock();
        while !*ready {
            cvar.wait(&mut ready);
        }
        drop(ready);

        // Distinguish a genuine grant (unlock set owner <- txn before
        // signalling) from a cancel (txn was dequeued without ever becoming
        // owner).
        if self.state.lock().owner == Some(txn) {
            LockOutcome::Granted
        } else {
            tracing::debug!(?txn, "gate wait cancelled, never acquired");
            LockOutcome::Cancelled
        }
    }

    /// Releases ownership, handing it to the head of the waiter queue (if
    /// any) or leaving the gate unowned.
    ///
    /// # Panics
    ///
    /// Never panics; calling `unlock` when the gate is already unowned
    /// simply leaves it unowned. Callers are expected to call this only
    /// after a successful `lock`.
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        match state.queue.pop_front() {
            Some(waiter) => {
                state.owner = Some(waiter.txn);
                tracing::debug!(txn = ?waiter.txn, "gate handed to next waiter");
                drop(state);
                Self::signal(&waiter.signal);
            }
            None => {
                state.owner = None;
            }
        }
    }

    /// Removes `txn` from the waiter queue and wakes it, without granting
    /// ownership. Used when an external transaction manager reports `txn`
    /// completed while it was still parked in [`lock`](TransactionGate::lock)
    /// (spec §4.1, "external-cancellation path").
    ///
    /// A no-op if `txn` is not currently queued (it may already hold the
    /// gate, or may never have needed it).
    pub fn cancel(&self, txn: TransactionId) {
        let mut state = self.state.lock();
        if let Some(pos) = state.queue.iter().position(|w| w.txn == txn) {
            let waiter = state.queue.remove(pos).expect("position just located");
            tracing::debug!(?txn, "gate wait cancelled");
            drop(state);
            Self::signal(&waiter.signal);
        }
    }

    /// `true` while any transaction holds the gate.
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    fn signal(signal: &Signal) {
        let (ready_lock, cvar) = &**signal;
        *ready_lock.lock() = true;
        cvar.notify_one();
    }
}

impl Default for TransactionGate {
    fn default() -> Self {
        Self::new()
    }
}
