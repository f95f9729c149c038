//! A minimal, single-process stand-in for an external 2PC transaction
//! manager, shared by the integration tests in this directory.
//!
//! Unlike the `TestTxnManager` used by `src/facade.rs`'s own unit tests,
//! `current()` here is backed by a `thread_local!` rather than one shared
//! slot, so that independent OS threads genuinely observe independent
//! ambient transactions — needed to exercise real cross-thread isolation
//! (S5) and concurrent commits (S6) rather than a single-threaded stand-in.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use txnmap::{Enlistment, Error, Participant, TransactionId, TxnManager};

thread_local! {
    static CURRENT: Cell<Option<TransactionId>> = Cell::new(None);
}

/// Brings up a `tracing` subscriber so gate/shadow events are visible with
/// `cargo test -- --nocapture`. Safe to call from every test; only the
/// first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Default)]
pub struct TestTxnManager {
    participants: Mutex<HashMap<TransactionId, Arc<dyn Participant>>>,
    completed_hooks: Mutex<HashMap<TransactionId, Vec<Box<dyn FnOnce() + Send>>>>,
}

pub struct TestEnlistment;
impl Enlistment for TestEnlistment {
    fn done(&self) {}
    fn prepared(&self) {}
    fn force_rollback(&self, _err: Error) {}
}

impl TestTxnManager {
    /// Sets the ambient transaction for the *calling thread only*.
    pub fn begin(&self, txn: TransactionId) {
        CURRENT.with(|c| c.set(Some(txn)));
    }

    /// Clears the ambient transaction for the calling thread only.
    pub fn no_ambient_txn(&self) {
        CURRENT.with(|c| c.set(None));
    }

    pub fn commit(&self, txn: TransactionId) {
        if let Some(p) = self.participants.lock().unwrap().remove(&txn) {
            p.commit(&TestEnlistment);
        }
        self.fire_completed(txn);
    }

    pub fn abort(&self, txn: TransactionId) {
        if let Some(p) = self.participants.lock().unwrap().remove(&txn) {
            p.rollback(&TestEnlistment);
        }
        self.fire_completed(txn);
    }

    /// Drives Prepare, then Commit, as two separate callbacks — the
    /// genuine two-phase path rather than the single-phase fallback.
    pub fn prepare_then_commit(&self, txn: TransactionId) {
        if let Some(p) = self.participants.lock().unwrap().get(&txn).cloned() {
            p.prepare(&TestEnlistment);
        }
        self.commit(txn);
    }

    fn fire_completed(&self, txn: TransactionId) {
        if let Some(hooks) = self.completed_hooks.lock().unwrap().remove(&txn) {
            for hook in hooks {
                hook();
            }
        }
    }
}

impl TxnManager for TestTxnManager {
    fn current(&self) -> Option<TransactionId> {
        CURRENT.with(|c| c.get())
    }

    fn enlist_volatile(&self, txn: TransactionId, participant: Arc<dyn Participant>) {
        self.participants.lock().unwrap().insert(txn, participant);
    }

    fn on_completed(&self, txn: TransactionId, callback: Box<dyn FnOnce() + Send>) {
        self.completed_hooks
            .lock()
            .unwrap()
            .entry(txn)
            .or_default()
            .push(callback);
    }
}
