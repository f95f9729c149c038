//! Per-transaction overlay and 2PC participant (spec §4.2).
//!
//! A `TransactionShadow` presents a writable view over a shared
//! [`BackingStore`] for exactly one transaction. Reads and writes only ever
//! touch the shadow's own overlay; the backing store is mutated solely from
//! [`Participant::prepare`] and [`Participant::rollback`], both of which run
//! under the [`TransactionGate`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backing::BackingStore;
use crate::error::Error;
use crate::gate::{LockOutcome, TransactionGate};
use crate::manager::{Enlistment, Participant, TransactionId};

/// One overlay entry: a tentative write or a tentative removal.
#[derive(Debug, Clone)]
enum OverlayEntry<V> {
    Set(V),
    Tombstone,
}

/// The backing-store state an undo entry restores on rollback.
#[derive(Debug, Clone)]
enum PriorState<V> {
    Set(V),
    Absent,
}

pub(crate) type Registry<K, V, S> = Arc<Mutex<HashMap<TransactionId, Arc<TransactionShadow<K, V, S>>>>>;

/// A per-transaction overlay over a shared [`BackingStore`], and a volatile
/// 2PC participant.
pub struct TransactionShadow<K, V, S> {
    overlay: Mutex<HashMap<K, OverlayEntry<V>>>,
    undo: Mutex<Vec<(K, PriorState<V>)>>,
    prepared: AtomicBool,
    gate_acquired: AtomicBool,
    txn: TransactionId,
    store: Arc<S>,
    gate: Arc<TransactionGate>,
    registry: Registry<K, V, S>,
}

impl<K, V, S> TransactionShadow<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    S: BackingStore<K, V> + Send + Sync + 'static,
{
    /// Constructs a shadow enlisted for `txn` over `store`, guarded by
    /// `gate`, registered in `registry`.
    ///
    /// Fails with [`Error::InvalidState`] if `txn` is `None` (no ambient
    /// transaction) or [`Error::InvalidArgument`] if `store` is read-only
    /// (spec §6 construction preconditions).
    pub(crate) fn new(
        txn: Option<TransactionId>,
        store: Arc<S>,
        gate: Arc<TransactionGate>,
        registry: Registry<K, V, S>,
    ) -> Result<Arc<Self>, Error> {
        let txn = txn.ok_or(Error::InvalidState)?;
        if store.is_read_only() {
            return Err(Error::InvalidArgument);
        }
        Ok(Arc::new(TransactionShadow {
            overlay: Mutex::new(HashMap::new()),
            undo: Mutex::new(Vec::new()),
            prepared: AtomicBool::new(false),
            gate_acquired: AtomicBool::new(false),
            txn,
            store,
            gate,
            registry,
        }))
    }

    /// The transaction this shadow is enlisted for.
    pub fn transaction_id(&self) -> TransactionId {
        self.txn
    }

    /// `true` once Prepare has run (monotonic: never resets to `false`).
    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }

    // ---- read path (spec §4.2 "Read path") ----------------------------

    /// Effective value for `k`: the overlay entry if one exists, else the
    /// backing store's value.
    pub fn get(&self, k: &K) -> Result<Option<V>, Error> {
        match self.overlay.lock().get(k) {
            Some(OverlayEntry::Set(v)) => Ok(Some(v.clone())),
            Some(OverlayEntry::Tombstone) => Ok(None),
            None => self.store.try_get(k),
        }
    }

    /// `true` if `k` has an effective binding.
    pub fn contains_key(&self, k: &K) -> Result<bool, Error> {
        Ok(self.get(k)?.is_some())
    }

    /// `true` if `k` is effectively bound to a value equal to `v`.
    pub fn contains_pair(&self, k: &K, v: &V) -> Result<bool, Error> {
        Ok(self.get(k)?.as_ref() == Some(v))
    }

    /// Materializes the full effective view: the backing store folded with
    /// the overlay (Set overwrites, Tombstone removes). Iteration order of
    /// the result is unspecified.
    pub fn materialize(&self) -> Result<HashMap<K, V>, Error> {
        let mut view: HashMap<K, V> = self.store.enumerate()?.into_iter().collect();
        for (k, entry) in self.overlay.lock().iter() {
            match entry {
                OverlayEntry::Set(v) => {
                    view.insert(k.clone(), v.clone());
                }
                OverlayEntry::Tombstone => {
                    view.remove(k);
                }
            }
        }
        Ok(view)
    }

    /// Number of effectively-bound keys.
    pub fn count(&self) -> Result<usize, Error> {
        Ok(self.materialize()?.len())
    }

    // ---- write path (spec §4.2 "Write path") ---------------------------

    /// Tentatively binds `k` to `v`. Always succeeds; no check against any
    /// prior state.
    pub fn set(&self, k: K, v: V) {
        self.overlay.lock().insert(k, OverlayEntry::Set(v));
    }

    /// Tentatively removes `k`. Returns whether `k` was effectively present
    /// beforehand.
    pub fn remove_key(&self, k: &K) -> Result<bool, Error> {
        let was_present = self.get(k)?.is_some();
        self.overlay.lock().insert(k.clone(), OverlayEntry::Tombstone);
        Ok(was_present)
    }

    /// Tentatively removes `k`, but only reports `true` if its effective
    /// value equalled `v`.
    ///
    /// Writes a Tombstone even when the values don't match (spec §9 design
    /// note: preserved, not "fixed").
    pub fn remove_pair(&self, k: &K, v: &V) -> Result<bool, Error> {
        let matched = self.get(k)?.as_ref() == Some(v);
        self.overlay.lock().insert(k.clone(), OverlayEntry::Tombstone);
        Ok(matched)
    }

    /// Tentatively removes every key in the materialized view.
    pub fn clear(&self) -> Result<(), Error> {
        let view = self.materialize()?;
        let mut overlay = self.overlay.lock();
        for k in view.into_keys() {
            overlay.insert(k, OverlayEntry::Tombstone);
        }
        Ok(())
    }

    // ---- 2PC internals --------------------------------------------------

    /// Applies the overlay to the backing store and records undo entries.
    /// Shared by `prepare` and `commit`'s single-phase fallback.
    ///
    /// If the gate wait ends via [`LockOutcome::Cancelled`] (this
    /// transaction was aborted by the `TxnManager` while still queued for
    /// the gate, spec §4.1), the gate was never acquired: bail without
    /// touching the store or `gate_acquired`, so `finished` does not later
    /// `unlock` a gate this shadow never owned.
    fn apply_overlay(&self) -> Result<(), Error> {
        match self.gate.lock(self.txn) {
            LockOutcome::Granted => {}
            LockOutcome::Cancelled => {
                tracing::debug!(txn = ?self.txn, "prepare abandoned: cancelled while queued for gate");
                return Err(Error::PrepareFailure(
                    "transaction completed before the gate was granted".to_string(),
                ));
            }
        }
        self.gate_acquired.store(true, Ordering::Release);

        let overlay = self.overlay.lock();
        let mut undo = self.undo.lock();
        for (k, entry) in overlay.iter() {
            let old = self
                .store
                .try_get(k)
                .map_err(|e| Error::PrepareFailure(e.to_string()))?;
            match entry {
                OverlayEntry::Set(v) => self
                    .store
                    .set(k.clone(), v.clone())
                    .map_err(|e| Error::PrepareFailure(e.to_string()))?,
                OverlayEntry::Tombstone => self
                    .store
                    .remove(k)
                    .map_err(|e| Error::PrepareFailure(e.to_string()))?,
            }
            let prior = match old {
                Some(v) => PriorState::Set(v),
                None => PriorState::Absent,
            };
            undo.push((k.clone(), prior));
        }
        self.prepared.store(true, Ordering::Release);
        Ok(())
    }

    /// Releases the gate (if acquired) and drops this shadow's registry
    /// entry. Gate release happens first so that the next transaction
    /// creating its own shadow never blocks behind the registry mutex while
    /// this shadow still holds the gate (spec §4.2 "finished hook").
    fn finished(&self) {
        if self.gate_acquired.swap(false, Ordering::AcqRel) {
            self.gate.unlock();
        }
        self.registry.lock().remove(&self.txn);
        tracing::debug!(txn = ?self.txn, "shadow finished, registry entry removed");
    }
}

impl<K, V, S> Participant for TransactionShadow<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    S: BackingStore<K, V> + Send + Sync + 'static,
{
    fn prepare(&self, enlistment: &dyn Enlistment) {
        match self.apply_overlay() {
            Ok(()) => {
                tracing::debug!(txn = ?self.txn, "prepared");
                enlistment.prepared();
            }
            Err(e) => {
                tracing::debug!(txn = ?self.txn, error = %e, "prepare failed, forcing rollback");
                enlistment.force_rollback(e);
            }
        }
    }

    fn commit(&self, enlistment: &dyn Enlistment) {
        if !self.is_prepared() {
            // Single-phase commit: Prepare was never driven separately.
            if let Err(e) = self.apply_overlay() {
                tracing::error!(txn = ?self.txn, error = %e, "single-phase commit failed to apply overlay");
            }
        }
        self.finished();
        enlistment.done();
    }

    fn rollback(&self, enlistment: &dyn Enlistment) {
        let mut undo = self.undo.lock();
        for (k, prior) in undo.drain(..) {
            let result = match prior {
                PriorState::Set(v) => self.store.set(k, v),
                PriorState::Absent => self.store.remove(&k),
            };
            if let Err(e) = result {
                tracing::error!(txn = ?self.txn, error = %e, "rollback failed to restore a key");
            }
        }
        drop(undo);
        self.finished();
        enlistment.done();
    }

    fn in_doubt(&self, enlistment: &dyn Enlistment) {
        // The backing store itself is left as-is: no automatic recovery
        // (spec §4.2 / §7 "InDoubt"). But InDoubt is still one of the three
        // terminal callbacks the TxnManager guarantees to deliver exactly
        // one of (spec §4.2), so the gate and registry entry must be
        // released here exactly as they are in `commit`/`rollback` —
        // otherwise a transaction that prepared and then went InDoubt
        // (rather than Commit/Rollback) holds the gate forever and is never
        // cleaned up, violating invariant 6 (spec §8).
        self.finished();
        enlistment.done();
    }
}
