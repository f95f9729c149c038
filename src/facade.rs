//! The public container surface (spec §4.3).
//!
//! `TransactionalMap` routes every operation to either the backing store
//! directly (no ambient transaction) or to the calling transaction's
//! [`TransactionShadow`] (lazily created and enlisted on first touch).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backing::BackingStore;
use crate::error::Error;
use crate::gate::TransactionGate;
use crate::manager::{Participant, TransactionId, TxnManager};
use crate::shadow::TransactionShadow;

type Registry<K, V, S> = Arc<Mutex<HashMap<TransactionId, Arc<TransactionShadow<K, V, S>>>>>;

/// A mutable mapping whose writes are isolated per ambient transaction.
///
/// With no ambient transaction, operations delegate straight to the
/// backing store. Inside a transaction, operations are routed to that
/// transaction's shadow, created and enlisted on first use.
///
/// Safe for concurrent use only when different threads operate under
/// different transactions (spec §4.3) — two workers sharing one
/// transaction, or sharing "no transaction", may race exactly as on a
/// plain mapping.
pub struct TransactionalMap<K, V, S, M> {
    store: Arc<S>,
    gate: Arc<TransactionGate>,
    registry: Registry<K, V, S>,
    txn_manager: Arc<M>,
}

impl<K, V, S, M> TransactionalMap<K, V, S, M>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    S: BackingStore<K, V> + Send + Sync + 'static,
    M: TxnManager + 'static,
{
    /// Wraps `store` behind a transactional façade coordinated through
    /// `txn_manager`.
    pub fn new(store: Arc<S>, txn_manager: Arc<M>) -> Self {
        TransactionalMap {
            store,
            gate: Arc::new(TransactionGate::new()),
            registry: Arc::new(Mutex::new(HashMap::new())),
            txn_manager,
        }
    }

    /// Number of shadows currently registered. Test/introspection only —
    /// not part of the container surface.
    #[doc(hidden)]
    pub fn registry_len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Looks up, or lazily creates and enlists, the shadow for `txn`.
    fn shadow_for(&self, txn: TransactionId) -> Result<Arc<TransactionShadow<K, V, S>>, Error> {
        // The registry mutex protects only the txn -> shadow mapping; it is
        // never held across a gate acquisition or into user-code dispatch.
        let mut registry = self.registry.lock();
        if let Some(shadow) = registry.get(&txn) {
            return Ok(shadow.clone());
        }

        let shadow = TransactionShadow::new(
            Some(txn),
            self.store.clone(),
            self.gate.clone(),
            self.registry.clone(),
        )?;
        registry.insert(txn, shadow.clone());
        drop(registry);

        self.txn_manager
            .enlist_volatile(txn, shadow.clone() as Arc<dyn Participant>);

        let gate = self.gate.clone();
        self.txn_manager
            .on_completed(txn, Box::new(move || gate.cancel(txn)));

        tracing::debug!(?txn, "shadow created and enlisted");
        Ok(shadow)
    }

    /// Dispatches to the ambient transaction's shadow, or directly to the
    /// backing store when there is none.
    fn with_dispatch<R>(
        &self,
        on_store: impl FnOnce(&S) -> Result<R, Error>,
        on_shadow: impl FnOnce(&TransactionShadow<K, V, S>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        match self.txn_manager.current() {
            None => on_store(&self.store),
            Some(txn) => {
                let shadow = self.shadow_for(txn)?;
                on_shadow(&shadow)
            }
        }
    }

    /// Returns the value bound to `k`, or `None`.
    pub fn get(&self, k: &K) -> Result<Option<V>, Error> {
        self.with_dispatch(|s| s.try_get(k), |shadow| shadow.get(k))
    }

    /// Returns the value bound to `k`, or [`Error::KeyNotFound`].
    pub fn get_or_fail(&self, k: &K) -> Result<V, Error> {
        self.get(k)?.ok_or(Error::KeyNotFound)
    }

    /// `true` if `k` has a binding.
    pub fn contains_key(&self, k: &K) -> Result<bool, Error> {
        self.with_dispatch(|s| s.contains_key(k), |shadow| shadow.contains_key(k))
    }

    /// `true` if `k` is bound to a value equal to `v`.
    pub fn contains(&self, k: &K, v: &V) -> Result<bool, Error> {
        self.with_dispatch(
            |s| Ok(s.try_get(k)?.as_ref() == Some(v)),
            |shadow| shadow.contains_pair(k, v),
        )
    }

    /// Inserts or overwrites the binding for `k`.
    pub fn insert(&self, k: K, v: V) -> Result<(), Error> {
        self.with_dispatch(
            |s| s.set(k.clone(), v.clone()),
            |shadow| {
                shadow.set(k.clone(), v.clone());
                Ok(())
            },
        )
    }

    /// Removes the binding for `k`, returning whether it was present.
    pub fn remove(&self, k: &K) -> Result<bool, Error> {
        self.with_dispatch(
            |s| {
                let was_present = s.contains_key(k)?;
                s.remove(k)?;
                Ok(was_present)
            },
            |shadow| shadow.remove_key(k),
        )
    }

    /// Removes the binding for `k` only if it currently equals `v`.
    ///
    /// Returns whether it matched. Note: a non-matching value still writes
    /// a Tombstone into the ambient transaction's overlay (spec §9 — a
    /// preserved quirk of the source behavior, not corrected here).
    pub fn remove_pair(&self, k: &K, v: &V) -> Result<bool, Error> {
        self.with_dispatch(
            |s| {
                let matched = s.try_get(k)?.as_ref() == Some(v);
                if matched {
                    s.remove(k)?;
                }
                Ok(matched)
            },
            |shadow| shadow.remove_pair(k, v),
        )
    }

    /// Removes every binding.
    pub fn clear(&self) -> Result<(), Error> {
        self.with_dispatch(
            |s| {
                for (k, _) in s.enumerate()? {
                    s.remove(&k)?;
                }
                Ok(())
            },
            |shadow| shadow.clear(),
        )
    }

    /// Number of bindings in the effective view.
    pub fn count(&self) -> Result<usize, Error> {
        self.with_dispatch(|s| Ok(s.enumerate()?.len()), |shadow| shadow.count())
    }

    /// All (key, value) pairs in the effective view. Order is unspecified.
    pub fn entries(&self) -> Result<Vec<(K, V)>, Error> {
        self.with_dispatch(
            |s| s.enumerate(),
            |shadow| Ok(shadow.materialize()?.into_iter().collect()),
        )
    }

    /// All keys in the effective view. Order is unspecified.
    pub fn keys(&self) -> Result<Vec<K>, Error> {
        Ok(self.entries()?.into_iter().map(|(k, _)| k).collect())
    }

    /// All values in the effective view. Order is unspecified.
    pub fn values(&self) -> Result<Vec<V>, Error> {
        Ok(self.entries()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Copies every (key, value) pair into `out`.
    pub fn copy_into(&self, out: &mut Vec<(K, V)>) -> Result<(), Error> {
        out.extend(self.entries()?);
        Ok(())
    }

    /// Always `false`: this container is never read-only.
    pub fn is_read_only(&self) -> bool {
        false
    }
}
