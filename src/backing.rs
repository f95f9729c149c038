//! The non-transactional mapping a [`crate::TransactionShadow`] overlays.
//!
//! `BackingStore` is the single-threaded mutable mapping interface consumed
//! by the core (spec §6). [`InMemoryStore`] is a concrete, `HashMap`-backed
//! implementation provided for direct use and for exercising the shadow and
//! gate in tests; it is not itself part of the core's isolation guarantees
//! (it only promises ordinary mutable-map semantics under a single mutex).

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::error::Error;

/// The mutable mapping interface a [`crate::TransactionShadow`] applies its
/// overlay to at Prepare and reverses at Rollback.
pub trait BackingStore<K, V> {
    /// Returns whether `k` has a binding.
    fn contains_key(&self, k: &K) -> Result<bool, Error>;

    /// Returns the value bound to `k`, if any.
    fn try_get(&self, k: &K) -> Result<Option<V>, Error>;

    /// Binds `k` to `v`, inserting or overwriting.
    fn set(&self, k: K, v: V) -> Result<(), Error>;

    /// Removes any binding for `k`. A no-op if `k` is unbound.
    fn remove(&self, k: &K) -> Result<(), Error>;

    /// Returns every binding currently in the store. Order is unspecified.
    fn enumerate(&self) -> Result<Vec<(K, V)>, Error>;

    /// `true` if the store rejects mutation; shadow construction over such a
    /// store fails with [`Error::InvalidArgument`].
    fn is_read_only(&self) -> bool;
}

/// A `parking_lot::Mutex`-guarded `HashMap`, the default [`BackingStore`].
pub struct InMemoryStore<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K, V> InMemoryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty store.
    pub fn new() -> Self {
        InMemoryStore {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Number of bindings currently present. Convenience for tests; not part
    /// of the `BackingStore` trait (which exposes `enumerate` instead).
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// `true` if no bindings are present.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<K, V> Default for InMemoryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for InMemoryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(entries: T) -> Self {
        InMemoryStore {
            inner: Mutex::new(entries.into_iter().collect()),
        }
    }
}

impl<K, V> BackingStore<K, V> for InMemoryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn contains_key(&self, k: &K) -> Result<bool, Error> {
        Ok(self.inner.lock().contains_key(k))
    }

    fn try_get(&self, k: &K) -> Result<Option<V>, Error> {
        Ok(self.inner.lock().get(k).cloned())
    }

    fn set(&self, k: K, v: V) -> Result<(), Error> {
        self.inner.lock().insert(k, v);
        Ok(())
    }

    fn remove(&self, k: &K) -> Result<(), Error> {
        self.inner.lock().remove(k);
        Ok(())
    }

    fn enumerate(&self) -> Result<Vec<(K, V)>, Error> {
        Ok(self
            .inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn is_read_only(&self) -> bool {
        false
    }
}
