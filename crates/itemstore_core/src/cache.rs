//! Session cache.

use crate::item::ItemId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-lifetime map from id to the last item value read or written.
///
/// Never the system of record: clearing it only costs store reads. There is
/// no eviction; the key space is the number of catalogued records.
///
/// [`get`](Self::get) hands out an owned clone, so mutating a returned item
/// never changes what the cache (or the store) holds. Persisting a change
/// always takes an explicit upsert.
#[derive(Debug)]
pub struct SessionCache<T> {
    entries: RwLock<HashMap<ItemId, Arc<T>>>,
}

impl<T: Clone> SessionCache<T> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a snapshot of the cached value for `id`.
    pub fn get(&self, id: ItemId) -> Option<T> {
        self.entries.read().get(&id).map(|item| T::clone(item))
    }

    /// Checks whether `id` is cached.
    pub fn contains(&self, id: ItemId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Stores `item`, replacing any previous value.
    pub fn set(&self, id: ItemId, item: T) {
        self.entries.write().insert(id, Arc::new(item));
    }

    /// Stores `item` only if nothing is cached for `id` yet.
    ///
    /// Used by reads, so a value loaded from the store never overwrites a
    /// newer one written through by a concurrent upsert.
    pub fn populate(&self, id: ItemId, item: T) {
        self.entries
            .write()
            .entry(id)
            .or_insert_with(|| Arc::new(item));
    }

    /// Evicts `id`, returning the value it held.
    pub fn remove(&self, id: ItemId) -> Option<T> {
        self.entries.write().remove(&id).map(Arc::unwrap_or_clone)
    }

    /// Evicts `id` if present.
    pub fn clear_one(&self, id: ItemId) {
        self.entries.write().remove(&id);
    }

    /// Evicts everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Clone> Default for SessionCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
