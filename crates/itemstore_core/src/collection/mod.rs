//! The item collection.
//!
//! [`ItemCollection`] composes a [`StoreHandle`] with a [`SessionCache`].
//! Reads consult the cache first and fall back to the store; every mutation
//! is written to the store and then through to the cache.

mod backup;
mod migrate;
mod reconcile;

pub use reconcile::{ReconcileReport, Reconciled};

use crate::cache::SessionCache;
use crate::config::CollectionConfig;
use crate::error::{CoreError, CoreResult};
use crate::item::{Item, ItemId};
use crate::stats::StoreStats;
use crate::store::StoreHandle;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`ItemCollection::upsert_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items that did not exist before.
    pub inserted: usize,
    /// Items that replaced an existing record.
    pub updated: usize,
    /// Items that could not be written.
    pub failed: usize,
}

/// A persistent, cached collection of items backed by one store file.
///
/// # Concurrency
///
/// The collection is `Sync` and meant to be shared between threads. Ordinary
/// traffic (`get`, `find*`, `exists`, `upsert*`, `remove`) runs concurrently;
/// the store serializes physical writes internally. Writes and their cache
/// updates happen in the same order, so the cache never holds an older
/// version than the store. `backup`, `restore`, migration, `compact` and
/// `dispose` take the collection exclusively, so they never interleave with
/// other operations on the same instance.
///
/// # Durability
///
/// Writes are not journaled. A crash during a write may tear the last
/// record, which is discarded on the next open; anything worse is recovered
/// from a backup. `upsert_batch` and migration commit item by item: a
/// failure part-way leaves the earlier items written.
///
/// # Example
///
/// ```rust,no_run
/// use itemstore_core::{GameItem, ItemCollection, ItemId};
///
/// let games: ItemCollection<GameItem> = ItemCollection::open("games.db".as_ref())?;
/// let id = ItemId::new();
/// games.upsert(GameItem::new(id, "Celeste"))?;
/// assert_eq!(games.get(id)?.map(|g| g.name), Some("Celeste".to_string()));
/// # Ok::<(), itemstore_core::CoreError>(())
/// ```
pub struct ItemCollection<T: Item> {
    store: RwLock<Option<StoreHandle>>,
    cache: SessionCache<T>,
    /// Live item count, maintained incrementally. It can dip below zero for
    /// an instant when a remove overtakes the insert it undoes.
    count: AtomicIsize,
    /// Pairs each store write with its cache update.
    writes: Mutex<()>,
    config: CollectionConfig,
}

impl<T: Item> ItemCollection<T> {
    /// Opens the store at `path` with default configuration, creating it if
    /// absent.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, CollectionConfig::default())
    }

    /// Opens the store at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file is locked by another process, is not an item store,
    /// or is corrupted.
    pub fn open_with_config(path: &Path, config: CollectionConfig) -> CoreResult<Self> {
        let store = StoreHandle::open(path, config.store)?;
        info!(path = %path.display(), items = store.count(), "item collection opened");
        Ok(Self::from_store(store, config))
    }

    /// Opens an empty collection that lives only in memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Ok(Self::from_store(
            StoreHandle::open_in_memory()?,
            CollectionConfig::default(),
        ))
    }

    /// Wraps an already open store.
    ///
    /// The live count is seeded from the store; the cache starts empty.
    #[must_use]
    pub fn from_store(store: StoreHandle, config: CollectionConfig) -> Self {
        let count = store.count() as isize;
        Self {
            store: RwLock::new(Some(store)),
            cache: SessionCache::new(),
            count: AtomicIsize::new(count),
            writes: Mutex::new(()),
            config,
        }
    }

    pub(crate) fn handle(&self) -> CoreResult<MappedRwLockReadGuard<'_, StoreHandle>> {
        RwLockReadGuard::try_map(self.store.read(), Option::as_ref).map_err(|_| CoreError::Disposed)
    }

    pub(crate) fn handle_exclusive(&self) -> CoreResult<MappedRwLockWriteGuard<'_, StoreHandle>> {
        RwLockWriteGuard::try_map(self.store.write(), Option::as_mut)
            .map_err(|_| CoreError::Disposed)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Returns the store name (the file stem, or `items` in memory).
    pub fn name(&self) -> CoreResult<String> {
        Ok(self.handle()?.name().to_string())
    }

    /// Returns the store file path; `None` for in-memory collections.
    pub fn path(&self) -> CoreResult<Option<PathBuf>> {
        Ok(self.handle()?.path().map(Path::to_path_buf))
    }

    /// Returns the store's round-trip counters.
    pub fn stats(&self) -> CoreResult<Arc<StoreStats>> {
        Ok(Arc::clone(self.handle()?.stats()))
    }

    /// Looks up an item, serving it from the session cache when possible.
    ///
    /// Absence is not an error. The returned value is a snapshot: changing it
    /// has no effect until it is passed to [`upsert`](Self::upsert).
    pub fn get(&self, id: ItemId) -> CoreResult<Option<T>> {
        let store = self.handle()?;
        if let Some(hit) = self.cache.get(id) {
            return Ok(Some(hit));
        }

        let found = store.find_by_id::<T>(id)?;
        if let Some(item) = &found {
            self.populate(&store, item);
        }
        Ok(found)
    }

    /// Returns every item, caching each one.
    pub fn find_all(&self) -> CoreResult<Vec<T>> {
        let store = self.handle()?;
        let items = store.find_all::<T>()?;
        for item in &items {
            self.populate(&store, item);
        }
        Ok(items)
    }

    /// Returns the items matching `predicate`, caching each match.
    pub fn find<F>(&self, predicate: F) -> CoreResult<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let store = self.handle()?;
        let items = store.find::<T, F>(predicate)?;
        for item in &items {
            self.populate(&store, item);
        }
        Ok(items)
    }

    /// Checks whether an item exists, cache first.
    pub fn exists(&self, id: ItemId) -> CoreResult<bool> {
        let store = self.handle()?;
        Ok(self.cache.contains(id) || store.contains(id))
    }

    /// Inserts or replaces `item` and writes it through to the cache.
    pub fn upsert(&self, item: T) -> CoreResult<()> {
        let store = self.handle()?;
        let id = item.id();
        let inserted = self.write_through(&store, item)?;
        debug!(id = %id, inserted, "item upserted");
        Ok(())
    }

    /// Upserts every item in order.
    ///
    /// Items commit one at a time; a failing item is logged, counted and
    /// skipped, and the items before it stay written.
    pub fn upsert_batch<I>(&self, items: I) -> CoreResult<BatchReport>
    where
        I: IntoIterator<Item = T>,
    {
        let store = self.handle()?;
        let mut report = BatchReport::default();
        for item in items {
            let id = item.id();
            match self.write_through(&store, item) {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.updated += 1,
                Err(err) => {
                    warn!(id = %id, error = %err, "batch upsert skipped item");
                    report.failed += 1;
                }
            }
        }
        debug!(
            inserted = report.inserted,
            updated = report.updated,
            failed = report.failed,
            "batch upsert finished"
        );
        Ok(report)
    }

    /// Deletes an item; returns whether it existed.
    pub fn remove(&self, id: ItemId) -> CoreResult<bool> {
        let store = self.handle()?;
        let _write = self.writes.lock();
        let existed = store.delete(id)?;
        if existed {
            self.cache.clear_one(id);
            self.count.fetch_sub(1, Ordering::SeqCst);
            debug!(id = %id, "item removed");
        }
        Ok(existed)
    }

    /// Number of live items, without touching the store.
    pub fn count(&self) -> CoreResult<usize> {
        let _store = self.handle()?;
        Ok(usize::try_from(self.count.load(Ordering::SeqCst)).unwrap_or(0))
    }

    /// Drops every cached entry; subsequent reads go to the store.
    pub fn invalidate_session_cache(&self) {
        self.cache.clear();
        debug!("session cache invalidated");
    }

    /// Flushes the store and releases it. Idempotent.
    ///
    /// Every later operation fails with [`CoreError::Disposed`].
    pub fn dispose(&self) -> CoreResult<()> {
        let Some(store) = self.store.write().take() else {
            return Ok(());
        };
        self.cache.clear();
        let flushed = store.flush();
        info!(store = %store.name(), "item collection disposed");
        flushed
    }

    /// Returns whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.store.read().is_none()
    }

    /// Writes one item to the store and the cache; returns whether it was new.
    fn write_through(&self, store: &StoreHandle, item: T) -> CoreResult<bool> {
        let _write = self.writes.lock();
        let inserted = store.upsert(&item)?;
        if inserted {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        self.cache.set(item.id(), item);
        Ok(inserted)
    }

    /// Caches a value just read from the store.
    ///
    /// A concurrent remove may have deleted the item between the read and
    /// the insert; the entry is evicted again in that case.
    fn populate(&self, store: &StoreHandle, item: &T) {
        let id = item.id();
        self.cache.populate(id, item.clone());
        if !store.contains(id) {
            self.cache.clear_one(id);
        }
    }

    /// Replaces the live count after a bulk rewrite.
    fn reset_count(&self, count: usize) {
        self.count.store(count as isize, Ordering::SeqCst);
    }
}

impl<T: Item> Drop for ItemCollection<T> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!(error = %err, "failed to flush item collection on drop");
        }
    }
}

impl<T: Item> std::fmt::Debug for ItemCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemCollection")
            .field("store", &*self.store.read())
            .field("cached", &self.cache.len())
            .field("count", &self.count.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::GameItem;
    use std::thread;
    use tempfile::tempdir;

    fn collection() -> ItemCollection<GameItem> {
        ItemCollection::open_in_memory().unwrap()
    }

    #[test]
    fn upsert_then_get() {
        let games = collection();
        let id = ItemId::new();
        games.upsert(GameItem::new(id, "Foo")).unwrap();

        assert_eq!(games.count().unwrap(), 1);
        assert_eq!(games.get(id).unwrap().unwrap().name, "Foo");
    }

    #[test]
    fn get_after_upsert_is_a_cache_hit() {
        let games = collection();
        let id = ItemId::new();
        games.upsert(GameItem::new(id, "Cached")).unwrap();

        let stats = games.stats().unwrap();
        let before = stats.reads();
        games.get(id).unwrap();
        games.get(id).unwrap();
        assert_eq!(stats.reads(), before);
    }

    #[test]
    fn invalidation_forces_one_store_read() {
        let games = collection();
        let id = ItemId::new();
        games.upsert(GameItem::new(id, "Cold")).unwrap();
        games.invalidate_session_cache();

        let stats = games.stats().unwrap();
        let before = stats.reads();
        games.get(id).unwrap();
        games.get(id).unwrap();
        assert_eq!(stats.reads(), before + 1);
    }

    #[test]
    fn update_does_not_change_count() {
        let games = collection();
        let mut item = GameItem::new(ItemId::new(), "v1");
        games.upsert(item.clone()).unwrap();
        item.name = "v2".into();
        games.upsert(item.clone()).unwrap();

        assert_eq!(games.count().unwrap(), 1);
        assert_eq!(games.get(item.id).unwrap().unwrap().name, "v2");
    }

    #[test]
    fn remove_of_absent_item() {
        let games = collection();
        assert!(!games.remove(ItemId::new()).unwrap());
        assert_eq!(games.count().unwrap(), 0);
    }

    #[test]
    fn remove_evicts_and_decrements() {
        let games = collection();
        let id = ItemId::new();
        games.upsert(GameItem::new(id, "Gone")).unwrap();

        assert!(games.remove(id).unwrap());
        assert!(!games.exists(id).unwrap());
        assert!(games.get(id).unwrap().is_none());
        assert_eq!(games.count().unwrap(), 0);
    }

    #[test]
    fn find_populates_cache() {
        let games = collection();
        let ids: Vec<ItemId> = (0..4)
            .map(|i| {
                let id = ItemId::new();
                games.upsert(GameItem::new(id, format!("game {i}"))).unwrap();
                id
            })
            .collect();
        games.invalidate_session_cache();

        let matched = games.find(|g| g.name.ends_with('2')).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(games.find_all().unwrap().len(), 4);

        let stats = games.stats().unwrap();
        let before = stats.reads();
        for id in ids {
            games.get(id).unwrap();
        }
        assert_eq!(stats.reads(), before);
    }

    #[test]
    fn batch_reports_inserts_and_updates() {
        let games = collection();
        let existing = GameItem::new(ItemId::new(), "old");
        games.upsert(existing.clone()).unwrap();

        let report = games
            .upsert_batch(vec![existing, GameItem::new(ItemId::new(), "new")])
            .unwrap();
        assert_eq!(
            report,
            BatchReport {
                inserted: 1,
                updated: 1,
                failed: 0
            }
        );
        assert_eq!(games.count().unwrap(), 2);
    }

    #[test]
    fn count_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("games.db");
        {
            let games: ItemCollection<GameItem> = ItemCollection::open(&path).unwrap();
            for i in 0..3 {
                games.upsert(GameItem::new(ItemId::new(), format!("{i}"))).unwrap();
            }
            games.dispose().unwrap();
        }

        let games: ItemCollection<GameItem> = ItemCollection::open(&path).unwrap();
        assert_eq!(games.count().unwrap(), 3);
        assert_eq!(games.name().unwrap(), "games");
        assert_eq!(games.path().unwrap().as_deref(), Some(path.as_path()));
    }

    #[test]
    fn use_after_dispose_fails() {
        let games = collection();
        games.dispose().unwrap();
        games.dispose().unwrap();

        assert!(games.is_disposed());
        assert!(matches!(games.get(ItemId::new()), Err(CoreError::Disposed)));
        assert!(matches!(
            games.upsert(GameItem::new(ItemId::new(), "late")),
            Err(CoreError::Disposed)
        ));
        assert!(matches!(games.count(), Err(CoreError::Disposed)));
    }

    #[test]
    fn concurrent_upserts_and_removes_keep_count() {
        let games = Arc::new(collection());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let games = Arc::clone(&games);
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = ItemId::new();
                        games.upsert(GameItem::new(id, format!("{i}"))).unwrap();
                        if i % 2 == 0 {
                            games.remove(id).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(games.count().unwrap(), 100);
        assert_eq!(games.find_all().unwrap().len(), 100);
    }

    #[test]
    fn racing_upserts_of_one_id_leave_cache_matching_store() {
        let games = Arc::new(collection());
        let id = ItemId::new();
        for round in 0..20 {
            let handles: Vec<_> = (0..4)
                .map(|writer| {
                    let games = Arc::clone(&games);
                    thread::spawn(move || {
                        let name = format!("round {round} writer {writer}");
                        games.upsert(GameItem::new(id, name)).unwrap();
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let cached = games.get(id).unwrap();
            games.invalidate_session_cache();
            assert_eq!(games.get(id).unwrap(), cached);
        }
        assert_eq!(games.count().unwrap(), 1);
    }
}
