//! Test fixtures and collection helpers.
//!
//! Provides temporary collections, an in-memory external authority and
//! helpers for building legacy record directories.

use itemstore_core::{
    CollectionConfig, ExternalAuthority, ExternalRecord, GameItem, ItemCollection, ItemId,
    ReadinessSignal,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// File name of the store inside a [`TestCollection`]'s directory.
pub const STORE_FILE: &str = "games.db";

/// A collection of [`GameItem`]s living in a temporary directory.
///
/// The directory also hosts backups (`backups/`) and legacy files
/// (`legacy/`), and is removed when the fixture is dropped.
pub struct TestCollection {
    /// The collection instance.
    pub collection: ItemCollection<GameItem>,
    config: CollectionConfig,
    in_memory: bool,
    temp_dir: TempDir,
}

impl TestCollection {
    /// Creates a file-backed collection with default configuration.
    pub fn file() -> Self {
        Self::with_config(CollectionConfig::default())
    }

    /// Creates a file-backed collection.
    pub fn with_config(config: CollectionConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join(STORE_FILE);
        let collection = ItemCollection::open_with_config(&path, config.clone())
            .expect("Failed to open collection");
        Self {
            collection,
            config,
            in_memory: false,
            temp_dir,
        }
    }

    /// Creates an in-memory collection; the directory is still available
    /// for backups and legacy files.
    pub fn memory() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            collection: ItemCollection::open_in_memory()
                .expect("Failed to open in-memory collection"),
            config: CollectionConfig::default(),
            in_memory: true,
            temp_dir,
        }
    }

    /// Returns the temporary directory.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the store file path.
    pub fn store_path(&self) -> PathBuf {
        self.dir().join(STORE_FILE)
    }

    /// Returns the directory used for backups.
    pub fn backup_dir(&self) -> PathBuf {
        self.dir().join("backups")
    }

    /// Returns the directory used for legacy record files, creating it.
    pub fn legacy_dir(&self) -> PathBuf {
        let dir = self.dir().join("legacy");
        fs::create_dir_all(&dir).expect("Failed to create legacy directory");
        dir
    }

    /// Disposes the collection and opens the store file again.
    pub fn reopen(&mut self) {
        assert!(!self.in_memory, "in-memory collections cannot be reopened");
        self.collection.dispose().expect("Failed to dispose collection");
        let path = self.store_path();
        self.collection = ItemCollection::open_with_config(&path, self.config.clone())
            .expect("Failed to reopen collection");
    }
}

impl std::ops::Deref for TestCollection {
    type Target = ItemCollection<GameItem>;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}

/// Runs a test against a temporary file-backed collection.
pub fn with_temp_collection<F, R>(f: F) -> R
where
    F: FnOnce(&TestCollection) -> R,
{
    let fixture = TestCollection::file();
    f(&fixture)
}

/// Creates `count` unconfirmed items named `game 0`, `game 1`, ...
pub fn sample_items(count: usize) -> Vec<GameItem> {
    (0..count)
        .map(|i| GameItem::new(ItemId::new(), format!("game {i}")))
        .collect()
}

/// Writes `item` as a legacy JSON file named after its id.
pub fn write_legacy_item(dir: &Path, item: &GameItem) -> PathBuf {
    let path = dir.join(format!("{}.json", item.id));
    let json = serde_json::to_vec_pretty(item).expect("Failed to serialize legacy item");
    fs::write(&path, json).expect("Failed to write legacy file");
    path
}

/// Writes a legacy file that does not parse.
pub fn write_malformed_legacy(dir: &Path, stem: &str) -> PathBuf {
    let path = dir.join(format!("{stem}.json"));
    fs::write(&path, br#"{"Id": "not-a-uuid", "Name": "#).expect("Failed to write legacy file");
    path
}

/// An external authority backed by a map, with an explicit readiness event.
#[derive(Debug, Default)]
pub struct StaticAuthority {
    records: RwLock<HashMap<ItemId, String>>,
    ready: ReadinessSignal,
}

impl StaticAuthority {
    /// Creates an authority that is already ready and knows `records`.
    pub fn ready(records: &[(ItemId, &str)]) -> Self {
        let authority = Self::not_ready(records);
        authority.set_ready();
        authority
    }

    /// Creates an authority that has not finished loading.
    pub fn not_ready(records: &[(ItemId, &str)]) -> Self {
        let authority = Self::default();
        for (id, name) in records {
            authority.insert(*id, name);
        }
        authority
    }

    /// Adds or renames a record.
    pub fn insert(&self, id: ItemId, display_name: &str) {
        self.records.write().insert(id, display_name.to_string());
    }

    /// Forgets a record.
    pub fn forget(&self, id: ItemId) {
        self.records.write().remove(&id);
    }

    /// Publishes readiness.
    pub fn set_ready(&self) {
        self.ready.set_ready();
    }
}

impl ExternalAuthority for StaticAuthority {
    fn lookup(&self, id: ItemId) -> Option<ExternalRecord> {
        self.records
            .read()
            .get(&id)
            .map(|name| ExternalRecord::new(id, name.clone()))
    }

    fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    fn wait_ready(&self, timeout: Duration, _poll_interval: Duration) -> bool {
        self.ready.wait_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fixture_reopens() {
        let mut fixture = TestCollection::file();
        fixture.upsert(GameItem::new(ItemId::new(), "kept")).unwrap();
        fixture.reopen();
        assert_eq!(fixture.count().unwrap(), 1);
    }

    #[test]
    fn authority_lookup() {
        let id = ItemId::new();
        let authority = StaticAuthority::ready(&[(id, "Celeste")]);
        assert!(authority.is_ready());
        assert_eq!(authority.lookup(id).unwrap().display_name, "Celeste");

        authority.forget(id);
        assert!(authority.lookup(id).is_none());
    }

    #[test]
    fn legacy_files_are_written() {
        let fixture = TestCollection::memory();
        let dir = fixture.legacy_dir();
        let item = sample_items(1).remove(0);

        let path = write_legacy_item(&dir, &item);
        let back: GameItem = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(back, item);
        let bytes = fs::read(write_malformed_legacy(&dir, "bad")).unwrap();
        assert!(serde_json::from_slice::<GameItem>(&bytes).is_err());
    }
}
