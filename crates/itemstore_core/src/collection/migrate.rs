//! One-shot import of legacy record files.

use super::ItemCollection;
use crate::error::CoreResult;
use crate::item::Item;
use crate::migration::{self, JsonLegacyReader, LegacyReader, MigrationReport};
use std::path::Path;
use tracing::{debug, info, warn};

impl<T: Item> ItemCollection<T> {
    /// Imports every `*.json` record file in `dir`.
    ///
    /// Safe to run on every startup: a missing or drained directory is a
    /// fast no-op. See [`migrate_with`](Self::migrate_with).
    pub fn migrate_from_json(&self, dir: &Path) -> CoreResult<MigrationReport> {
        self.migrate_with(dir, &JsonLegacyReader)
    }

    /// Imports every legacy record file in `dir` using `reader`.
    ///
    /// All files are parsed first. The parsed items are then upserted in
    /// order, and the source file of every item that was written is deleted.
    /// Files that fail to parse or whose item fails to write stay on disk and
    /// are listed in the report.
    pub fn migrate_with<R>(&self, dir: &Path, reader: &R) -> CoreResult<MigrationReport>
    where
        R: LegacyReader<T> + ?Sized,
    {
        let store = self.handle_exclusive()?;

        let files = migration::legacy_files(dir)?;
        if files.is_empty() {
            debug!(dir = %dir.display(), "no legacy files to migrate");
            return Ok(MigrationReport::default());
        }

        let (parsed, mut failed) = migration::parse_all(files, reader);
        let mut written = Vec::with_capacity(parsed.len());
        for (path, item) in parsed {
            let id = item.id();
            match self.write_through(&store, item) {
                Ok(_) => written.push(path),
                Err(err) => {
                    warn!(id = %id, path = %path.display(), error = %err, "failed to migrate item");
                    failed.push(path);
                }
            }
        }
        store.flush()?;

        let deleted = migration::delete_migrated(&written);
        let report = MigrationReport {
            migrated: written.len(),
            failed,
            deleted,
        };
        info!(
            dir = %dir.display(),
            migrated = report.migrated,
            failed = report.failed.len(),
            deleted = report.deleted,
            "legacy migration finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::item::{GameItem, ItemId};
    use std::fs;
    use tempfile::tempdir;

    struct Rejecting;

    impl LegacyReader<GameItem> for Rejecting {
        fn read(&self, _bytes: &[u8]) -> CoreResult<GameItem> {
            Err(CoreError::decode("unsupported legacy format"))
        }
    }

    #[test]
    fn migrates_and_deletes_sources() {
        let dir = tempdir().unwrap();
        let item: GameItem = GameItem::new(ItemId::new(), "Tunic");
        let file = dir.path().join(format!("{}.json", item.id));
        fs::write(&file, serde_json::to_vec(&item).unwrap()).unwrap();

        let games: ItemCollection<GameItem> = ItemCollection::open_in_memory().unwrap();
        let report = games.migrate_from_json(dir.path()).unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(report.deleted, 1);
        assert!(!file.exists());
        assert_eq!(games.get(item.id).unwrap(), Some(item));
    }

    #[test]
    fn missing_directory_is_a_noop() {
        let dir = tempdir().unwrap();
        let games: ItemCollection<GameItem> = ItemCollection::open_in_memory().unwrap();
        let report = games.migrate_from_json(&dir.path().join("absent")).unwrap();
        assert!(report.is_noop());
    }

    #[test]
    fn custom_reader_failures_keep_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("one.json");
        fs::write(&file, b"{}").unwrap();

        let games: ItemCollection<GameItem> = ItemCollection::open_in_memory().unwrap();
        let report = games.migrate_with(dir.path(), &Rejecting).unwrap();

        assert_eq!(report.migrated, 0);
        assert_eq!(report.failed, vec![file.clone()]);
        assert!(file.exists());
        assert_eq!(games.count().unwrap(), 0);
    }
}
