//! Backup, restore and compaction.

use super::ItemCollection;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::item::Item;
use crate::rotation;
use crate::store::StoreHandle;
use chrono::{Local, NaiveDateTime};
use itemstore_storage::{LockMode, StorageError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

impl<T: Item> ItemCollection<T> {
    /// Snapshots the collection into `dir`, named after the local time.
    ///
    /// See [`backup_at`](Self::backup_at).
    pub fn backup(&self, dir: &Path) -> CoreResult<PathBuf> {
        self.backup_at(dir, Local::now().naive_local())
    }

    /// Snapshots the collection into a new store file in `dir`.
    ///
    /// The file is named `{store}_{YYYYMMDD_HHMMSS}` plus the live file's
    /// extension, and is itself a complete store that can be opened or
    /// restored. Afterwards only the configured number of newest backups is
    /// kept; failing to delete an old one is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidArgument`] if `dir` is empty or the configured
    /// retention is zero; I/O errors from creating the directory or writing
    /// the snapshot.
    pub fn backup_at(&self, dir: &Path, at: NaiveDateTime) -> CoreResult<PathBuf> {
        if dir.as_os_str().is_empty() {
            return Err(CoreError::invalid_argument(
                "backup directory must not be empty",
            ));
        }
        if self.config.backup_retention == 0 {
            return Err(CoreError::invalid_argument(
                "backup retention must keep at least one backup",
            ));
        }

        let store = self.handle_exclusive()?;
        fs::create_dir_all(dir)?;

        let frames = store.live_frames()?;
        let path = rotation::next_backup_path(dir, store.name(), at, store.extension())
            .ok_or_else(|| {
                CoreError::invalid_argument(format!(
                    "too many backups of {} within one second",
                    store.name()
                ))
            })?;

        let snapshot = StoreHandle::create_new(
            &path,
            StoreConfig::new().lock_mode(LockMode::Exclusive),
        )?;
        snapshot.ensure_index()?;
        if !frames.is_empty() {
            snapshot.insert_frames(&frames)?;
        }
        snapshot.flush()?;
        drop(snapshot);

        info!(path = %path.display(), items = frames.len(), "backup written");

        if let Err(err) = rotation::rotate(dir, store.name(), self.config.backup_retention) {
            warn!(dir = %dir.display(), error = %err, "backup rotation failed");
        }
        Ok(path)
    }

    /// Replaces the collection's contents with those of a backup.
    ///
    /// The backup is read and decoded completely before the live store is
    /// touched, so an unreadable backup leaves the collection as it was. The
    /// replacement itself is not atomic: a crash while it runs can leave the
    /// live store empty or partial.
    ///
    /// Returns the number of restored items.
    ///
    /// # Errors
    ///
    /// [`CoreError::BackupNotFound`] if `path` does not exist.
    pub fn restore(&self, path: &Path) -> CoreResult<usize> {
        let store = self.handle_exclusive()?;

        let backup = match StoreHandle::open_read_only(path) {
            Ok(backup) => backup,
            Err(CoreError::Storage(StorageError::Io(err))) if err.kind() == ErrorKind::NotFound => {
                return Err(CoreError::BackupNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(err) => return Err(err),
        };
        let items: Vec<T> = backup.find_all()?;
        drop(backup);

        store.drop_and_recreate_collection()?;
        store.ensure_index()?;
        self.cache.clear();

        if !items.is_empty() {
            store.insert_many(&items)?;
            for item in &items {
                self.cache.set(item.id(), item.clone());
            }
        }
        store.flush()?;
        self.reset_count(items.len());

        info!(path = %path.display(), items = items.len(), "backup restored");
        Ok(items.len())
    }

    /// Rewrites the store file without superseded and removed records.
    ///
    /// Returns the number of bytes reclaimed.
    pub fn compact(&self) -> CoreResult<u64> {
        let store = self.handle_exclusive()?;
        let reclaimed = store.compact()?;
        store.flush()?;
        info!(store = %store.name(), reclaimed, "store compacted");
        Ok(reclaimed)
    }
}
