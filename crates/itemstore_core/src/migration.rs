//! Import from the legacy one-file-per-record layout.
//!
//! Older versions kept every item as its own `*.json` file in a directory.
//! [`crate::ItemCollection::migrate_from_json`] moves them into the store:
//! every file that parses and is written successfully is then deleted, and
//! every other file is left in place for inspection or a later retry. Once a
//! directory has been drained, running the migration again does nothing, so it
//! can be called on every startup.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extension of legacy record files.
pub const LEGACY_EXTENSION: &str = "json";

/// Deserializes one legacy file into an item.
pub trait LegacyReader<T> {
    /// Parses the complete contents of one legacy file.
    fn read(&self, bytes: &[u8]) -> CoreResult<T>;
}

/// Reads legacy files as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLegacyReader;

impl<T: DeserializeOwned> LegacyReader<T> for JsonLegacyReader {
    fn read(&self, bytes: &[u8]) -> CoreResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Items written to the store.
    pub migrated: usize,
    /// Files left on disk because they could not be read, parsed or written.
    pub failed: Vec<PathBuf>,
    /// Source files removed after their item was written.
    pub deleted: usize,
}

impl MigrationReport {
    /// True when the run found nothing to do.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.migrated == 0 && self.failed.is_empty() && self.deleted == 0
    }
}

/// Lists legacy files in `dir`, sorted by path.
///
/// A missing directory yields an empty list.
pub fn legacy_files(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(LEGACY_EXTENSION))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parses every file, splitting them into parsed items and failures.
pub(crate) fn parse_all<T, R>(files: Vec<PathBuf>, reader: &R) -> (Vec<(PathBuf, T)>, Vec<PathBuf>)
where
    R: LegacyReader<T> + ?Sized,
{
    let mut parsed = Vec::with_capacity(files.len());
    let mut failed = Vec::new();

    for path in files {
        let result = fs::read(&path)
            .map_err(CoreError::from)
            .and_then(|bytes| reader.read(&bytes));
        match result {
            Ok(item) => parsed.push((path, item)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable legacy file");
                failed.push(path);
            }
        }
    }
    (parsed, failed)
}

/// Deletes migrated source files; returns how many were removed.
pub(crate) fn delete_migrated(files: &[PathBuf]) -> usize {
    files
        .iter()
        .filter(|path| match fs::remove_file(path) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to delete migrated legacy file");
                false
            }
        })
        .count()
}
