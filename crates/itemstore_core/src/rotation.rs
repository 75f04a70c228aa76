//! Backup naming and rotation.
//!
//! Backups are named `{store}_{YYYYMMDD_HHMMSS}[_NN][.ext]`. The timestamp
//! sorts lexicographically in chronological order, and so does the `_NN`
//! counter used when two backups land in the same second, so "newest first"
//! is simply a descending sort on the file name.

use crate::error::CoreResult;
use chrono::NaiveDateTime;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `YYYYMMDD_HHMMSS`
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;
const MAX_SAME_SECOND: u32 = 99;

/// Builds the backup file name for a store at `at`.
#[must_use]
pub fn backup_file_name(store_name: &str, at: NaiveDateTime, extension: Option<&OsStr>) -> String {
    let mut name = format!("{store_name}_{}", at.format(TIMESTAMP_FORMAT));
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    name
}

/// Picks a path in `dir` for a backup taken at `at` that does not exist yet.
///
/// Returns `None` once every same-second counter is taken.
#[must_use]
pub fn next_backup_path(
    dir: &Path,
    store_name: &str,
    at: NaiveDateTime,
    extension: Option<&OsStr>,
) -> Option<PathBuf> {
    let base = dir.join(backup_file_name(store_name, at, extension));
    if !base.exists() {
        return Some(base);
    }

    let stamp = at.format(TIMESTAMP_FORMAT);
    (1..=MAX_SAME_SECOND)
        .map(|n| {
            let mut name = format!("{store_name}_{stamp}_{n:02}");
            if let Some(ext) = extension {
                name.push('.');
                name.push_str(&ext.to_string_lossy());
            }
            dir.join(name)
        })
        .find(|candidate| !candidate.exists())
}

/// Returns whether `file_name` is a backup of `store_name`.
#[must_use]
pub fn is_backup_name(file_name: &str, store_name: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(store_name)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    let stamp = rest.as_bytes();
    if stamp.len() < TIMESTAMP_LEN
        || !stamp[..TIMESTAMP_LEN]
            .iter()
            .enumerate()
            .all(|(i, b)| if i == 8 { *b == b'_' } else { b.is_ascii_digit() })
    {
        return false;
    }

    // Optional `_NN` counter, then at most one extension. This leaves out
    // `.lock` sidecars of opened backups.
    let tail = &rest[TIMESTAMP_LEN..];
    let tail = match tail.strip_prefix('_') {
        Some(counter)
            if counter.len() >= 2 && counter.as_bytes()[..2].iter().all(u8::is_ascii_digit) =>
        {
            &counter[2..]
        }
        Some(_) => return false,
        None => tail,
    };
    tail.is_empty()
        || tail
            .strip_prefix('.')
            .is_some_and(|ext| !ext.is_empty() && !ext.contains('.'))
}

/// The rotation policy: which of `files` to delete so that only the `keep`
/// newest backups of `store_name` remain.
///
/// Files that are not backups of `store_name` are never selected.
#[must_use]
pub fn select_expired(files: &[PathBuf], store_name: &str, keep: usize) -> Vec<PathBuf> {
    let mut backups: Vec<(&str, &PathBuf)> = files
        .iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            is_backup_name(name, store_name).then_some((name, path))
        })
        .collect();

    backups.sort_unstable_by(|a, b| b.0.cmp(a.0));
    backups
        .into_iter()
        .skip(keep)
        .map(|(_, path)| path.clone())
        .collect()
}

/// Lists backups of `store_name` in `dir`, newest first.
///
/// A missing directory has no backups.
pub fn list_backups(dir: &Path, store_name: &str) -> CoreResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name
            .to_str()
            .is_some_and(|name| is_backup_name(name, store_name))
        {
            backups.push(entry.path());
        }
    }

    backups.sort_unstable_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(backups)
}

/// Deletes all but the `keep` newest backups of `store_name` in `dir`.
///
/// Deletion failures are logged and skipped. Returns the number of files
/// actually deleted.
pub fn rotate(dir: &Path, store_name: &str, keep: usize) -> CoreResult<usize> {
    let files = list_backups(dir, store_name)?;
    let mut deleted = 0;
    for path in select_expired(&files, store_name, keep) {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "expired backup deleted");
                deleted += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to delete expired backup");
            }
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn at(day: u32, secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, secs)
            .unwrap()
    }

    #[test]
    fn file_name_format() {
        let name = backup_file_name("games", at(7, 5), Some(OsStr::new("db")));
        assert_eq!(name, "games_20240307_120005.db");
        assert_eq!(backup_file_name("games", at(7, 5), None), "games_20240307_120005");
    }

    #[test]
    fn recognizes_backup_names() {
        assert!(is_backup_name("games_20240307_120005.db", "games"));
        assert!(is_backup_name("games_20240307_120005_01.db", "games"));
        assert!(!is_backup_name("games.db", "games"));
        assert!(!is_backup_name("games_notes.txt", "games"));
        assert!(!is_backup_name("other_20240307_120005.db", "games"));
        assert!(!is_backup_name("games_old_20240307_120005.db", "games"));
        assert!(is_backup_name("games_20240307_120005", "games"));
        assert!(!is_backup_name("games_20240307_120005.db.lock", "games"));
        assert!(!is_backup_name("games_20240307_120005_x.db", "games"));
    }

    #[test]
    fn keeps_newest() {
        let files: Vec<PathBuf> = (1..=6)
            .map(|day| PathBuf::from(backup_file_name("games", at(day, 0), Some(OsStr::new("db")))))
            .chain([PathBuf::from("games.db"), PathBuf::from("readme.txt")])
            .collect();

        let expired = select_expired(&files, "games", 4);
        assert_eq!(
            expired,
            vec![
                PathBuf::from("games_20240302_120000.db"),
                PathBuf::from("games_20240301_120000.db"),
            ]
        );
        assert!(select_expired(&files, "games", 10).is_empty());
    }

    #[test]
    fn same_second_counter_sorts_after_base() {
        let dir = tempdir().unwrap();
        let ext = Some(OsStr::new("db"));
        let first = next_backup_path(dir.path(), "games", at(1, 0), ext).unwrap();
        fs::write(&first, b"").unwrap();
        let second = next_backup_path(dir.path(), "games", at(1, 0), ext).unwrap();
        fs::write(&second, b"").unwrap();

        assert_eq!(
            second.file_name().unwrap().to_str().unwrap(),
            "games_20240301_120000_01.db"
        );
        let listed = list_backups(dir.path(), "games").unwrap();
        assert_eq!(listed, vec![second, first]);
    }

    #[test]
    fn rotate_deletes_only_expired() {
        let dir = tempdir().unwrap();
        for secs in 0..5 {
            let name = backup_file_name("games", at(1, secs), None);
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::write(dir.path().join("unrelated.txt"), b"").unwrap();

        assert_eq!(rotate(dir.path(), "games", 2).unwrap(), 3);
        let left = list_backups(dir.path(), "games").unwrap();
        assert_eq!(left.len(), 2);
        assert!(left[0].ends_with("games_20240301_120004"));
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn missing_directory_has_no_backups() {
        let dir = tempdir().unwrap();
        assert!(list_backups(&dir.path().join("nope"), "games").unwrap().is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn expired_are_exactly_the_older_ones(
                stamps in proptest::collection::btree_set((1u32..=28, 0u32..60), 0..12),
                keep in 0usize..8,
            ) {
                let files: Vec<PathBuf> = stamps
                    .iter()
                    .map(|&(day, secs)| {
                        PathBuf::from(backup_file_name("games", at(day, secs), Some(OsStr::new("db"))))
                    })
                    .collect();

                let expired = select_expired(&files, "games", keep);
                prop_assert_eq!(expired.len(), files.len().saturating_sub(keep));

                let kept: Vec<_> = files.iter().filter(|f| !expired.contains(f)).collect();
                for old in &expired {
                    prop_assert!(kept.iter().all(|new| new.as_path() > old.as_path()));
                }
            }
        }
    }
}
