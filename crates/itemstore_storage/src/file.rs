//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// OS advisory lock taken on the store file while it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Shared lock. Read-only tools holding a shared lock may open the file
    /// at the same time; an exclusive locker is refused. A writable open also
    /// takes an exclusive lock on the `{file}.lock` sidecar, so a second
    /// writer is refused too.
    #[default]
    Shared,
    /// Exclusive lock. Any other locker is refused.
    Exclusive,
    /// No lock at all.
    None,
}

/// A single-file storage backend.
///
/// # Durability
///
/// - `flush()` hands buffered data to the OS
/// - `sync()` calls `File::sync_all()`
///
/// Appends are not journaled. At most one writable backend is open on a
/// file at a time unless [`LockMode::None`] is used. Locks are released when
/// the backend is dropped; the sidecar lock file is left in place.
///
/// # Example
///
/// ```no_run
/// use itemstore_storage::{FileBackend, LockMode, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("items.db"), LockMode::Shared).unwrap();
/// backend.append(b"frame").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    /// Held only for its lock.
    _writer_lock: Option<File>,
    size: u64,
    read_only: bool,
}

impl FileBackend {
    /// Opens or creates the file at `path`, taking the requested lock.
    ///
    /// Parent directories are created when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if the lock is held elsewhere, or an
    /// I/O error if the file cannot be opened.
    pub fn open(path: &Path, lock: LockMode) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Self::with_lock(path, file, lock, false)
    }

    /// Opens an existing file for reading only.
    ///
    /// Always takes a shared lock so a concurrent exclusive writer is
    /// detected. Appends and truncation fail on the returned backend.
    ///
    /// # Errors
    ///
    /// Returns an I/O error (kind `NotFound` if the file does not exist) or
    /// [`StorageError::Locked`].
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::with_lock(path, file, LockMode::Shared, true)
    }

    fn with_lock(path: &Path, file: File, lock: LockMode, read_only: bool) -> StorageResult<Self> {
        let locked = |acquired: std::io::Result<()>| {
            acquired.map_err(|_| StorageError::Locked {
                path: path.to_path_buf(),
            })
        };

        let writer_lock = match (lock, read_only) {
            (LockMode::Shared, false) => {
                let sidecar = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(lock_file_path(path))?;
                locked(FileExt::try_lock_exclusive(&sidecar))?;
                Some(sidecar)
            }
            _ => None,
        };

        match lock {
            LockMode::Shared => locked(FileExt::try_lock_shared(&file))?,
            LockMode::Exclusive => locked(FileExt::try_lock_exclusive(&file))?,
            LockMode::None => {}
        }

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            _writer_lock: writer_lock,
            size,
            read_only,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} was opened read-only", self.path.display()),
            )));
        }
        Ok(())
    }
}

/// Path of the sidecar file writers lock in [`LockMode::Shared`].
#[must_use]
pub fn lock_file_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.ensure_writable()?;
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if !self.read_only {
            self.file.get_mut().flush()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if !self.read_only {
            self.file.get_mut().sync_all()?;
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.ensure_writable()?;
        if new_size > self.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: self.size,
            });
        }

        self.file.get_mut().set_len(new_size)?;
        self.size = new_size;
        Ok(())
    }
}
