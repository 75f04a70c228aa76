//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Truncation was asked to grow the storage.
    #[error("cannot truncate to {requested} bytes, storage holds {size}")]
    TruncateBeyondEnd {
        /// The requested new size.
        requested: u64,
        /// The current storage size.
        size: u64,
    },

    /// Another handle holds an incompatible lock on the file.
    #[error("file is locked by another handle: {}", path.display())]
    Locked {
        /// The file that could not be locked.
        path: PathBuf,
    },
}
