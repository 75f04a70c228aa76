//! Error types for the item store.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the store, the collection and its maintenance operations.
///
/// Low-level failures are translated into these variants at the boundary of
/// each public operation; callers never see a raw platform error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] itemstore_storage::StorageError),

    /// I/O error outside the store file (backup directory, legacy files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An item could not be encoded for storage.
    #[error("failed to encode item: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// A stored payload could not be decoded into an item.
    #[error("failed to decode item: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },

    /// A legacy JSON record could not be parsed.
    #[error("invalid legacy record: {0}")]
    Json(#[from] serde_json::Error),

    /// The store file is damaged beyond a torn tail.
    #[error("store corruption at offset {offset}: {message}")]
    StoreCorruption {
        /// Byte offset of the damaged frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// The file is not an item store, or has an unsupported version.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A caller passed an argument that can never be valid.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the violated contract.
        message: String,
    },

    /// The backup file to restore from does not exist.
    #[error("backup not found: {}", path.display())]
    BackupNotFound {
        /// The path that was requested.
        path: PathBuf,
    },

    /// The external authority did not become ready in time.
    #[error("external authority not ready after {waited:?}")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The collection has been disposed.
    #[error("collection has been disposed")]
    Disposed,
}

impl CoreError {
    /// Creates a store corruption error.
    pub fn store_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::StoreCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}
