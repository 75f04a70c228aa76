//! # Item Store Storage
//!
//! Byte-level backends underneath the item store.
//!
//! A backend is an **opaque byte store**: it appends, reads at offsets,
//! truncates and flushes. It knows nothing about record frames, headers
//! or items; `itemstore_core` owns the file format.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - a single on-disk file, optionally guarded by an OS lock
//! - [`InMemoryBackend`] - ephemeral storage for tests
//!
//! ## Example
//!
//! ```rust
//! use itemstore_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{lock_file_path, FileBackend, LockMode};
pub use memory::InMemoryBackend;
