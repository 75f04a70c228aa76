//! Crash simulation.
//!
//! The store does not journal its writes, so the interesting failures are a
//! write cut short (a torn tail) and a write that fails outright. This module
//! produces both:
//!
//! - [`CrashableBackend`] wraps a real backend and fails appends on demand,
//!   optionally persisting a prefix of the failing write
//! - [`tear_tail`] and [`append_garbage`] damage a closed store file directly
//!
//! ## Usage
//!
//! ```rust
//! use itemstore_core::{CollectionConfig, GameItem, ItemCollection, ItemId, StoreHandle};
//! use itemstore_storage::InMemoryBackend;
//! use itemstore_testkit::crash::CrashableBackend;
//!
//! let (backend, switch) = CrashableBackend::new(Box::new(InMemoryBackend::new()));
//! let store = StoreHandle::with_backend(Box::new(backend)).unwrap();
//! let games: ItemCollection<GameItem> =
//!     ItemCollection::from_store(store, CollectionConfig::default());
//!
//! switch.fail_writes(true);
//! assert!(games.upsert(GameItem::new(ItemId::new(), "lost")).is_err());
//! ```

use itemstore_storage::{StorageBackend, StorageError, StorageResult};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct CrashState {
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    fail_writes: AtomicBool,
    crashed: AtomicBool,
}

/// Remote control for a [`CrashableBackend`] that has been moved into a store.
#[derive(Debug, Clone)]
pub struct CrashSwitch {
    state: Arc<CrashState>,
}

impl CrashSwitch {
    /// Crashes once `bytes` more bytes have been appended. The write that
    /// crosses the threshold is persisted only up to it.
    pub fn crash_after(&self, bytes: usize) {
        self.state.bytes_written.store(0, Ordering::SeqCst);
        self.state.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Makes every append fail without writing anything.
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Clears all failure modes.
    pub fn reset(&self) {
        self.state.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.state.bytes_written.store(0, Ordering::SeqCst);
        self.state.fail_writes.store(false, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
    }

    /// Returns whether a simulated crash happened.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    state: Arc<CrashState>,
}

impl CrashableBackend {
    /// Wraps `inner`, returning the backend and its switch.
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, CrashSwitch) {
        let state = Arc::new(CrashState {
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            crashed: AtomicBool::new(false),
        });
        let switch = CrashSwitch {
            state: Arc::clone(&state),
        };
        (Self { inner, state }, switch)
    }

    fn crash(&self, message: &str) -> StorageError {
        self.state.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(self.crash("simulated write failure"));
        }

        let current = self.state.bytes_written.fetch_add(bytes.len(), Ordering::SeqCst);
        let threshold = self.state.crash_after_bytes.load(Ordering::SeqCst);
        if current >= threshold {
            return Err(self.crash("simulated crash during write"));
        }
        if current + bytes.len() > threshold {
            let partial = threshold - current;
            if partial > 0 {
                let _ = self.inner.append(&bytes[..partial]);
            }
            return Err(self.crash("simulated crash during partial write"));
        }

        self.inner.append(bytes)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// Cuts `bytes` off the end of the file at `path`.
pub fn tear_tail(path: &Path, bytes: u64) -> io::Result<()> {
    let len = fs::metadata(path)?.len();
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len.saturating_sub(bytes))?;
    file.sync_all()
}

/// Appends raw bytes to the end of the file at `path`.
pub fn append_garbage(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Flips every bit of the byte at `offset` in the file at `path`.
pub fn flip_byte(path: &Path, offset: usize) -> io::Result<()> {
    let mut data = fs::read(path)?;
    if let Some(byte) = data.get_mut(offset) {
        *byte ^= 0xFF;
    }
    fs::write(path, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemstore_storage::InMemoryBackend;

    #[test]
    fn crash_persists_prefix_only() {
        let (mut backend, switch) = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        backend.append(b"0123").unwrap();

        switch.crash_after(2);
        assert!(backend.append(b"abcd").is_err());
        assert!(switch.has_crashed());
        assert_eq!(backend.size().unwrap(), 6);

        switch.reset();
        backend.append(b"!").unwrap();
        assert_eq!(backend.read_at(0, 7).unwrap(), b"0123ab!");
    }

    #[test]
    fn fail_writes_writes_nothing() {
        let (mut backend, switch) = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        switch.fail_writes(true);
        assert!(backend.append(b"data").is_err());
        assert_eq!(backend.size().unwrap(), 0);
    }
}
