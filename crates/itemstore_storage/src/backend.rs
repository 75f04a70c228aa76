//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store holding one item-store file.
///
/// Backends never interpret what they hold. The item store writes a header
/// followed by append-only record frames and reads them back by offset.
///
/// # Invariants
///
/// - `append` returns the offset where the data starts
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `truncate` only shrinks; it is how a collection is dropped and recreated
/// - Nothing is journaled. A crash between `append` calls can leave a torn
///   tail, which the reader above is responsible for detecting
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// inside the storage, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata onto durable media.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes, which is the next append offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the storage to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `new_size` is
    /// larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
