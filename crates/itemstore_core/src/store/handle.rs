//! The embedded store handle.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::item::{decode_item, encode_item, Item, ItemId};
use crate::stats::StoreStats;
use crate::store::record::{ItemFrame, StoreHeader, COLLECTION_NAME, HEADER_PREFIX};
use itemstore_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of scanning one frame during index construction.
enum Scan {
    Frame(ItemFrame),
    TornTail(&'static str),
}

/// Owns one open store file and its `items` collection.
///
/// The file is a header followed by append-only frames. The handle keeps a
/// unique index from [`ItemId`] to the offset of the item's latest frame and
/// nothing else: payloads are read from the backend on every lookup, so the
/// session cache above is the only read cache.
///
/// Physical writes are serialized by the backend lock. Lock order is always
/// backend, then index.
pub struct StoreHandle {
    path: Option<PathBuf>,
    name: String,
    config: StoreConfig,
    backend: RwLock<Box<dyn StorageBackend>>,
    index: RwLock<HashMap<ItemId, u64>>,
    data_start: u64,
    writable: bool,
    stats: Arc<StoreStats>,
}

impl StoreHandle {
    /// Opens the store at `path`, creating an empty one if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is locked, is not an item store, or is
    /// corrupted beyond a torn tail.
    pub fn open(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let backend = FileBackend::open(path, config.lock_mode)?;
        Self::from_backend(
            Box::new(backend),
            Some(path.to_path_buf()),
            store_name(path),
            config,
            true,
        )
    }

    /// Creates a brand-new store file; fails if `path` already exists.
    pub fn create_new(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        if path.exists() {
            return Err(CoreError::invalid_argument(format!(
                "refusing to overwrite existing file {}",
                path.display()
            )));
        }
        Self::open(path, config)
    }

    /// Opens an existing store for reading only, under a shared lock.
    pub fn open_read_only(path: &Path) -> CoreResult<Self> {
        let backend = FileBackend::open_read_only(path)?;
        Self::from_backend(
            Box::new(backend),
            Some(path.to_path_buf()),
            store_name(path),
            StoreConfig::default(),
            false,
        )
    }

    /// Opens an empty store held in memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::with_backend(Box::new(InMemoryBackend::new()))
    }

    /// Opens a store over an arbitrary backend, e.g. a preloaded file image.
    pub fn with_backend(backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        Self::from_backend(
            backend,
            None,
            COLLECTION_NAME.to_string(),
            StoreConfig::default(),
            true,
        )
    }

    fn from_backend(
        mut backend: Box<dyn StorageBackend>,
        path: Option<PathBuf>,
        name: String,
        config: StoreConfig,
        writable: bool,
    ) -> CoreResult<Self> {
        let size = backend.size()?;
        let data_start = if size == 0 {
            if !writable {
                return Err(CoreError::invalid_format("empty file is not an item store"));
            }
            let header = StoreHeader::new().encode();
            backend.append(&header)?;
            backend.flush()?;
            debug!(store = %name, "created new store");
            header.len() as u64
        } else {
            read_header(&*backend, size)?
        };

        let handle = Self {
            path,
            name,
            config,
            backend: RwLock::new(backend),
            index: RwLock::new(HashMap::new()),
            data_start,
            writable,
            stats: Arc::new(StoreStats::new()),
        };
        handle.ensure_index()?;
        Ok(handle)
    }

    /// Builds the unique id index from the file. Idempotent.
    ///
    /// An incomplete trailing frame (a write cut short by a crash) is
    /// truncated away on writable stores and skipped on read-only ones.
    /// Damage anywhere else is reported as [`CoreError::StoreCorruption`].
    ///
    /// Returns the number of live items.
    pub fn ensure_index(&self) -> CoreResult<usize> {
        let mut backend = self.backend.write();
        let size = backend.size()?;
        let mut index = HashMap::new();
        let mut offset = self.data_start;

        while offset < size {
            match scan_frame(&**backend, offset, size)? {
                Scan::Frame(frame) => {
                    let len = frame.encoded_size() as u64;
                    if frame.is_tombstone() {
                        index.remove(&frame.item_id);
                    } else {
                        index.insert(frame.item_id, offset);
                    }
                    offset += len;
                }
                Scan::TornTail(reason) => {
                    warn!(
                        store = %self.name,
                        offset,
                        dropped = size - offset,
                        reason,
                        "discarding torn tail"
                    );
                    if self.writable {
                        backend.truncate(offset)?;
                    }
                    break;
                }
            }
        }

        let live = index.len();
        *self.index.write() = index;
        Ok(live)
    }

    /// Returns the store name used for backup file names.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file path, or `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the store file's extension, if any.
    #[must_use]
    pub fn extension(&self) -> Option<&OsStr> {
        self.path.as_deref().and_then(Path::extension)
    }

    /// Returns the store's round-trip counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<StoreStats> {
        &self.stats
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Looks up an item by id.
    pub fn find_by_id<T: Item>(&self, id: ItemId) -> CoreResult<Option<T>> {
        let backend = self.backend.read();
        let Some(offset) = self.index.read().get(&id).copied() else {
            return Ok(None);
        };

        let frame = self.read_frame(&**backend, offset)?;
        if frame.item_id != id {
            return Err(CoreError::store_corruption(
                offset,
                format!("index points at frame for {}", frame.item_id),
            ));
        }
        decode_item(&frame.payload).map(Some)
    }

    /// Checks the index for `id` without reading the frame.
    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.index.read().contains_key(&id)
    }

    /// Returns every live id, in file order.
    #[must_use]
    pub fn ids(&self) -> Vec<ItemId> {
        let index = self.index.read();
        let mut entries: Vec<_> = index.iter().map(|(id, offset)| (*offset, *id)).collect();
        entries.sort_unstable();
        entries.into_iter().map(|(_, id)| id).collect()
    }

    /// Reads every live frame, in file order.
    pub fn live_frames(&self) -> CoreResult<Vec<ItemFrame>> {
        let backend = self.backend.read();
        let mut offsets: Vec<u64> = self.index.read().values().copied().collect();
        offsets.sort_unstable();
        self.stats.record_scan();

        offsets
            .into_iter()
            .map(|offset| self.read_frame(&**backend, offset))
            .collect()
    }

    /// Decodes every live item.
    pub fn find_all<T: Item>(&self) -> CoreResult<Vec<T>> {
        self.live_frames()?
            .iter()
            .map(|frame| decode_item(&frame.payload))
            .collect()
    }

    /// Decodes every live item and keeps those matching `predicate`.
    pub fn find<T, F>(&self, predicate: F) -> CoreResult<Vec<T>>
    where
        T: Item,
        F: Fn(&T) -> bool,
    {
        let mut matched = Vec::new();
        for frame in self.live_frames()? {
            let item: T = decode_item(&frame.payload)?;
            if predicate(&item) {
                matched.push(item);
            }
        }
        Ok(matched)
    }

    /// Writes `item`; returns `true` if it was inserted, `false` if updated.
    pub fn upsert<T: Item>(&self, item: &T) -> CoreResult<bool> {
        let frame = ItemFrame::put(item.id(), encode_item(item)?);
        let bytes = frame.encode();

        let mut backend = self.backend.write();
        let offset = append_or_rollback(&mut **backend, &bytes)?;
        self.stats.record_write(bytes.len() as u64);
        Ok(self.index.write().insert(frame.item_id, offset).is_none())
    }

    /// Removes `id`; returns whether it existed.
    pub fn delete(&self, id: ItemId) -> CoreResult<bool> {
        let mut backend = self.backend.write();
        if !self.index.read().contains_key(&id) {
            return Ok(false);
        }

        append_or_rollback(&mut **backend, &ItemFrame::tombstone(id).encode())?;
        self.stats.record_delete();
        self.index.write().remove(&id);
        Ok(true)
    }

    /// Number of live items.
    #[must_use]
    pub fn count(&self) -> usize {
        self.index.read().len()
    }

    /// Discards every frame, leaving an empty collection behind the header.
    pub fn drop_and_recreate_collection(&self) -> CoreResult<()> {
        let mut backend = self.backend.write();
        backend.truncate(self.data_start)?;
        self.index.write().clear();
        debug!(store = %self.name, "collection dropped and recreated");
        Ok(())
    }

    /// Bulk-inserts items without checking for existing ids.
    ///
    /// Only safe on a collection known to be empty or disjoint from `items`.
    pub fn insert_many<T: Item>(&self, items: &[T]) -> CoreResult<usize> {
        let frames = items
            .iter()
            .map(|item| Ok(ItemFrame::put(item.id(), encode_item(item)?)))
            .collect::<CoreResult<Vec<_>>>()?;
        self.insert_frames(&frames)
    }

    /// Bulk-appends already-encoded live frames in one write.
    pub fn insert_frames(&self, frames: &[ItemFrame]) -> CoreResult<usize> {
        let mut buf = Vec::with_capacity(frames.iter().map(ItemFrame::encoded_size).sum());
        let mut placed = Vec::with_capacity(frames.len());
        for frame in frames.iter().filter(|f| !f.is_tombstone()) {
            placed.push((frame.item_id, buf.len() as u64));
            frame.encode_into(&mut buf);
            self.stats.record_write(frame.encoded_size() as u64);
        }

        let mut backend = self.backend.write();
        let base = append_or_rollback(&mut **backend, &buf)?;
        let mut index = self.index.write();
        for (id, relative) in &placed {
            index.insert(*id, base + relative);
        }
        Ok(placed.len())
    }

    /// Rewrites the file so it holds only live frames.
    ///
    /// Like every other write this is not journaled: a crash part-way
    /// through loses data that only a backup can restore.
    ///
    /// Returns the number of bytes reclaimed.
    pub fn compact(&self) -> CoreResult<u64> {
        let mut backend = self.backend.write();
        let before = backend.size()?;

        let mut entries: Vec<(u64, ItemId)> = self
            .index
            .read()
            .iter()
            .map(|(id, offset)| (*offset, *id))
            .collect();
        entries.sort_unstable();

        let mut buf = Vec::new();
        let mut placed = Vec::with_capacity(entries.len());
        for (offset, id) in entries {
            let frame = self.read_frame(&**backend, offset)?;
            placed.push((id, self.data_start + buf.len() as u64));
            frame.encode_into(&mut buf);
        }

        backend.truncate(self.data_start)?;
        backend.append(&buf)?;
        *self.index.write() = placed.into_iter().collect();

        let after = backend.size()?;
        debug!(store = %self.name, before, after, "store compacted");
        Ok(before - after)
    }

    /// Flushes pending writes, syncing if configured to.
    pub fn flush(&self) -> CoreResult<()> {
        let mut backend = self.backend.write();
        backend.flush()?;
        if self.config.sync_on_flush {
            backend.sync()?;
        }
        Ok(())
    }

    fn read_frame(&self, backend: &dyn StorageBackend, offset: u64) -> CoreResult<ItemFrame> {
        let len_bytes = backend.read_at(offset, 4)?;
        let len = ItemFrame::declared_len(&len_bytes);
        let data = backend.read_at(offset, len)?;
        self.stats.record_read(len as u64);
        ItemFrame::decode(&data)
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// Appends `bytes`, cutting the file back to its previous size if the write
/// fails part-way so later frames do not land behind a torn one.
fn append_or_rollback(backend: &mut dyn StorageBackend, bytes: &[u8]) -> CoreResult<u64> {
    let size = backend.size()?;
    match backend.append(bytes) {
        Ok(offset) => Ok(offset),
        Err(err) => {
            if let Err(rollback) = backend.truncate(size) {
                warn!(error = %rollback, "failed to roll back partial write");
            }
            Err(err.into())
        }
    }
}

/// Derives the store name (file stem) used in backup file names.
fn store_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| COLLECTION_NAME.to_string())
}

fn read_header(backend: &dyn StorageBackend, size: u64) -> CoreResult<u64> {
    if size < HEADER_PREFIX as u64 {
        return Err(CoreError::invalid_format("file too small for a store header"));
    }
    let prefix = backend.read_at(0, HEADER_PREFIX)?;
    let total = StoreHeader::total_len(&prefix)?;
    if total as u64 > size {
        return Err(CoreError::invalid_format("header truncated"));
    }
    StoreHeader::decode(&backend.read_at(0, total)?)?;
    Ok(total as u64)
}

fn scan_frame(backend: &dyn StorageBackend, offset: u64, size: u64) -> CoreResult<Scan> {
    if size - offset < 4 {
        return Ok(Scan::TornTail("partial length prefix"));
    }
    let len = ItemFrame::declared_len(&backend.read_at(offset, 4)?);
    if len == 0 {
        return Ok(Scan::TornTail("zero-filled tail"));
    }
    if len < ItemFrame::MIN_SIZE {
        return Err(CoreError::store_corruption(
            offset,
            format!("frame length {len} below minimum"),
        ));
    }

    let end = offset + len as u64;
    if end > size {
        return Ok(Scan::TornTail("frame extends past end of file"));
    }

    match ItemFrame::decode(&backend.read_at(offset, len)?) {
        Ok(frame) => Ok(Scan::Frame(frame)),
        Err(_) if end == size => Ok(Scan::TornTail("last frame fails its checksum")),
        Err(err) => Err(CoreError::store_corruption(offset, err.to_string())),
    }
}
