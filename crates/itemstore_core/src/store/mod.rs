//! The embedded single-file store.
//!
//! A store is one file: a [`StoreHeader`] followed by append-only
//! [`ItemFrame`]s. [`StoreHandle`] owns the file, its lock and the id index.

mod handle;
mod record;

pub use handle::StoreHandle;
pub use record::{
    compute_crc32, FrameFlags, ItemFrame, StoreHeader, COLLECTION_NAME, FORMAT_VERSION,
    STORE_MAGIC,
};
