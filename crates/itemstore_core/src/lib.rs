//! # Item Store Core
//!
//! An embedded, single-file item store with a session cache on top.
//!
//! This crate provides:
//! - the store file format and [`StoreHandle`] (append-only frames, unique id index)
//! - [`SessionCache`], a process-lifetime read cache
//! - [`ItemCollection`], the cached collection with backup, restore and
//!   legacy migration
//! - reconciliation of stored items against an [`ExternalAuthority`]
//!
//! ## Example
//!
//! ```rust
//! use itemstore_core::{GameItem, ItemCollection, ItemId};
//!
//! let games: ItemCollection<GameItem> = ItemCollection::open_in_memory()?;
//! let id = ItemId::new();
//! games.upsert(GameItem::new(id, "Foo"))?;
//! assert_eq!(games.count()?, 1);
//! assert!(games.remove(id)?);
//! # Ok::<(), itemstore_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod authority;
mod cache;
mod collection;
mod config;
mod error;
mod item;
pub mod migration;
pub mod rotation;
mod stats;
pub mod store;

pub use authority::{ExternalAuthority, ExternalRecord, ReadinessSignal};
pub use cache::SessionCache;
pub use collection::{BatchReport, ItemCollection, ReconcileReport, Reconciled};
pub use config::{
    CollectionConfig, StoreConfig, DEFAULT_BACKUP_RETENTION, DEFAULT_READY_TIMEOUT,
    READY_POLL_INTERVAL,
};
pub use error::{CoreError, CoreResult};
pub use item::{GameItem, Item, ItemId, Lifecycle, NoPayload, TrackedItem};
pub use itemstore_storage::LockMode;
pub use migration::{JsonLegacyReader, LegacyReader, MigrationReport};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::StoreHandle;
