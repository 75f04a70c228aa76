//! # Item Store Testkit
//!
//! Test utilities for the item store.
//!
//! This crate provides:
//! - Temporary collections and legacy-directory helpers
//! - An in-memory external authority stub
//! - Property-based test generators using proptest
//! - A crash-simulating storage backend
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust
//! use itemstore_testkit::prelude::*;
//!
//! let fixture = TestCollection::file();
//! let id = ItemId::new();
//! fixture.upsert(GameItem::new(id, "Foo")).unwrap();
//! assert_eq!(fixture.count().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::init_test_logging;
    pub use itemstore_core::{GameItem, ItemCollection, ItemId, Lifecycle};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::init_test_logging;
