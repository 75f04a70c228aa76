//! The external record authority.
//!
//! The host application owns the catalog that items mirror. The store only
//! needs two things from it: look a record up by id, and say whether it has
//! finished loading. Authorities that can publish a readiness event use
//! [`ReadinessSignal`] so waiting callers wake immediately instead of polling.

use crate::item::ItemId;
use parking_lot::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// The authority's view of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecord {
    /// Identifier shared with the stored item.
    pub id: ItemId,
    /// Display name owned by the authority.
    pub display_name: String,
}

impl ExternalRecord {
    /// Creates a record.
    pub fn new(id: ItemId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// The system of record that stored items are reconciled against.
pub trait ExternalAuthority: Send + Sync {
    /// Looks up the authority's record for `id`.
    fn lookup(&self, id: ItemId) -> Option<ExternalRecord>;

    /// Whether the authority has finished loading.
    fn is_ready(&self) -> bool;

    /// Blocks until ready or until `timeout` elapses; returns readiness.
    ///
    /// The default polls `is_ready` every `poll_interval`. Implementors
    /// backed by a [`ReadinessSignal`] should override this and wait on it.
    fn wait_ready(&self, timeout: Duration, poll_interval: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(poll_interval.min(deadline - now));
        }
    }
}

/// A one-shot readiness event.
///
/// Once [`set_ready`](Self::set_ready) is called every current and future
/// waiter returns `true`.
#[derive(Debug, Default)]
pub struct ReadinessSignal {
    ready: Mutex<bool>,
    changed: Condvar,
}

impl ReadinessSignal {
    /// Creates a signal in the not-ready state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the authority ready and wakes all waiters.
    pub fn set_ready(&self) {
        *self.ready.lock() = true;
        self.changed.notify_all();
    }

    /// Returns the current state without blocking.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.lock()
    }

    /// Waits up to `timeout` for the signal; returns whether it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.lock();
        if !*ready {
            self.changed
                .wait_while_for(&mut ready, |ready| !*ready, timeout);
        }
        *ready
    }
}
