//! Store and collection configuration.

use itemstore_storage::LockMode;
use std::time::Duration;

/// Number of backups kept by the rotation policy unless configured otherwise.
pub const DEFAULT_BACKUP_RETENTION: usize = 5;

/// How long bulk reconciliation waits for the external authority.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval used while waiting for an authority without a readiness event.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration fixed at store open time.
///
/// The engine has no page cache and no journal. Those are properties of the
/// file format, not options: the session cache is the only read cache, and
/// a crash mid-write is recovered from backups.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// OS lock held on the store file while open.
    pub lock_mode: LockMode,

    /// Whether `flush` also forces data onto durable media.
    pub sync_on_flush: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_mode: LockMode::Shared,
            sync_on_flush: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the OS lock mode.
    #[must_use]
    pub const fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Sets whether flushing also syncs.
    #[must_use]
    pub const fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }
}

/// Configuration for an [`crate::ItemCollection`].
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Store-level settings.
    pub store: StoreConfig,

    /// How many backups the rotation policy keeps.
    pub backup_retention: usize,

    /// Upper bound on waiting for the external authority.
    pub ready_timeout: Duration,

    /// Poll interval for authorities that only expose `is_ready`.
    pub ready_poll_interval: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            backup_retention: DEFAULT_BACKUP_RETENTION,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            ready_poll_interval: READY_POLL_INTERVAL,
        }
    }
}

impl CollectionConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store configuration.
    #[must_use]
    pub const fn store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Sets the backup retention count. Zero makes every backup fail.
    #[must_use]
    pub const fn backup_retention(mut self, keep: usize) -> Self {
        self.backup_retention = keep;
        self
    }

    /// Sets the readiness timeout.
    #[must_use]
    pub const fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Sets the readiness poll interval.
    #[must_use]
    pub const fn ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll_interval = interval;
        self
    }
}
