//! Test logging setup.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// The filter comes from `RUST_LOG`, defaulting to `itemstore_core=debug`.
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("itemstore_core=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .try_init();
}
