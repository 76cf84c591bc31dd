//! Optional `tracing_subscriber` bootstrap for binaries and tests.
//!
//! A library crate must never install a global subscriber on its own, so
//! this is opt-in: call [`init`] from a `main()` or a test harness that
//! wants structured output. The lock services themselves only ever call the
//! `tracing` macros directly (see `services::range_lock_service` and
//! `services::token_lock_service`).

use tracing_subscriber::EnvFilter;

/// Install a process-wide `tracing_subscriber` reading its filter from
/// `RUST_LOG`, falling back to `info` when unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed. Call this at
/// most once per process.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
