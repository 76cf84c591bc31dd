//! Runtime configuration for the lock services.
//!
//! There is no CLI or environment surface at this layer (§6) — config is a
//! small `Default`-able struct threaded through constructors, the same shape
//! as the teacher's `CoreConfig`/`with_config` pattern.

use std::time::Duration;

/// Tuning knobs shared by [`crate::services::TokenLockService`] and
/// [`crate::services::RangeLockService`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockServiceConfig {
    /// How long a caller may hold a lock before a single `STALE_LOCK`
    /// warning is logged (§7). This never cancels or times out the holder —
    /// it is a debugging aid only.
    pub stale_lock_warning_threshold: Duration,

    /// Upper bound on how long the spin-yield loop in
    /// [`crate::services::RangeLockService`] goes between
    /// re-`tracing::debug!`-ing that it is still blocked. The loop itself
    /// never gives up (§5 requires unconditional spinning until unblocked);
    /// this only throttles diagnostic noise during a long block.
    pub spin_log_interval: Duration,
}

impl Default for LockServiceConfig {
    fn default() -> Self {
        Self {
            stale_lock_warning_threshold: Duration::from_secs(30),
            spin_log_interval: Duration::from_millis(500),
        }
    }
}
