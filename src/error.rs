//! # Lock Core Error Types
//!
//! Error kinds for token and range locking (§7): no recovery and no retries
//! happen inside this crate — callers decide what to do with each kind.

use thiserror::Error;

/// Result type alias for lock-core operations.
pub type LockResult<T> = Result<T, LockError>;

/// Error kinds raised by [`crate::token`], [`crate::range`], [`crate::locks`]
/// and [`crate::services`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Wrong arity for the requested operator (e.g. `BETWEEN` with one value).
    #[error("invalid token shape: {0}")]
    InvalidTokenShape(String),

    /// Unknown or unsupported operator for the requested lock type.
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// `lock_interruptibly` observed the calling thread's interrupt flag.
    #[error("lock acquisition interrupted")]
    Interrupted,

    /// `try_lock(timeout)` expired before the lock became available.
    #[error("lock acquisition timed out")]
    Timeout,

    /// `unlock()` called without a matching prior acquire on this thread.
    #[error("unlock called without a matching acquire: {0}")]
    UnmatchedUnlock(String),
}

impl LockError {
    /// Whether a caller can reasonably retry the operation that raised this
    /// error, without inspecting the variant by name.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Interrupted)
    }

    /// Coarse severity, used only to pick a `tracing` level when a caller
    /// chooses to log the error; this crate itself never logs routine lock
    /// errors (§7).
    #[must_use]
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout | Self::Interrupted => ErrorSeverity::Low,
            Self::InvalidTokenShape(_) | Self::InvalidOperator(_) | Self::UnmatchedUnlock(_) => {
                ErrorSeverity::High
            }
        }
    }
}

/// Severity classification for a [`LockError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Expected under normal contention; no action needed beyond retry/abort.
    Low,
    /// Indicates a programmer error (bad shape, unmatched unlock).
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_interrupted_are_recoverable() {
        assert!(LockError::Timeout.is_recoverable());
        assert!(LockError::Interrupted.is_recoverable());
    }

    #[test]
    fn shape_errors_are_not_recoverable() {
        assert!(!LockError::InvalidTokenShape("BETWEEN needs 2 values".into()).is_recoverable());
        assert!(!LockError::InvalidOperator("REGEX on a write".into()).is_recoverable());
    }

    #[test]
    fn severity_matches_classification() {
        assert_eq!(LockError::Timeout.severity(), ErrorSeverity::Low);
        assert_eq!(
            LockError::UnmatchedUnlock("thread 7".into()).severity(),
            ErrorSeverity::High
        );
    }
}
