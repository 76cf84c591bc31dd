//! `ReferenceCountedLock` (§4.B) — Component B.
//!
//! Wraps either the plain [`ReentrantRwLock`] (arity-1 tokens) or the
//! [`SharedReadWriteLock`] (arity-≥2 tokens) behind one interface, and adds
//! the atomic `refs` counter [`crate::services::TokenLockService`] uses to
//! decide when a map entry is safe to reclaim.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::LockResult;

use super::{ReentrantRwLock, SharedReadWriteLock};

/// The underlying reentrant lock a [`ReferenceCountedLock`] delegates to,
/// chosen at construction from the owning token's cardinality (§3).
enum Inner {
    /// Arity-1: standard reentrant read/write exclusion.
    Plain(ReentrantRwLock),
    /// Arity-≥2: readers-XOR-writers sharing (§4.C).
    Shared(SharedReadWriteLock),
}

impl Inner {
    fn lock_read(&self) {
        match self {
            Self::Plain(lock) => lock.lock_read(),
            Self::Shared(lock) => lock.lock_read(),
        }
    }

    fn try_lock_read(&self) -> bool {
        match self {
            Self::Plain(lock) => lock.try_lock_read(),
            Self::Shared(lock) => lock.try_lock_read(),
        }
    }

    fn unlock_read(&self) -> LockResult<()> {
        match self {
            Self::Plain(lock) => lock.unlock_read(),
            Self::Shared(lock) => lock.unlock_read(),
        }
    }

    fn lock_write(&self) {
        match self {
            Self::Plain(lock) => lock.lock_write(),
            Self::Shared(lock) => lock.lock_write(),
        }
    }

    fn try_lock_write(&self) -> bool {
        match self {
            Self::Plain(lock) => lock.try_lock_write(),
            Self::Shared(lock) => lock.try_lock_write(),
        }
    }

    fn unlock_write(&self) -> LockResult<()> {
        match self {
            Self::Plain(lock) => lock.unlock_write(),
            Self::Shared(lock) => lock.unlock_write(),
        }
    }

    fn has_holders(&self) -> bool {
        match self {
            Self::Plain(lock) => lock.has_holders(),
            Self::Shared(lock) => lock.has_holders(),
        }
    }

    fn has_queued_threads(&self) -> bool {
        match self {
            Self::Plain(lock) => lock.has_queued_threads(),
            Self::Shared(lock) => lock.has_queued_threads(),
        }
    }
}

/// A [`crate::token::Token`]'s map entry: the reentrant lock it hands out,
/// plus the bookkeeping that decides when that entry may be evicted.
pub struct ReferenceCountedLock {
    inner: Inner,
    refs: AtomicU64,
}

impl ReferenceCountedLock {
    /// A fresh, unheld lock sized for `cardinality` (§3 "only arity-≥2
    /// tokens may be held by multiple concurrent writers").
    #[must_use]
    pub fn for_cardinality(cardinality: u32) -> Self {
        let inner = if cardinality >= 2 {
            Inner::Shared(SharedReadWriteLock::new())
        } else {
            Inner::Plain(ReentrantRwLock::new())
        };
        Self {
            inner,
            refs: AtomicU64::new(0),
        }
    }

    /// Record a new lookup before the caller has acquired anything — called
    /// by the service on every `getReadLock`/`getWriteLock` request, before
    /// the blocking acquire, to shrink the eviction race window to zero
    /// (§5 "increment refs strictly before exposing the lock handle").
    pub fn note_lookup(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Undo [`ReferenceCountedLock::note_lookup`] after the caller fully
    /// releases the lock.
    pub fn note_release(&self) {
        self.refs.fetch_sub(1, Ordering::AcqRel);
    }

    /// Block until the calling thread holds the shared (read) view.
    pub fn lock_read(&self) {
        self.inner.lock_read();
    }

    /// Attempt to take the shared (read) view without blocking.
    #[must_use]
    pub fn try_lock_read(&self) -> bool {
        self.inner.try_lock_read()
    }

    /// Release one level of the calling thread's shared hold.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::LockError::UnmatchedUnlock`].
    pub fn unlock_read(&self) -> LockResult<()> {
        self.inner.unlock_read()
    }

    /// Block until the calling thread holds the exclusive (write) view.
    pub fn lock_write(&self) {
        self.inner.lock_write();
    }

    /// Attempt to take the exclusive (write) view without blocking.
    #[must_use]
    pub fn try_lock_write(&self) -> bool {
        self.inner.try_lock_write()
    }

    /// Release one level of the calling thread's exclusive hold.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::LockError::UnmatchedUnlock`].
    pub fn unlock_write(&self) -> LockResult<()> {
        self.inner.unlock_write()
    }

    /// `refs == 0 AND no holders AND no queued threads` (§3, §4.B) — the
    /// exact condition under which the owning service may remove this
    /// entry from its map.
    #[must_use]
    pub fn is_evictable(&self) -> bool {
        self.refs.load(Ordering::Acquire) == 0 && !self.inner.has_holders() && !self.inner.has_queued_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_evictable_while_refs_outstanding() {
        let lock = ReferenceCountedLock::for_cardinality(1);
        lock.note_lookup();
        assert!(!lock.is_evictable());
        lock.note_release();
        assert!(lock.is_evictable());
    }

    #[test]
    fn not_evictable_while_held() {
        let lock = ReferenceCountedLock::for_cardinality(1);
        lock.note_lookup();
        lock.lock_read();
        lock.note_release();
        assert!(!lock.is_evictable());
        lock.unlock_read().unwrap();
        assert!(lock.is_evictable());
    }

    #[test]
    fn cardinality_two_uses_shared_variant() {
        let lock = ReferenceCountedLock::for_cardinality(2);
        lock.lock_write();
        // A second writer must succeed concurrently on the shared variant.
        lock.lock_write();
        lock.unlock_write().unwrap();
        lock.unlock_write().unwrap();
        assert!(lock.is_evictable());
    }

    #[test]
    fn try_lock_write_fails_without_blocking_while_read_held() {
        let lock = ReferenceCountedLock::for_cardinality(1);
        lock.lock_read();
        assert!(!lock.try_lock_write());
        lock.unlock_read().unwrap();
        assert!(lock.try_lock_write());
        lock.unlock_write().unwrap();
    }
}
