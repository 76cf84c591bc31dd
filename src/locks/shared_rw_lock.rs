//! `SharedReadWriteLock` (§4.C) — Component C.
//!
//! Permits N concurrent readers OR N concurrent writers, but never both, by
//! arbitrating through two internal [`ReentrantRwLock`]s (`readers`,
//! `writers`) that are each used only in their own shared view. The
//! exclusive view of one is briefly taken as a barrier while test-acquiring
//! the shared view of the other — see [`SharedReadWriteLock::lock_read`]
//! for the exact dance.

use std::thread::yield_now;

use super::ReentrantRwLock;

/// A lock permitting N concurrent readers or N concurrent writers (never
/// both), for tokens whose cardinality is `>= 2` (§2, §4.C).
#[derive(Default)]
pub struct SharedReadWriteLock {
    readers: ReentrantRwLock,
    writers: ReentrantRwLock,
}

impl SharedReadWriteLock {
    /// A freshly unlocked instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the calling thread holds a shared reader slot.
    ///
    /// A thread that already holds the writer side skips the barrier and
    /// takes the reader slot directly (§4.C "reentrant read-while-holding-
    /// write"); `readers` is itself reentrant per thread, so this never
    /// double-counts.
    pub fn lock_read(&self) {
        if self.writers.held_as_reader_by_current_thread() {
            self.readers.lock_read();
            return;
        }
        loop {
            self.writers.lock_write();
            let acquired = self.readers.try_lock_read();
            self.writers.unlock_write().expect("writers barrier released by its own holder");
            if acquired {
                return;
            }
            yield_now();
        }
    }

    /// Attempt to take a shared reader slot without blocking, for a single
    /// barrier-dance attempt only — callers that need to keep trying (a
    /// timed or interruptible acquire) loop around this themselves.
    #[must_use]
    pub fn try_lock_read(&self) -> bool {
        if self.writers.held_as_reader_by_current_thread() {
            return self.readers.try_lock_read();
        }
        if !self.writers.try_lock_write() {
            return false;
        }
        let acquired = self.readers.try_lock_read();
        self.writers.unlock_write().expect("writers barrier released by its own holder");
        acquired
    }

    /// Release one level of the calling thread's reader hold.
    ///
    /// # Errors
    ///
    /// Returns an error if the calling thread does not hold the reader
    /// side.
    pub fn unlock_read(&self) -> crate::error::LockResult<()> {
        self.readers.unlock_read()
    }

    /// Block until the calling thread holds a shared writer slot.
    pub fn lock_write(&self) {
        loop {
            self.readers.lock_write();
            let acquired = self.writers.try_lock_read();
            self.readers.unlock_write().expect("readers barrier released by its own holder");
            if acquired {
                return;
            }
            yield_now();
        }
    }

    /// Attempt to take a shared writer slot without blocking, for a single
    /// barrier-dance attempt only.
    #[must_use]
    pub fn try_lock_write(&self) -> bool {
        if !self.readers.try_lock_write() {
            return false;
        }
        let acquired = self.writers.try_lock_read();
        self.readers.unlock_write().expect("readers barrier released by its own holder");
        acquired
    }

    /// Release one level of the calling thread's writer hold.
    ///
    /// # Errors
    ///
    /// Returns an error if the calling thread does not hold the writer
    /// side.
    pub fn unlock_write(&self) -> crate::error::LockResult<()> {
        self.writers.unlock_read()
    }

    /// Whether any thread currently holds the reader or writer side.
    #[must_use]
    pub fn has_holders(&self) -> bool {
        self.readers.has_holders() || self.writers.has_holders()
    }

    /// Whether any thread is blocked in the barrier-dance spin.
    #[must_use]
    pub fn has_queued_threads(&self) -> bool {
        self.readers.has_queued_threads() || self.writers.has_queued_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn multiple_writers_hold_concurrently() {
        let lock = Arc::new(SharedReadWriteLock::new());
        lock.lock_write();
        let other = Arc::clone(&lock);
        let joined = Arc::new(AtomicUsize::new(0));
        let joined_clone = Arc::clone(&joined);
        let handle = thread::spawn(move || {
            other.lock_write();
            joined_clone.fetch_add(1, Ordering::SeqCst);
            other.unlock_write().unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(joined.load(Ordering::SeqCst), 1);
        lock.unlock_write().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn reader_excludes_writer() {
        let lock = Arc::new(SharedReadWriteLock::new());
        lock.lock_read();
        let other = Arc::clone(&lock);
        let acquired = Arc::new(AtomicUsize::new(0));
        let acquired_clone = Arc::clone(&acquired);
        let handle = thread::spawn(move || {
            other.lock_write();
            acquired_clone.fetch_add(1, Ordering::SeqCst);
            other.unlock_write().unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);
        lock.unlock_read().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn reentrant_write_then_read_same_thread() {
        let lock = SharedReadWriteLock::new();
        lock.lock_write();
        lock.lock_read();
        lock.unlock_read().unwrap();
        lock.unlock_write().unwrap();
        assert!(!lock.has_holders());
    }

    #[test]
    fn try_lock_write_fails_without_blocking_while_a_reader_holds() {
        let lock = SharedReadWriteLock::new();
        lock.lock_read();
        assert!(!lock.try_lock_write());
        assert!(lock.try_lock_read());
        lock.unlock_read().unwrap();
        lock.unlock_read().unwrap();
    }

    #[test]
    fn try_lock_read_succeeds_once_no_writer_holds() {
        let lock = SharedReadWriteLock::new();
        assert!(lock.try_lock_read());
        assert!(!lock.try_lock_write());
        lock.unlock_read().unwrap();
    }
}
