//! A plain reentrant read/write lock (§4.B, §4.D — the arity-1 case).
//!
//! Unlike `std::sync::RwLock`, a thread already holding the write view may
//! also take the read view (§4.B "Reentrancy is full and per-thread"), and
//! a thread that holds either view any number of times must release it the
//! same number of times before another thread may proceed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;

use crate::error::{LockError, LockResult};

#[derive(Default)]
struct State {
    readers: HashMap<ThreadId, u32>,
    writer: Option<ThreadId>,
    writer_depth: u32,
}

impl State {
    fn can_read(&self, me: ThreadId) -> bool {
        self.writer.is_none() || self.writer == Some(me)
    }

    fn can_write(&self, me: ThreadId) -> bool {
        let writer_ok = self.writer.is_none() || self.writer == Some(me);
        let readers_ok = self.readers.is_empty() || (self.readers.len() == 1 && self.readers.contains_key(&me));
        writer_ok && readers_ok
    }
}

/// Reentrant read/write exclusion for a single [`crate::token::Token`] of
/// cardinality 1.
pub struct ReentrantRwLock {
    state: Mutex<State>,
    condvar: Condvar,
    waiters: AtomicU32,
}

impl Default for ReentrantRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReentrantRwLock {
    /// A freshly unlocked instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            condvar: Condvar::new(),
            waiters: AtomicU32::new(0),
        }
    }

    /// Whether any thread is currently blocked waiting for this lock —
    /// part of the §5/§4.B eviction test ("no queued threads").
    #[must_use]
    pub fn has_queued_threads(&self) -> bool {
        self.waiters.load(AtomicOrdering::Acquire) > 0
    }

    /// Block until the calling thread holds the shared (read) view.
    pub fn lock_read(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock().expect("reentrant lock state mutex poisoned");
        if !state.can_read(me) {
            self.waiters.fetch_add(1, AtomicOrdering::AcqRel);
            while !state.can_read(me) {
                state = self.condvar.wait(state).expect("reentrant lock condvar wait poisoned");
            }
            self.waiters.fetch_sub(1, AtomicOrdering::AcqRel);
        }
        *state.readers.entry(me).or_insert(0) += 1;
    }

    /// Try to take the shared view without blocking.
    #[must_use]
    pub fn try_lock_read(&self) -> bool {
        let me = std::thread::current().id();
        let mut state = self.state.lock().expect("reentrant lock state mutex poisoned");
        if state.can_read(me) {
            *state.readers.entry(me).or_insert(0) += 1;
            true
        } else {
            false
        }
    }

    /// Release one level of the calling thread's shared hold.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::UnmatchedUnlock`] if the calling thread does not
    /// currently hold the read view.
    pub fn unlock_read(&self) -> LockResult<()> {
        let me = std::thread::current().id();
        let mut state = self.state.lock().expect("reentrant lock state mutex poisoned");
        match state.readers.get_mut(&me) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                state.readers.remove(&me);
            }
            None => {
                return Err(LockError::UnmatchedUnlock(format!(
                    "thread {me:?} released a read lock it does not hold"
                )))
            }
        }
        drop(state);
        self.condvar.notify_all();
        Ok(())
    }

    /// Block until the calling thread holds the exclusive (write) view.
    pub fn lock_write(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock().expect("reentrant lock state mutex poisoned");
        if !state.can_write(me) {
            self.waiters.fetch_add(1, AtomicOrdering::AcqRel);
            while !state.can_write(me) {
                state = self.condvar.wait(state).expect("reentrant lock condvar wait poisoned");
            }
            self.waiters.fetch_sub(1, AtomicOrdering::AcqRel);
        }
        state.writer = Some(me);
        state.writer_depth += 1;
    }

    /// Try to take the exclusive view without blocking.
    #[must_use]
    pub fn try_lock_write(&self) -> bool {
        let me = std::thread::current().id();
        let mut state = self.state.lock().expect("reentrant lock state mutex poisoned");
        if state.can_write(me) {
            state.writer = Some(me);
            state.writer_depth += 1;
            true
        } else {
            false
        }
    }

    /// Release one level of the calling thread's exclusive hold.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::UnmatchedUnlock`] if the calling thread does not
    /// currently hold the write view.
    pub fn unlock_write(&self) -> LockResult<()> {
        let me = std::thread::current().id();
        let mut state = self.state.lock().expect("reentrant lock state mutex poisoned");
        if state.writer != Some(me) {
            return Err(LockError::UnmatchedUnlock(format!(
                "thread {me:?} released a write lock it does not hold"
            )));
        }
        state.writer_depth -= 1;
        if state.writer_depth == 0 {
            state.writer = None;
        }
        drop(state);
        self.condvar.notify_all();
        Ok(())
    }

    /// Whether any thread currently holds either view.
    #[must_use]
    pub fn has_holders(&self) -> bool {
        let state = self.state.lock().expect("reentrant lock state mutex poisoned");
        state.writer.is_some() || !state.readers.is_empty()
    }

    /// Whether the calling thread currently holds the exclusive view,
    /// used by [`super::SharedReadWriteLock`] to skip its barrier dance on
    /// reentrant read-while-holding-write (§4.C).
    #[must_use]
    pub fn held_as_writer_by_current_thread(&self) -> bool {
        let me = std::thread::current().id();
        let state = self.state.lock().expect("reentrant lock state mutex poisoned");
        state.writer == Some(me)
    }

    /// Whether the calling thread currently holds the shared view at
    /// least once.
    #[must_use]
    pub fn held_as_reader_by_current_thread(&self) -> bool {
        let me = std::thread::current().id();
        let state = self.state.lock().expect("reentrant lock state mutex poisoned");
        state.readers.contains_key(&me)
    }
}
