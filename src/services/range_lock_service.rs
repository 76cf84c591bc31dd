//! `RangeLockService` (§4.F) — Component F.

use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::Clock;
use crate::config::LockServiceConfig;
use crate::error::LockResult;
use crate::locks::{NoopLock, ReferenceCountedLock};
use crate::range::{ranges, Operator, RangeToken};
use crate::value::{Endpoint, Interval, Scalar};

use super::range_token_map::RangeTokenMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Read,
    Write,
}

struct WriteHolder<V: Scalar> {
    value: Endpoint<V>,
    owner: ThreadId,
    depth: u32,
}

struct Inner<V: Scalar> {
    locks: RangeTokenMap<V, Arc<ReferenceCountedLock>>,
    reads: DashMap<Vec<u8>, Mutex<Vec<Interval<V>>>>,
    writes: DashMap<Vec<u8>, Mutex<Vec<WriteHolder<V>>>>,
    config: LockServiceConfig,
    spin_waiters: AtomicU32,
}

impl<V: Scalar> Inner<V> {
    fn get_or_create_lock(&self, token: &RangeToken<V>) -> Arc<ReferenceCountedLock> {
        let lock = self
            .locks
            .get_or_insert_with(token.clone(), || Arc::new(ReferenceCountedLock::for_cardinality(1)));
        lock.note_lookup();
        lock
    }

    /// `isRangeBlocked` (§4.F). `kind == Read` and `Operator::Equals` /
    /// `Operator::NotEquals` use the literal documented rules verbatim,
    /// including the `NotEquals` case flagged in the design notes as
    /// admitting phantom writes of the excluded value under concurrent
    /// readers — implemented as written, not "fixed".
    fn is_range_blocked(&self, kind: RequestKind, token: &RangeToken<V>) -> bool {
        match kind {
            RequestKind::Read => self.read_blocked(token),
            RequestKind::Write => self.write_blocked(token),
        }
    }

    fn read_blocked(&self, token: &RangeToken<V>) -> bool {
        let Some(writes) = self.writes.get(token.key()) else {
            return false;
        };
        let writes = writes.lock().expect("writes multiset mutex poisoned");
        let value = token.point();
        match token.effective_operator() {
            Operator::Equals => value.is_some_and(|v| writes.iter().any(|w| &w.value == v)),
            Operator::NotEquals => {
                let Some(v) = value else { return false };
                match writes.len() {
                    0 => false,
                    1 => writes[0].value != *v,
                    _ => true,
                }
            }
            other => {
                let me = std::thread::current().id();
                let query = ranges::expand(other, token.values());
                writes.iter().any(|w| {
                    w.owner != me
                        && query
                            .iter()
                            .any(|piece| piece.contains_point(&w.value))
                })
            }
        }
    }

    fn write_blocked(&self, token: &RangeToken<V>) -> bool {
        let Some(reads) = self.reads.get(token.key()) else {
            return false;
        };
        let reads = reads.lock().expect("reads multiset mutex poisoned");
        let Some(value) = token.point() else { return false };
        reads.iter().any(|interval| interval.contains_point(value))
    }

    fn register_read(&self, token: &RangeToken<V>) {
        let pieces = ranges::expand(token.effective_operator(), token.values());
        let mut reads = self
            .reads
            .entry(token.key().to_vec())
            .or_default()
            .lock()
            .expect("reads multiset mutex poisoned");
        reads.extend(pieces);
    }

    fn unregister_read(&self, token: &RangeToken<V>) {
        let pieces = ranges::expand(token.effective_operator(), token.values());
        if let Some(reads) = self.reads.get(token.key()) {
            let mut reads = reads.lock().expect("reads multiset mutex poisoned");
            for piece in &pieces {
                if let Some(pos) = reads.iter().position(|r| r == piece) {
                    reads.remove(pos);
                }
            }
        }
    }

    fn register_write(&self, token: &RangeToken<V>) {
        let Some(value) = token.point().cloned() else { return };
        let me = std::thread::current().id();
        let mut writes = self
            .writes
            .entry(token.key().to_vec())
            .or_default()
            .lock()
            .expect("writes multiset mutex poisoned");
        if let Some(existing) = writes.iter_mut().find(|w| w.value == value) {
            existing.depth += 1;
        } else {
            writes.push(WriteHolder { value, owner: me, depth: 1 });
        }
    }

    fn unregister_write(&self, token: &RangeToken<V>) {
        let Some(value) = token.point() else { return };
        if let Some(writes) = self.writes.get(token.key()) {
            let mut writes = writes.lock().expect("writes multiset mutex poisoned");
            if let Some(pos) = writes.iter().position(|w| &w.value == value) {
                writes[pos].depth -= 1;
                if writes[pos].depth == 0 {
                    writes.remove(pos);
                }
            }
        }
    }

    fn evict_if_idle(&self, token: &RangeToken<V>, lock: &Arc<ReferenceCountedLock>) {
        if lock.is_evictable() {
            self.locks.remove_where(token, |_, candidate| Arc::ptr_eq(candidate, lock), |_, _| {});
        }
    }
}

/// Hands out range-scoped locks keyed by [`RangeToken`] (§2, §4.F).
///
/// Cloning is cheap and shares the same live reads/writes sets — construct
/// one per engine instance (§9).
pub enum RangeLockService<V: Scalar> {
    /// Backed by live reads/writes tracking and per-token locks.
    Live(Arc<Inner<V>>),
    /// All operations are identity no-ops.
    NoOp,
}

impl<V: Scalar> Clone for RangeLockService<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Live(inner) => Self::Live(Arc::clone(inner)),
            Self::NoOp => Self::NoOp,
        }
    }
}

impl<V: Scalar> Default for RangeLockService<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Scalar> RangeLockService<V> {
    /// A fresh, empty live service with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LockServiceConfig::default())
    }

    /// A fresh, empty live service with the given tuning.
    #[must_use]
    pub fn with_config(config: LockServiceConfig) -> Self {
        Self::Live(Arc::new(Inner {
            locks: RangeTokenMap::new(),
            reads: DashMap::new(),
            writes: DashMap::new(),
            config,
            spin_waiters: AtomicU32::new(0),
        }))
    }

    /// A no-op service: every lock it hands out is already satisfied.
    #[must_use]
    pub const fn noop() -> Self {
        Self::NoOp
    }

    /// Acquire a read lock over `operator` applied to `values` scoped to
    /// `key`, blocking while any concurrent write falls inside the
    /// resulting range (§4.F).
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::LockError::InvalidTokenShape`] from
    /// [`RangeToken::for_read`].
    #[tracing::instrument(skip(self, key, values))]
    pub fn get_read_lock(
        &self,
        key: impl Into<Vec<u8>>,
        operator: Operator,
        values: Vec<V>,
    ) -> LockResult<RangeLockHandle<V>> {
        match self {
            Self::Live(inner) => {
                let token = RangeToken::for_read(key, operator, values)?;
                Ok(RangeLockHandle::Live(self.acquire(Arc::clone(inner), token, RequestKind::Read, None)))
            }
            Self::NoOp => {
                let _ = RangeToken::for_read(key, operator, values)?;
                Ok(RangeLockHandle::NoOp(NoopLock))
            }
        }
    }

    /// Acquire a write lock over the point `value` scoped to `key`,
    /// blocking while any concurrent read's range covers that point
    /// (§4.F).
    #[must_use]
    #[tracing::instrument(skip(self, key, value))]
    pub fn get_write_lock(&self, key: impl Into<Vec<u8>>, value: V) -> RangeLockHandle<V> {
        let token = RangeToken::for_write(key, value);
        match self {
            Self::Live(inner) => {
                RangeLockHandle::Live(self.acquire(Arc::clone(inner), token, RequestKind::Write, None))
            }
            Self::NoOp => RangeLockHandle::NoOp(NoopLock),
        }
    }

    /// Like [`RangeLockService::get_read_lock`], but gives up after
    /// `timeout` instead of blocking forever, returning `Ok(None)` on
    /// expiry. No live-set state is modified on a timeout (§5).
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::LockError::InvalidTokenShape`].
    pub fn try_get_read_lock(
        &self,
        key: impl Into<Vec<u8>>,
        operator: Operator,
        values: Vec<V>,
        timeout: Duration,
    ) -> LockResult<Option<RangeLockHandle<V>>> {
        match self {
            Self::Live(inner) => {
                let token = RangeToken::for_read(key, operator, values)?;
                Ok(self
                    .acquire(Arc::clone(inner), token, RequestKind::Read, Some(timeout))
                    .map(RangeLockHandle::Live))
            }
            Self::NoOp => {
                let _ = RangeToken::for_read(key, operator, values)?;
                Ok(Some(RangeLockHandle::NoOp(NoopLock)))
            }
        }
    }

    /// Like [`RangeLockService::get_write_lock`], but gives up after
    /// `timeout` instead of blocking forever, returning `None` on expiry. No
    /// live-set state is modified on a timeout (§5).
    #[must_use]
    #[tracing::instrument(skip(self, key, value))]
    pub fn try_get_write_lock(&self, key: impl Into<Vec<u8>>, value: V, timeout: Duration) -> Option<RangeLockHandle<V>> {
        let token = RangeToken::for_write(key, value);
        match self {
            Self::Live(inner) => self
                .acquire(Arc::clone(inner), token, RequestKind::Write, Some(timeout))
                .map(RangeLockHandle::Live),
            Self::NoOp => Some(RangeLockHandle::NoOp(NoopLock)),
        }
    }

    fn acquire(
        &self,
        inner: Arc<Inner<V>>,
        token: RangeToken<V>,
        kind: RequestKind,
        timeout: Option<Duration>,
    ) -> Option<LiveRangeLockHandle<V>> {
        let lock = inner.get_or_create_lock(&token);
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut last_log = Clock::now();

        inner.spin_waiters.fetch_add(1, AtomicOrdering::AcqRel);
        while inner.is_range_blocked(kind, &token) {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    inner.spin_waiters.fetch_sub(1, AtomicOrdering::AcqRel);
                    lock.note_release();
                    inner.evict_if_idle(&token, &lock);
                    return None;
                }
            }
            std::thread::yield_now();
            if last_log.is_stale(inner.config.spin_log_interval) {
                tracing::debug!(key = ?token.key(), "range lock request still blocked");
                last_log = Clock::now();
            }
        }
        inner.spin_waiters.fetch_sub(1, AtomicOrdering::AcqRel);

        match kind {
            RequestKind::Read => lock.lock_read(),
            RequestKind::Write => lock.lock_write(),
        }
        match kind {
            RequestKind::Read => inner.register_read(&token),
            RequestKind::Write => inner.register_write(&token),
        }

        Some(LiveRangeLockHandle {
            inner,
            token,
            lock,
            kind,
            held_since: Clock::now(),
        })
    }
}

/// A held range lock handle. Release with
/// [`RangeLockHandle::unlock`].
pub enum RangeLockHandle<V: Scalar> {
    /// Backed by a real per-token lock and live-set registration.
    Live(LiveRangeLockHandle<V>),
    /// Always already satisfied.
    NoOp(NoopLock),
}

impl<V: Scalar> RangeLockHandle<V> {
    /// Release this handle.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::LockError::UnmatchedUnlock`].
    pub fn unlock(self) -> LockResult<()> {
        match self {
            Self::Live(handle) => handle.unlock(),
            Self::NoOp(lock) => lock.unlock_read(),
        }
    }
}

/// The live-service half of [`RangeLockHandle`].
pub struct LiveRangeLockHandle<V: Scalar> {
    inner: Arc<Inner<V>>,
    token: RangeToken<V>,
    lock: Arc<ReferenceCountedLock>,
    kind: RequestKind,
    held_since: Clock,
}

impl<V: Scalar> LiveRangeLockHandle<V> {
    fn unlock(self) -> LockResult<()> {
        match self.kind {
            RequestKind::Read => {
                self.lock.unlock_read()?;
                self.inner.unregister_read(&self.token);
            }
            RequestKind::Write => {
                self.lock.unlock_write()?;
                self.inner.unregister_write(&self.token);
            }
        }
        self.lock.note_release();

        if self.held_since.is_stale(self.inner.config.stale_lock_warning_threshold) {
            let held_for_ms = u64::try_from(self.held_since.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(held_for_ms, "STALE_LOCK: range lock held past the configured warning threshold");
        }

        self.inner.evict_if_idle(&self.token, &self.lock);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn s1_write_blocks_on_equals_read_same_value() {
        let service = RangeLockService::<i64>::new();
        let read = service.get_read_lock("age", Operator::Equals, vec![7]).unwrap();
        let svc2 = service.clone();
        let blocked = Arc::new(AtomicBool::new(true));
        let blocked_clone = Arc::clone(&blocked);
        let handle = thread::spawn(move || {
            let write = svc2.get_write_lock("age", 7);
            blocked_clone.store(false, Ordering::SeqCst);
            write.unlock().unwrap();
        });
        thread::sleep(Duration::from_millis(30));
        assert!(blocked.load(Ordering::SeqCst));
        read.unlock().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn s2_less_than_five_does_not_block_write_ten() {
        let service = RangeLockService::<i64>::new();
        let read = service.get_read_lock("age", Operator::LessThan, vec![5]).unwrap();
        let write = service.get_write_lock("age", 10);
        write.unlock().unwrap();
        read.unlock().unwrap();
    }

    #[test]
    fn s3_between_blocks_five_but_not_eight() {
        let service = RangeLockService::<i64>::new();
        let read = service.get_read_lock("age", Operator::Between, vec![3, 8]).unwrap();
        let write_eight = service.get_write_lock("age", 8);
        write_eight.unlock().unwrap();

        let svc2 = service.clone();
        let blocked = Arc::new(AtomicBool::new(true));
        let blocked_clone = Arc::clone(&blocked);
        let handle = thread::spawn(move || {
            let write_five = svc2.get_write_lock("age", 5);
            blocked_clone.store(false, Ordering::SeqCst);
            write_five.unlock().unwrap();
        });
        thread::sleep(Duration::from_millis(30));
        assert!(blocked.load(Ordering::SeqCst));
        read.unlock().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn s5_not_equals_against_sole_matching_writer_is_not_blocked() {
        let service = RangeLockService::<i64>::new();
        let write = service.get_write_lock("age", 6);
        let read = service.get_read_lock("age", Operator::NotEquals, vec![6]).unwrap();
        read.unlock().unwrap();
        write.unlock().unwrap();
    }

    #[test]
    fn try_get_read_lock_times_out_without_leaking_refs() {
        let service = RangeLockService::<i64>::new();
        let write = service.get_write_lock("age", 7);
        let attempt = service
            .try_get_read_lock("age", Operator::Equals, vec![7], Duration::from_millis(20))
            .unwrap();
        assert!(attempt.is_none());
        write.unlock().unwrap();
    }

    #[test]
    fn try_get_write_lock_times_out_without_leaking_refs() {
        let service = RangeLockService::<i64>::new();
        let read = service.get_read_lock("age", Operator::Equals, vec![7]).unwrap();
        let attempt = service.try_get_write_lock("age", 7, Duration::from_millis(20));
        assert!(attempt.is_none());
        read.unlock().unwrap();
    }

    #[test]
    fn try_get_write_lock_succeeds_when_uncontended() {
        let service = RangeLockService::<i64>::new();
        let handle = service
            .try_get_write_lock("age", 7, Duration::from_millis(50))
            .expect("uncontended acquire must succeed");
        handle.unlock().unwrap();
    }
}
