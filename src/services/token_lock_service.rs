//! `TokenLockService` (§4.D) — Component D.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::LockServiceConfig;
use crate::error::{LockError, LockResult};
use crate::locks::{NoopLock, ReferenceCountedLock};
use crate::clock::Clock;
use crate::token::Token;

#[derive(Clone, Copy)]
enum LockKind {
    Read,
    Write,
}

struct Inner {
    map: DashMap<Token, Arc<ReferenceCountedLock>>,
    config: LockServiceConfig,
}

impl Inner {
    /// Get-or-create is atomic because `DashMap::entry` locks the owning
    /// shard for the duration of `or_insert_with` (§4.D "the get-or-create
    /// MUST be atomic"). `note_lookup` runs while that shard lock is still
    /// held implicitly by the `Ref` returned from `entry`, which closes the
    /// §5 eviction race window for any caller that acquires immediately
    /// after lookup, per the Open Question decision in the design notes.
    fn get_or_create(&self, token: &Token) -> Arc<ReferenceCountedLock> {
        let entry = self
            .map
            .entry(token.clone())
            .or_insert_with(|| Arc::new(ReferenceCountedLock::for_cardinality(token.cardinality())));
        entry.note_lookup();
        Arc::clone(&entry)
    }

    fn evict_if_idle(&self, token: &Token, lock: &Arc<ReferenceCountedLock>) {
        if lock.is_evictable() {
            self.map.remove_if(token, |_, candidate| Arc::ptr_eq(candidate, lock));
        }
    }

    fn try_lock(lock: &ReferenceCountedLock, kind: LockKind) -> bool {
        match kind {
            LockKind::Read => lock.try_lock_read(),
            LockKind::Write => lock.try_lock_write(),
        }
    }

    /// Bounded-wait acquire (§4.D): spins on the non-blocking try-acquire
    /// until either it succeeds or `deadline` passes, never leaking the
    /// `refs` counter on expiry (§5).
    fn acquire_bounded(&self, token: &Token, kind: LockKind, deadline: Instant) -> Option<Arc<ReferenceCountedLock>> {
        let lock = self.get_or_create(token);
        loop {
            if Self::try_lock(&lock, kind) {
                return Some(lock);
            }
            if Instant::now() >= deadline {
                lock.note_release();
                self.evict_if_idle(token, &lock);
                return None;
            }
            std::thread::yield_now();
        }
    }

    /// Interruptible acquire (§4.D): spins on the non-blocking try-acquire
    /// until either it succeeds or `cancel` is observed set, never leaking
    /// the `refs` counter on cancellation (§5). Rust has no native thread
    /// interrupt signal, so `cancel` plays that role explicitly.
    fn acquire_interruptible(
        &self,
        token: &Token,
        kind: LockKind,
        cancel: &AtomicBool,
    ) -> LockResult<Arc<ReferenceCountedLock>> {
        let lock = self.get_or_create(token);
        loop {
            if Self::try_lock(&lock, kind) {
                return Ok(lock);
            }
            if cancel.load(Ordering::Acquire) {
                lock.note_release();
                self.evict_if_idle(token, &lock);
                return Err(LockError::Interrupted);
            }
            std::thread::yield_now();
        }
    }
}

/// Hands out reentrant shared/exclusive locks keyed by [`Token`] (§2, §4.D).
///
/// Cloning a `TokenLockService` is cheap and shares the same underlying map
/// — construct one per engine instance (§9 "not singletons").
#[derive(Clone)]
pub enum TokenLockService {
    /// Backed by a live concurrent map.
    Live(Arc<Inner>),
    /// All operations are identity no-ops (§4.D "no-op variant").
    NoOp,
}

impl Default for TokenLockService {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenLockService {
    /// A fresh, empty live service with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LockServiceConfig::default())
    }

    /// A fresh, empty live service with the given tuning.
    #[must_use]
    pub fn with_config(config: LockServiceConfig) -> Self {
        Self::Live(Arc::new(Inner {
            map: DashMap::new(),
            config,
        }))
    }

    /// A no-op service: every lock it hands out is already satisfied.
    #[must_use]
    pub const fn noop() -> Self {
        Self::NoOp
    }

    /// Acquire the shared (read) view for `token`, blocking if another
    /// thread holds the exclusive view.
    #[must_use]
    #[tracing::instrument(skip(self))]
    pub fn get_read_lock(&self, token: &Token) -> TokenLockHandle {
        match self {
            Self::Live(inner) => {
                let lock = inner.get_or_create(token);
                lock.lock_read();
                TokenLockHandle::Live(LiveTokenLockHandle::new(Arc::clone(inner), token.clone(), lock, LockKind::Read))
            }
            Self::NoOp => TokenLockHandle::NoOp(NoopLock),
        }
    }

    /// Acquire the exclusive (write) view for `token`, blocking if another
    /// thread holds either view (unless `token`'s cardinality allows
    /// concurrent writers, §4.C).
    #[must_use]
    #[tracing::instrument(skip(self))]
    pub fn get_write_lock(&self, token: &Token) -> TokenLockHandle {
        match self {
            Self::Live(inner) => {
                let lock = inner.get_or_create(token);
                lock.lock_write();
                TokenLockHandle::Live(LiveTokenLockHandle::new(
                    Arc::clone(inner),
                    token.clone(),
                    lock,
                    LockKind::Write,
                ))
            }
            Self::NoOp => TokenLockHandle::NoOp(NoopLock),
        }
    }

    /// Like [`TokenLockService::get_read_lock`], but gives up after
    /// `timeout` instead of blocking forever, returning `None` on expiry.
    /// No `refs` state is leaked on a timeout (§5).
    #[must_use]
    #[tracing::instrument(skip(self))]
    pub fn try_get_read_lock(&self, token: &Token, timeout: Duration) -> Option<TokenLockHandle> {
        match self {
            Self::Live(inner) => {
                let deadline = Instant::now() + timeout;
                let lock = inner.acquire_bounded(token, LockKind::Read, deadline)?;
                Some(TokenLockHandle::Live(LiveTokenLockHandle::new(
                    Arc::clone(inner),
                    token.clone(),
                    lock,
                    LockKind::Read,
                )))
            }
            Self::NoOp => Some(TokenLockHandle::NoOp(NoopLock)),
        }
    }

    /// Like [`TokenLockService::get_write_lock`], but gives up after
    /// `timeout` instead of blocking forever, returning `None` on expiry.
    /// No `refs` state is leaked on a timeout (§5).
    #[must_use]
    #[tracing::instrument(skip(self))]
    pub fn try_get_write_lock(&self, token: &Token, timeout: Duration) -> Option<TokenLockHandle> {
        match self {
            Self::Live(inner) => {
                let deadline = Instant::now() + timeout;
                let lock = inner.acquire_bounded(token, LockKind::Write, deadline)?;
                Some(TokenLockHandle::Live(LiveTokenLockHandle::new(
                    Arc::clone(inner),
                    token.clone(),
                    lock,
                    LockKind::Write,
                )))
            }
            Self::NoOp => Some(TokenLockHandle::NoOp(NoopLock)),
        }
    }

    /// Like [`TokenLockService::get_read_lock`], but aborts with
    /// [`crate::error::LockError::Interrupted`] as soon as `cancel` is
    /// observed set, instead of blocking forever. `cancel` stands in for the
    /// host thread's interrupt flag (§4.D `lockInterruptibly`); no `refs`
    /// state is leaked if cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LockError::Interrupted`] if `cancel` is set
    /// before the lock becomes available.
    #[tracing::instrument(skip(self, cancel))]
    pub fn get_read_lock_interruptible(&self, token: &Token, cancel: &AtomicBool) -> LockResult<TokenLockHandle> {
        match self {
            Self::Live(inner) => {
                let lock = inner.acquire_interruptible(token, LockKind::Read, cancel)?;
                Ok(TokenLockHandle::Live(LiveTokenLockHandle::new(
                    Arc::clone(inner),
                    token.clone(),
                    lock,
                    LockKind::Read,
                )))
            }
            Self::NoOp => Ok(TokenLockHandle::NoOp(NoopLock)),
        }
    }

    /// Like [`TokenLockService::get_write_lock`], but aborts with
    /// [`crate::error::LockError::Interrupted`] as soon as `cancel` is
    /// observed set, instead of blocking forever.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LockError::Interrupted`] if `cancel` is set
    /// before the lock becomes available.
    #[tracing::instrument(skip(self, cancel))]
    pub fn get_write_lock_interruptible(&self, token: &Token, cancel: &AtomicBool) -> LockResult<TokenLockHandle> {
        match self {
            Self::Live(inner) => {
                let lock = inner.acquire_interruptible(token, LockKind::Write, cancel)?;
                Ok(TokenLockHandle::Live(LiveTokenLockHandle::new(
                    Arc::clone(inner),
                    token.clone(),
                    lock,
                    LockKind::Write,
                )))
            }
            Self::NoOp => Ok(TokenLockHandle::NoOp(NoopLock)),
        }
    }

    /// Number of live map entries, exposed for tests and diagnostics only.
    #[must_use]
    pub fn live_entry_count(&self) -> usize {
        match self {
            Self::Live(inner) => inner.map.len(),
            Self::NoOp => 0,
        }
    }
}

/// A held lock handle returned by [`TokenLockService`]. Unlock by calling
/// [`TokenLockHandle::unlock`]; dropping without unlocking is a programmer
/// error the same as forgetting to call `unlock()` on a platform monitor.
pub enum TokenLockHandle {
    /// Backed by a real [`ReferenceCountedLock`].
    Live(LiveTokenLockHandle),
    /// Always already satisfied.
    NoOp(NoopLock),
}

impl TokenLockHandle {
    /// Release this handle.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::LockError::UnmatchedUnlock`] if the
    /// underlying monitor reports a mismatched release (should not happen
    /// through this API, since the handle always matches its own acquire).
    pub fn unlock(self) -> LockResult<()> {
        match self {
            Self::Live(handle) => handle.unlock(),
            Self::NoOp(lock) => lock.unlock_read(),
        }
    }
}

/// The live-service half of [`TokenLockHandle`].
pub struct LiveTokenLockHandle {
    service: Arc<Inner>,
    token: Token,
    lock: Arc<ReferenceCountedLock>,
    kind: LockKind,
    held_since: Clock,
}

impl LiveTokenLockHandle {
    fn new(service: Arc<Inner>, token: Token, lock: Arc<ReferenceCountedLock>, kind: LockKind) -> Self {
        Self {
            service,
            token,
            lock,
            kind,
            held_since: Clock::now(),
        }
    }

    fn unlock(self) -> LockResult<()> {
        match self.kind {
            LockKind::Read => self.lock.unlock_read()?,
            LockKind::Write => self.lock.unlock_write()?,
        }
        self.lock.note_release();

        if self.held_since.is_stale(self.service.config.stale_lock_warning_threshold) {
            let held_for_ms = u64::try_from(self.held_since.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(held_for_ms, "STALE_LOCK: token lock held past the configured warning threshold");
        }

        self.service.evict_if_idle(&self.token, &self.lock);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_token_returns_same_underlying_lock_uncontended() {
        let service = TokenLockService::new();
        let token = Token::new(["orders", "42"], 1);
        let a = service.get_read_lock(&token);
        a.unlock().unwrap();
        let b = service.get_read_lock(&token);
        b.unlock().unwrap();
        assert_eq!(service.live_entry_count(), 0);
    }

    #[test]
    fn entry_is_evicted_after_full_release() {
        let service = TokenLockService::new();
        let token = Token::new(["orders", "42"], 1);
        let handle = service.get_write_lock(&token);
        assert_eq!(service.live_entry_count(), 1);
        handle.unlock().unwrap();
        assert_eq!(service.live_entry_count(), 0);
    }

    #[test]
    fn noop_service_never_tracks_entries() {
        let service = TokenLockService::noop();
        let token = Token::new(["orders", "42"], 1);
        let handle = service.get_write_lock(&token);
        assert_eq!(service.live_entry_count(), 0);
        handle.unlock().unwrap();
    }

    #[test]
    fn cardinality_two_token_allows_concurrent_writers() {
        let service = TokenLockService::new();
        let token = Token::new(["record=42", "field=x"], 2);
        let a = service.get_write_lock(&token);
        let b = service.get_write_lock(&token);
        a.unlock().unwrap();
        b.unlock().unwrap();
        assert_eq!(service.live_entry_count(), 0);
    }

    #[test]
    fn try_get_write_lock_times_out_without_leaking_refs() {
        let service = TokenLockService::new();
        let token = Token::new(["orders", "42"], 1);
        let held = service.get_read_lock(&token);
        let attempt = service.try_get_write_lock(&token, std::time::Duration::from_millis(20));
        assert!(attempt.is_none());
        held.unlock().unwrap();
        assert_eq!(service.live_entry_count(), 0);
    }

    #[test]
    fn try_get_read_lock_succeeds_when_uncontended() {
        let service = TokenLockService::new();
        let token = Token::new(["orders", "42"], 1);
        let handle = service
            .try_get_read_lock(&token, std::time::Duration::from_millis(50))
            .expect("uncontended acquire must succeed");
        handle.unlock().unwrap();
        assert_eq!(service.live_entry_count(), 0);
    }

    #[test]
    fn get_write_lock_interruptible_aborts_without_leaking_refs() {
        use std::sync::atomic::AtomicBool;

        let service = TokenLockService::new();
        let token = Token::new(["orders", "42"], 1);
        let held = service.get_read_lock(&token);
        let cancel = AtomicBool::new(true);
        let err = service
            .get_write_lock_interruptible(&token, &cancel)
            .expect_err("cancel flag already set must abort immediately");
        assert!(matches!(err, crate::error::LockError::Interrupted));
        held.unlock().unwrap();
        assert_eq!(service.live_entry_count(), 0);
    }

    #[test]
    fn get_read_lock_interruptible_succeeds_when_uncontended() {
        use std::sync::atomic::AtomicBool;

        let service = TokenLockService::new();
        let token = Token::new(["orders", "42"], 1);
        let cancel = AtomicBool::new(false);
        let handle = service
            .get_read_lock_interruptible(&token, &cancel)
            .expect("uncontended acquire must succeed");
        handle.unlock().unwrap();
        assert_eq!(service.live_entry_count(), 0);
    }
}
