//! # lockcore
//!
//! Reentrant, token-keyed locking for an in-process transactional storage
//! engine: exact locks over opaque [`Token`]s (Component D) and
//! range-scoped locks over typed values (Component F), both backed by
//! reference-counted lock entries (Component B) that self-evict once idle,
//! so a long-lived engine never accumulates one lock per key it has ever
//! touched.

pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod range;
pub mod services;
pub mod telemetry;
pub mod token;
pub mod value;

pub use clock::Clock;
pub use config::LockServiceConfig;
pub use error::{ErrorSeverity, LockError, LockResult};
pub use locks::{NoopLock, ReentrantRwLock, ReferenceCountedLock, SharedReadWriteLock};
pub use range::{Operator, RangeToken};
pub use services::{
    LiveRangeLockHandle, LiveTokenLockHandle, RangeLockHandle, RangeLockService, RangeTokenMap, TokenLockHandle,
    TokenLockService,
};
pub use token::Token;
pub use value::{Endpoint, Interval, Scalar};
