//! Lock primitives (§4.B, §4.C, §4.D "No-op variant").

mod noop;
mod reentrant_rw_lock;
mod reference_counted_lock;
mod shared_rw_lock;

pub use noop::NoopLock;
pub use reentrant_rw_lock::ReentrantRwLock;
pub use reference_counted_lock::ReferenceCountedLock;
pub use shared_rw_lock::SharedReadWriteLock;
