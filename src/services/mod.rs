//! The two services the surrounding engine talks to (§6 "Service handles").

mod range_lock_service;
mod range_token_map;
mod token_lock_service;

pub use range_lock_service::{LiveRangeLockHandle, RangeLockHandle, RangeLockService};
pub use range_token_map::RangeTokenMap;
pub use token_lock_service::{LiveTokenLockHandle, TokenLockHandle, TokenLockService};
