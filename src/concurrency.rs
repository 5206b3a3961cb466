//! Concurrency control.
//!
//! Page-granularity shared/exclusive locks held under strict two-phase
//! locking, with timeout-based deadlock breaking.

pub mod lock;

pub use lock::{LockManager, LockState, Permission};
