//! Transaction identity and the commit/abort handle.
//!
//! - **TransactionId**: process-unique token keying locks and touched pages
//! - **Transaction**: owns one id and completes it exactly once, aborting on drop

pub mod handle;
pub mod id;

pub use handle::Transaction;
pub use id::{TransactionId, TransactionIdGenerator};
