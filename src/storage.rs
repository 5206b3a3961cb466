//! Storage layer for heapdb.
//!
//! Pages are the unit of I/O, caching, and locking:
//!
//! - **PageManager**: Reads and writes fixed 4KB pages of one file by page number
//! - **HeapPage**: Occupancy bitmap followed by fixed-width tuple slots
//! - **BufferPool**: Bounded page cache with LRU no-steal eviction; every page
//!   access goes through it and takes a page lock first
//!
//! Durability follows no-steal/force: dirty pages reach disk only when the
//! transaction that dirtied them commits.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::{BufferPool, PageRef};
pub use disk::{PageManager, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, PageId};
