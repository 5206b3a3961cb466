//! File-level page I/O.

pub mod page_manager;

pub use page_manager::{PageManager, PAGE_SIZE};
