//! Storage layer error types.

use crate::catalog::TableId;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Transaction {tid} aborted: lock wait on page {page_id} timed out")]
    TransactionAborted { tid: TransactionId, page_id: PageId },

    #[error("Buffer pool is full: all {capacity} resident pages are dirty")]
    CacheExhausted { capacity: usize },

    #[error("Page is full: no free slot on page {page_id}")]
    PageFull { page_id: PageId },

    #[error("Page {0} is not resident in the buffer pool")]
    PageNotResident(PageId),

    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error("No such element")]
    NoSuchElement,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog encoding error: {0}")]
    Catalog(#[from] bincode::Error),
}

impl StorageError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        StorageError::InvalidArgument(msg.into())
    }

    /// Whether a transaction driver should abort and retry the work.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::TransactionAborted { .. } | StorageError::CacheExhausted { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
