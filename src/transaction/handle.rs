use crate::access::scan::HeapScan;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageResult;
use crate::transaction::id::{TransactionId, TransactionIdGenerator};

/// A handle to a running transaction that aborts on drop if still active.
pub struct Transaction {
    id: TransactionId,
    pool: BufferPool,
    completed: bool,
}

impl Transaction {
    /// Starts a transaction with a fresh id from `ids`.
    pub fn begin(pool: BufferPool, ids: &TransactionIdGenerator) -> Self {
        Self {
            id: ids.next(),
            pool,
            completed: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn insert_tuple(&self, table_id: TableId, tuple: &mut Tuple) -> StorageResult<()> {
        self.pool.insert_tuple(self.id, table_id, tuple)
    }

    pub fn delete_tuple(&self, tuple: &Tuple) -> StorageResult<()> {
        self.pool.delete_tuple(self.id, tuple)
    }

    /// A sequential scan over `table_id` under this transaction.
    pub fn scan(&self, table_id: TableId) -> StorageResult<HeapScan> {
        HeapScan::new(self.pool.clone(), self.id, table_id)
    }

    /// Commits the transaction. If the flush fails the handle is dropped
    /// uncompleted, which aborts it.
    pub fn commit(mut self) -> StorageResult<()> {
        self.pool.complete_transaction(self.id, true)?;
        self.completed = true;
        Ok(())
    }

    pub fn abort(mut self) -> StorageResult<()> {
        self.completed = true;
        self.pool.complete_transaction(self.id, false)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.completed {
            // Best effort abort - ignore errors
            let _ = self.pool.complete_transaction(self.id, false);
        }
    }
}
