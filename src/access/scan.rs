//! Sequential table scans through the buffer pool.

use crate::access::heap::HeapFile;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::concurrency::Permission;
use crate::storage::buffer::{BufferPool, PageRef};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Pull-based tuple producer.
pub trait DbIterator {
    fn open(&mut self) -> StorageResult<()>;

    /// True if `next` would return a tuple. Always false before `open`.
    fn has_next(&mut self) -> StorageResult<bool>;

    /// The next tuple, or `NoSuchElement` when there is none.
    fn next(&mut self) -> StorageResult<Tuple>;

    /// Restarts from the first tuple.
    fn rewind(&mut self) -> StorageResult<()>;

    fn close(&mut self);
}

/// Forward scan over every tuple of one table for one transaction.
///
/// Pages are fetched under Shared permission one at a time as the cursor
/// reaches them. Closing drops the page references but not the locks, which
/// stay with the transaction until it completes.
pub struct HeapScan {
    pool: BufferPool,
    file: Arc<HeapFile>,
    tid: TransactionId,
    opened: bool,
    page_no: u32,
    page: Option<PageRef>,
    slot: usize,
}

impl HeapScan {
    pub fn new(pool: BufferPool, tid: TransactionId, table_id: TableId) -> StorageResult<Self> {
        let file = pool.catalog().heap_file(table_id)?;
        Ok(Self {
            pool,
            file,
            tid,
            opened: false,
            page_no: 0,
            page: None,
            slot: 0,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.file.id()
    }

    fn fetch(&self, page_no: u32) -> StorageResult<Option<PageRef>> {
        if page_no >= self.file.num_pages()? {
            return Ok(None);
        }
        let pid = PageId::new(self.file.id(), page_no);
        self.pool
            .get_page(self.tid, pid, Permission::Shared)
            .map(Some)
    }

    /// Moves the cursor to the next occupied slot at or after the current one.
    fn seek(&mut self) -> StorageResult<bool> {
        while let Some(page) = &self.page {
            let found = {
                let heap_page = page.read();
                (self.slot..heap_page.num_slots()).find(|&slot| heap_page.is_slot_used(slot))
            };
            if let Some(slot) = found {
                self.slot = slot;
                return Ok(true);
            }

            self.page_no += 1;
            self.slot = 0;
            self.page = self.fetch(self.page_no)?;
        }
        Ok(false)
    }
}

impl DbIterator for HeapScan {
    fn open(&mut self) -> StorageResult<()> {
        self.page_no = 0;
        self.slot = 0;
        self.page = self.fetch(0)?;
        self.opened = true;
        Ok(())
    }

    fn has_next(&mut self) -> StorageResult<bool> {
        if !self.opened {
            return Ok(false);
        }
        self.seek()
    }

    fn next(&mut self) -> StorageResult<Tuple> {
        if !self.has_next()? {
            return Err(StorageError::NoSuchElement);
        }
        let tuple = self
            .page
            .as_ref()
            .and_then(|page| page.read().tuple_at(self.slot).cloned())
            .ok_or(StorageError::NoSuchElement)?;
        self.slot += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> StorageResult<()> {
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.page = None;
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::schema::Schema;
    use crate::access::value::{Field, Type};
    use crate::catalog::Catalog;
    use crate::config::BufferPoolConfig;
    use anyhow::Result;
    use tempfile::tempdir;

    fn collect(scan: &mut HeapScan) -> Result<Vec<i32>> {
        let mut values = Vec::new();
        while scan.has_next()? {
            match scan.next()?.field(0) {
                Some(Field::Int(v)) => values.push(*v),
                other => anyhow::bail!("unexpected field {:?}", other),
            }
        }
        Ok(values)
    }

    #[test]
    fn test_scan_empty_table() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Arc::new(Catalog::new());
        let schema = Arc::new(Schema::from_types(&[Type::Int])?);
        let table_id = catalog.create_table("t", &dir.path().join("t.dat"), schema)?;
        let pool = BufferPool::new(catalog, &BufferPoolConfig::default())?;

        let mut scan = HeapScan::new(pool, TransactionId::new(1), table_id)?;
        assert!(!scan.has_next()?);
        scan.open()?;
        assert!(!scan.has_next()?);
        assert!(matches!(scan.next(), Err(StorageError::NoSuchElement)));
        Ok(())
    }

    #[test]
    fn test_scan_skips_holes_and_crosses_pages() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Arc::new(Catalog::new());
        let schema = Arc::new(Schema::from_types(&[Type::Int])?);
        let table_id =
            catalog.create_table("t", &dir.path().join("t.dat"), Arc::clone(&schema))?;
        let pool = BufferPool::new(catalog, &BufferPoolConfig::default())?;
        let tid = TransactionId::new(1);

        // Int-only tuples fit 992 per page; fill past one page.
        let mut inserted = Vec::new();
        for i in 0..1000 {
            let mut tuple = Tuple::from_fields(Arc::clone(&schema), vec![Field::Int(i)])?;
            pool.insert_tuple(tid, table_id, &mut tuple)?;
            inserted.push(tuple);
        }
        pool.delete_tuple(tid, &inserted[1])?;
        pool.delete_tuple(tid, &inserted[995])?;

        let mut scan = HeapScan::new(pool.clone(), tid, table_id)?;
        scan.open()?;
        let values = collect(&mut scan)?;

        let expected: Vec<i32> = (0..1000).filter(|v| *v != 1 && *v != 995).collect();
        assert_eq!(values, expected);

        scan.rewind()?;
        assert_eq!(collect(&mut scan)?, expected);

        scan.close();
        assert!(!scan.has_next()?);
        Ok(())
    }
}
