use crate::access::schema::Schema;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::concurrency::Permission;
use crate::storage::buffer::{BufferPool, PageRef};
use crate::storage::disk::{PageManager, PAGE_SIZE};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An unordered collection of tuples stored in fixed-slot pages of one file.
///
/// Page reads and writes go straight to disk; tuple inserts and deletes fetch
/// their pages through the buffer pool so they are locked and cached.
pub struct HeapFile {
    table_id: TableId,
    schema: Arc<Schema>,
    page_manager: Mutex<PageManager>,
    /// Serializes file growth so two appenders never pick the same page number.
    append_latch: Mutex<()>,
}

impl HeapFile {
    /// Opens the heap file at `path`, creating an empty one if needed.
    pub fn open(table_id: TableId, path: &Path, schema: Arc<Schema>) -> StorageResult<Self> {
        if HeapPage::slots_per_page(&schema) == 0 {
            return Err(StorageError::invalid(format!(
                "Tuples of {} bytes do not fit in a {} byte page",
                schema.byte_size(),
                PAGE_SIZE
            )));
        }

        Ok(Self {
            table_id,
            schema,
            page_manager: Mutex::new(PageManager::open_or_create(path)?),
            append_latch: Mutex::new(()),
        })
    }

    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn path(&self) -> PathBuf {
        self.page_manager.lock().path().to_path_buf()
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        self.page_manager.lock().num_pages()
    }

    /// Reads and decodes page `pid` from disk.
    pub fn read_page(&self, pid: PageId) -> StorageResult<HeapPage> {
        self.check_owns(pid)?;
        let mut buf = vec![0u8; PAGE_SIZE];
        self.page_manager.lock().read_page(pid.page_no, &mut buf)?;
        HeapPage::parse(pid, Arc::clone(&self.schema), &buf)
    }

    /// Writes `page` to its slot in the file and marks it clean.
    pub fn write_page(&self, page: &mut HeapPage) -> StorageResult<()> {
        self.check_owns(page.id())?;
        let data = page.page_data()?;
        self.page_manager.lock().write_page(page.id().page_no, &data)?;
        page.mark_dirty(None);
        Ok(())
    }

    /// Inserts `tuple` into the first page with a free slot, appending a page
    /// when every existing one is full. Returns the pages it modified.
    ///
    /// Every page scanned is fetched under Exclusive permission. An appended
    /// page is written to disk empty first, so the file has grown before the
    /// cache addresses it, and then filled through the cache like any other.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageRef>> {
        if **tuple.schema() != *self.schema {
            return Err(StorageError::invalid(format!(
                "Tuple schema [{}] does not match table {} schema [{}]",
                tuple.schema(),
                self.table_id,
                self.schema
            )));
        }

        let mut page_no = 0;
        loop {
            let num_pages = self.num_pages()?;
            while page_no < num_pages {
                let pid = PageId::new(self.table_id, page_no);
                let page = pool.get_page(tid, pid, Permission::Exclusive)?;
                {
                    let mut heap_page = page.write();
                    if heap_page.num_empty_slots() > 0 {
                        heap_page.insert_tuple(tuple)?;
                        heap_page.mark_dirty(Some(tid));
                        return Ok(vec![Arc::clone(&page)]);
                    }
                }
                page_no += 1;
            }

            let _latch = self.append_latch.lock();
            if self.num_pages()? == num_pages {
                let new_page_no = self
                    .page_manager
                    .lock()
                    .append_page(&HeapPage::empty_page_data())?;
                debug!(
                    "{} appended page {} to table {}",
                    tid, new_page_no, self.table_id
                );
            }
        }
    }

    /// Frees the slot addressed by `tuple`'s record id and returns its page.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<PageRef> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::invalid("Tuple has no record id"))?;
        self.check_owns(record_id.page_id)?;

        let page = pool.get_page(tid, record_id.page_id, Permission::Exclusive)?;
        {
            let mut heap_page = page.write();
            heap_page.delete_tuple(tuple)?;
            heap_page.mark_dirty(Some(tid));
        }
        Ok(page)
    }

    fn check_owns(&self, pid: PageId) -> StorageResult<()> {
        if pid.table_id != self.table_id {
            return Err(StorageError::invalid(format!(
                "Page {} does not belong to table {}",
                pid, self.table_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{Field, Type};
    use anyhow::Result;
    use tempfile::tempdir;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(&[Type::Int, Type::String], &["id", "name"]).unwrap())
    }

    #[test]
    fn test_empty_file() -> Result<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(3, &dir.path().join("t.dat"), schema())?;

        assert_eq!(file.id(), 3);
        assert_eq!(file.num_pages()?, 0);
        assert!(file.read_page(PageId::new(3, 0)).is_err());
        Ok(())
    }

    #[test]
    fn test_write_then_read_page() -> Result<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(1, &dir.path().join("t.dat"), schema())?;
        let pid = PageId::new(1, 0);

        let mut page = HeapPage::parse(pid, schema(), &HeapPage::empty_page_data())?;
        let mut tuple = Tuple::from_fields(
            schema(),
            vec![Field::Int(1), Field::String("Alice".to_string())],
        )?;
        page.insert_tuple(&mut tuple)?;
        page.mark_dirty(Some(TransactionId::new(1)));

        file.write_page(&mut page)?;
        assert!(!page.is_dirty());
        assert_eq!(file.num_pages()?, 1);

        let reread = file.read_page(pid)?;
        assert_eq!(reread.iter().cloned().collect::<Vec<_>>(), vec![tuple]);
        Ok(())
    }

    #[test]
    fn test_rejects_foreign_pages() -> Result<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(1, &dir.path().join("t.dat"), schema())?;

        assert!(matches!(
            file.read_page(PageId::new(2, 0)),
            Err(StorageError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_oversized_schema() -> Result<()> {
        let dir = tempdir()?;
        let wide = Arc::new(Schema::from_types(&vec![Type::String; 40])?);
        assert!(HeapFile::open(1, &dir.path().join("t.dat"), wide).is_err());
        Ok(())
    }

    #[test]
    fn test_reopen_sees_existing_pages() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.dat");
        std::fs::write(&path, vec![0u8; PAGE_SIZE * 3])?;

        let file = HeapFile::open(1, &path, schema())?;
        assert_eq!(file.num_pages()?, 3);
        assert_eq!(file.path(), path);
        Ok(())
    }
}
