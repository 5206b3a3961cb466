use crate::access::schema::Schema;
use crate::catalog::{Catalog, TableId};
use crate::config::BufferPoolConfig;
use crate::storage::buffer::BufferPool;
use crate::storage::error::{StorageError, StorageResult};
use crate::transaction::{Transaction, TransactionIdGenerator};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CATALOG_FILE: &str = "catalog.bin";

/// Database context: the catalog, the buffer pool over it, and the
/// transaction id source. Everything that needs pages goes through here.
pub struct Database {
    dir: PathBuf,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
    txn_ids: TransactionIdGenerator,
}

impl Database {
    /// Create a new database in `dir`, which must not already hold one.
    pub fn create(dir: &Path, config: &BufferPoolConfig) -> StorageResult<Self> {
        let catalog_path = dir.join(CATALOG_FILE);
        if catalog_path.exists() {
            return Err(StorageError::invalid(format!(
                "Database already exists at {:?}",
                dir
            )));
        }
        std::fs::create_dir_all(dir)?;

        let catalog = Arc::new(Catalog::new());
        catalog.save(&catalog_path)?;
        Self::with_catalog(dir, catalog, config)
    }

    /// Open the database in `dir`, reopening every registered table.
    pub fn open(dir: &Path, config: &BufferPoolConfig) -> StorageResult<Self> {
        let catalog_path = dir.join(CATALOG_FILE);
        if !catalog_path.exists() {
            return Err(StorageError::invalid(format!(
                "Database does not exist at {:?}",
                dir
            )));
        }

        let catalog = Arc::new(Catalog::load(&catalog_path)?);
        Self::with_catalog(dir, catalog, config)
    }

    pub fn open_or_create(dir: &Path, config: &BufferPoolConfig) -> StorageResult<Self> {
        if dir.join(CATALOG_FILE).exists() {
            Self::open(dir, config)
        } else {
            Self::create(dir, config)
        }
    }

    fn with_catalog(
        dir: &Path,
        catalog: Arc<Catalog>,
        config: &BufferPoolConfig,
    ) -> StorageResult<Self> {
        let buffer_pool = BufferPool::new(Arc::clone(&catalog), config)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            catalog,
            buffer_pool,
            txn_ids: TransactionIdGenerator::new(),
        })
    }

    /// Create a table stored as `<name>.dat` in the database directory.
    pub fn create_table(&self, name: &str, schema: Schema) -> StorageResult<TableId> {
        let path = self.dir.join(format!("{}.dat", name));
        let table_id = self.catalog.create_table(name, &path, Arc::new(schema))?;
        self.catalog.save(&self.dir.join(CATALOG_FILE))?;
        Ok(table_id)
    }

    pub fn begin(&self) -> Transaction {
        Transaction::begin(self.buffer_pool.clone(), &self.txn_ids)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
