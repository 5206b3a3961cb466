//! Registry of tables and their backing heap files.

use crate::access::heap::HeapFile;
use crate::access::schema::Schema;
use crate::storage::error::{StorageError, StorageResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type TableId = u32;

/// Persisted description of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_id: TableId,
    pub table_name: String,
    pub path: PathBuf,
    pub schema: Schema,
}

struct TableEntry {
    info: TableInfo,
    file: Arc<HeapFile>,
}

pub struct Catalog {
    tables: DashMap<TableId, TableEntry>,
    names: DashMap<String, TableId>,
    next_table_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            names: DashMap::new(),
            next_table_id: AtomicU32::new(1),
        }
    }

    /// Registers a table backed by the heap file at `path`, creating the file
    /// if it does not exist.
    pub fn create_table(
        &self,
        name: &str,
        path: &Path,
        schema: Arc<Schema>,
    ) -> StorageResult<TableId> {
        self.register(name, path, schema, None)
    }

    /// Adds a table under `table_id`, or under the next free id when `None`.
    /// An id is only allocated once the name is known to be free.
    fn register(
        &self,
        name: &str,
        path: &Path,
        schema: Arc<Schema>,
        table_id: Option<TableId>,
    ) -> StorageResult<TableId> {
        use dashmap::mapref::entry::Entry;

        match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(StorageError::invalid(format!(
                "Table '{}' already exists",
                name
            ))),
            Entry::Vacant(slot) => {
                let table_id = table_id
                    .unwrap_or_else(|| self.next_table_id.fetch_add(1, Ordering::SeqCst));
                let info = TableInfo {
                    table_id,
                    table_name: name.to_string(),
                    path: path.to_path_buf(),
                    schema: (*schema).clone(),
                };
                let file = Arc::new(HeapFile::open(table_id, path, schema)?);
                slot.insert(table_id);
                self.tables.insert(table_id, TableEntry { info, file });
                Ok(table_id)
            }
        }
    }

    /// The backing file path and schema of `table_id`.
    pub fn lookup(&self, table_id: TableId) -> StorageResult<(PathBuf, Arc<Schema>)> {
        let entry = self
            .tables
            .get(&table_id)
            .ok_or(StorageError::TableNotFound(table_id))?;
        Ok((entry.info.path.clone(), Arc::clone(entry.file.schema())))
    }

    pub fn heap_file(&self, table_id: TableId) -> StorageResult<Arc<HeapFile>> {
        self.tables
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or(StorageError::TableNotFound(table_id))
    }

    pub fn schema(&self, table_id: TableId) -> StorageResult<Arc<Schema>> {
        Ok(Arc::clone(self.heap_file(table_id)?.schema()))
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).map(|id| *id)
    }

    pub fn table_name(&self, table_id: TableId) -> StorageResult<String> {
        self.tables
            .get(&table_id)
            .map(|entry| entry.info.table_name.clone())
            .ok_or(StorageError::TableNotFound(table_id))
    }

    /// All table ids in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Writes the table registry to `path`. Table contents are not touched.
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        let infos: Vec<TableInfo> = self
            .table_ids()
            .into_iter()
            .filter_map(|id| self.tables.get(&id).map(|entry| entry.info.clone()))
            .collect();
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &infos)?;
        Ok(())
    }

    /// Rebuilds a catalog from a registry written by `save`, reopening every
    /// table's heap file.
    pub fn load(path: &Path) -> StorageResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let infos: Vec<TableInfo> = bincode::deserialize_from(reader)?;

        let catalog = Self::new();
        let mut max_id = 0;
        for info in infos {
            max_id = max_id.max(info.table_id);
            let schema = Arc::new(info.schema);
            catalog.register(&info.table_name, &info.path, schema, Some(info.table_id))?;
        }
        catalog.next_table_id.store(max_id + 1, Ordering::SeqCst);
        Ok(catalog)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::Type;
    use anyhow::Result;
    use tempfile::tempdir;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(&[Type::Int, Type::String], &["id", "name"]).unwrap())
    }

    #[test]
    fn test_create_and_lookup() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let path = dir.path().join("users.dat");

        let id = catalog.create_table("users", &path, schema())?;
        let (file_path, table_schema) = catalog.lookup(id)?;

        assert_eq!(file_path, path);
        assert_eq!(*table_schema, *schema());
        assert_eq!(catalog.table_id("users"), Some(id));
        assert_eq!(catalog.table_name(id)?, "users");
        assert_eq!(catalog.heap_file(id)?.id(), id);
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_duplicate_table_name() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        catalog.create_table("users", &dir.path().join("a.dat"), schema())?;

        let result = catalog.create_table("users", &dir.path().join("b.dat"), schema());
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        assert_eq!(catalog.table_ids().len(), 1);
        Ok(())
    }

    #[test]
    fn test_rejected_name_keeps_next_id() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let first = catalog.create_table("users", &dir.path().join("a.dat"), schema())?;
        for _ in 0..3 {
            assert!(catalog
                .create_table("users", &dir.path().join("b.dat"), schema())
                .is_err());
        }

        let second = catalog.create_table("orders", &dir.path().join("c.dat"), schema())?;
        assert_eq!((first, second), (1, 2));
        assert!(!dir.path().join("b.dat").exists());
        Ok(())
    }

    #[test]
    fn test_missing_table() {
        let catalog = Catalog::new();
        assert!(matches!(catalog.lookup(7), Err(StorageError::TableNotFound(7))));
        assert!(catalog.heap_file(7).is_err());
        assert_eq!(catalog.table_id("nope"), None);
    }

    #[test]
    fn test_table_ids_sorted() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        for name in ["c", "a", "b"] {
            catalog.create_table(name, &dir.path().join(name), schema())?;
        }
        assert_eq!(catalog.table_ids(), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_catalog_persistence() -> Result<()> {
        let dir = tempdir()?;
        let registry = dir.path().join("catalog.bin");
        {
            let catalog = Catalog::new();
            catalog.create_table("users", &dir.path().join("users.dat"), schema())?;
            catalog.create_table("orders", &dir.path().join("orders.dat"), schema())?;
            catalog.save(&registry)?;
        }

        let catalog = Catalog::load(&registry)?;
        assert_eq!(catalog.table_ids(), vec![1, 2]);
        assert_eq!(catalog.table_id("orders"), Some(2));
        assert_eq!(catalog.schema(1)?.field_name(1)?, Some("name"));

        let next = catalog.create_table("items", &dir.path().join("items.dat"), schema())?;
        assert_eq!(next, 3);
        Ok(())
    }
}
