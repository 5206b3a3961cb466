use crate::access::value::Type;
use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One column of a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub field_type: Type,
    pub name: Option<String>,
}

/// Ordered, fixed-width description of a table's tuples.
///
/// Two schemas are equal when their field types match position by position;
/// names are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema with named columns. `names` must match `types` in length.
    pub fn new(types: &[Type], names: &[&str]) -> StorageResult<Self> {
        if types.is_empty() {
            return Err(StorageError::invalid("Schema must have at least one field"));
        }
        if types.len() != names.len() {
            return Err(StorageError::invalid(format!(
                "Schema has {} types but {} names",
                types.len(),
                names.len()
            )));
        }

        Ok(Self {
            columns: types
                .iter()
                .zip(names)
                .map(|(t, n)| Column {
                    field_type: *t,
                    name: Some(n.to_string()),
                })
                .collect(),
        })
    }

    /// Creates a schema with anonymous columns.
    pub fn from_types(types: &[Type]) -> StorageResult<Self> {
        if types.is_empty() {
            return Err(StorageError::invalid("Schema must have at least one field"));
        }

        Ok(Self {
            columns: types
                .iter()
                .map(|t| Column {
                    field_type: *t,
                    name: None,
                })
                .collect(),
        })
    }

    pub fn num_fields(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn field_type(&self, i: usize) -> StorageResult<Type> {
        self.columns
            .get(i)
            .map(|c| c.field_type)
            .ok_or_else(|| self.out_of_range(i))
    }

    pub fn field_name(&self, i: usize) -> StorageResult<Option<&str>> {
        self.columns
            .get(i)
            .map(|c| c.name.as_deref())
            .ok_or_else(|| self.out_of_range(i))
    }

    /// Index of the first column named `name`.
    pub fn field_name_to_index(&self, name: &str) -> StorageResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name.as_deref() == Some(name))
            .ok_or(StorageError::NoSuchElement)
    }

    /// Encoded size of one tuple, in bytes.
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(|c| c.field_type.len()).sum()
    }

    /// Concatenates two schemas, `a`'s columns first.
    pub fn merge(a: &Schema, b: &Schema) -> Schema {
        let mut columns = a.columns.clone();
        columns.extend(b.columns.iter().cloned());
        Schema { columns }
    }

    fn out_of_range(&self, i: usize) -> StorageError {
        StorageError::invalid(format!(
            "Field index {} out of range ({} fields)",
            i,
            self.columns.len()
        ))
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}({})", c.field_type, c.name.as_deref().unwrap_or("")))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}
