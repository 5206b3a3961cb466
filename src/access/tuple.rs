use crate::access::schema::Schema;
use crate::access::value::Field;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use bytes::BufMut;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Storage address of a tuple: the page it lives on and its slot there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// A row of field values typed by a schema.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    fields: Vec<Option<Field>>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a tuple with every field unset.
    pub fn new(schema: Arc<Schema>) -> Self {
        let fields = vec![None; schema.num_fields()];
        Self {
            schema,
            fields,
            record_id: None,
        }
    }

    /// Creates a tuple from a full set of field values.
    pub fn from_fields(schema: Arc<Schema>, fields: Vec<Field>) -> StorageResult<Self> {
        if fields.len() != schema.num_fields() {
            return Err(StorageError::invalid(format!(
                "Expected {} fields, got {}",
                schema.num_fields(),
                fields.len()
            )));
        }

        let mut tuple = Self::new(schema);
        for (i, field) in fields.into_iter().enumerate() {
            tuple.set_field(i, field)?;
        }
        Ok(tuple)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> StorageResult<()> {
        let expected = self.schema.field_type(i)?;
        if field.field_type() != expected {
            return Err(StorageError::invalid(format!(
                "Field {} expects {}, got {}",
                i,
                expected,
                field.field_type()
            )));
        }
        self.fields[i] = Some(field);
        Ok(())
    }

    /// The value of field `i`, or `None` if it has not been set.
    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i).and_then(|f| f.as_ref())
    }

    pub fn fields(&self) -> impl Iterator<Item = Option<&Field>> {
        self.fields.iter().map(|f| f.as_ref())
    }

    /// Writes the slot encoding of this tuple. Every field must be set.
    pub(crate) fn serialize<B: BufMut>(&self, buf: &mut B) -> StorageResult<()> {
        for (i, field) in self.fields.iter().enumerate() {
            let field = field
                .as_ref()
                .ok_or_else(|| StorageError::invalid(format!("Field {} is not set", i)))?;
            field.serialize(buf);
        }
        Ok(())
    }

    /// Reads one slot's worth of fields.
    pub(crate) fn parse<R: Read>(schema: &Arc<Schema>, reader: &mut R) -> StorageResult<Self> {
        let mut tuple = Self::new(Arc::clone(schema));
        for (i, column) in schema.columns().iter().enumerate() {
            tuple.fields[i] = Some(column.field_type.parse(reader)?);
        }
        Ok(tuple)
    }
}

/// Tuples compare by schema and values; the storage address is not part of
/// a tuple's identity.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.fields == other.fields
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self
            .fields
            .iter()
            .map(|v| v.as_ref().map(|v| v.to_string()).unwrap_or_default())
            .collect();
        write!(f, "{}", values.join("\t"))
    }
}
