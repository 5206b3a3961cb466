use crate::access::schema::Schema;
use crate::access::tuple::{RecordId, Tuple};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::storage::PAGE_SIZE;
use crate::transaction::TransactionId;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;
use std::sync::Arc;

/// A fixed-slot heap page.
///
/// Layout: an occupancy bitmap of `header_size()` bytes (bit `i` of the page is
/// bit `i % 8` of byte `i / 8`, least significant first), followed by
/// `num_slots()` slots of `schema.byte_size()` bytes each. The rest of the page
/// is zero padding. Only occupied slots are decoded.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuple slots a page holds for `schema`.
    pub fn slots_per_page(schema: &Schema) -> usize {
        (PAGE_SIZE * 8) / (schema.byte_size() * 8 + 1)
    }

    /// Bytes used by the occupancy bitmap for `schema`.
    pub fn header_size_for(schema: &Schema) -> usize {
        Self::slots_per_page(schema).div_ceil(8)
    }

    /// An all-free page image.
    pub fn empty_page_data() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    /// Decodes a page image read from disk.
    pub fn parse(pid: PageId, schema: Arc<Schema>, data: &[u8]) -> StorageResult<Self> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::invalid(format!(
                "Page image must be {} bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }

        let num_slots = Self::slots_per_page(&schema);
        if num_slots == 0 {
            return Err(StorageError::invalid(format!(
                "Tuples of {} bytes do not fit in a page",
                schema.byte_size()
            )));
        }

        let header_size = num_slots.div_ceil(8);
        let tuple_size = schema.byte_size();
        let header = data[..header_size].to_vec();

        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                tuples.push(None);
                continue;
            }
            let start = header_size + slot * tuple_size;
            let mut cursor = Cursor::new(&data[start..start + tuple_size]);
            let mut tuple = Tuple::parse(&schema, &mut cursor)?;
            tuple.set_record_id(Some(RecordId::new(pid, slot)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            pid,
            schema,
            header,
            tuples,
            dirtier: None,
        })
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn header_size(&self) -> usize {
        self.header.len()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots() && self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    /// The tuple stored in `slot`, if the slot is occupied.
    pub fn tuple_at(&self, slot: usize) -> Option<&Tuple> {
        self.tuples.get(slot).and_then(|t| t.as_ref())
    }

    /// Occupied tuples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().filter_map(|t| t.as_ref())
    }

    /// Stores `tuple` in the first free slot and points its record id there.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> StorageResult<usize> {
        if **tuple.schema() != *self.schema {
            return Err(StorageError::invalid(format!(
                "Tuple schema [{}] does not match page schema [{}]",
                tuple.schema(),
                self.schema
            )));
        }
        if tuple.fields().any(|f| f.is_none()) {
            return Err(StorageError::invalid("Cannot insert a tuple with unset fields"));
        }

        let slot = (0..self.num_slots())
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or(StorageError::PageFull { page_id: self.pid })?;

        let record_id = RecordId::new(self.pid, slot);
        tuple.set_record_id(Some(record_id));
        self.set_slot(slot, true);
        self.tuples[slot] = Some(tuple.clone());

        Ok(slot)
    }

    /// Frees the slot addressed by `tuple`'s record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> StorageResult<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::invalid("Tuple has no record id"))?;
        if record_id.page_id != self.pid {
            return Err(StorageError::invalid(format!(
                "Tuple lives on page {}, not {}",
                record_id.page_id, self.pid
            )));
        }
        if record_id.slot >= self.num_slots() {
            return Err(StorageError::invalid(format!(
                "Slot {} out of range ({} slots)",
                record_id.slot,
                self.num_slots()
            )));
        }
        if !self.is_slot_used(record_id.slot) {
            return Err(StorageError::invalid(format!(
                "Slot {} on page {} is already empty",
                record_id.slot, self.pid
            )));
        }

        self.set_slot(record_id.slot, false);
        self.tuples[record_id.slot] = None;
        Ok(())
    }

    /// Serializes the page to its on-disk image.
    pub fn page_data(&self) -> StorageResult<Bytes> {
        let tuple_size = self.schema.byte_size();
        let mut buf = BytesMut::with_capacity(PAGE_SIZE);
        buf.put_slice(&self.header);

        for tuple in &self.tuples {
            match tuple {
                Some(tuple) => tuple.serialize(&mut buf)?,
                None => buf.put_bytes(0, tuple_size),
            }
        }
        buf.put_bytes(0, PAGE_SIZE - buf.len());

        Ok(buf.freeze())
    }

    /// Marks the page dirty on behalf of `tid`, or clean with `None`.
    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtier = tid;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    /// The transaction that last dirtied this page, if it is dirty.
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        let mask = 1 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{Field, Type};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(&[Type::Int, Type::Int], &["a", "b"]).unwrap())
    }

    fn tuple(schema: &Arc<Schema>, a: i32, b: i32) -> Tuple {
        Tuple::from_fields(Arc::clone(schema), vec![Field::Int(a), Field::Int(b)]).unwrap()
    }

    fn empty_page(schema: &Arc<Schema>) -> HeapPage {
        HeapPage::parse(
            PageId::new(1, 0),
            Arc::clone(schema),
            &HeapPage::empty_page_data(),
        )
        .unwrap()
    }

    #[test]
    fn test_slot_arithmetic() {
        let schema = schema();
        // 8 bytes per tuple: 32768 / 65 = 504 slots, 63 header bytes.
        assert_eq!(HeapPage::slots_per_page(&schema), 504);
        assert_eq!(HeapPage::header_size_for(&schema), 63);

        let page = empty_page(&schema);
        assert_eq!(page.num_slots(), 504);
        assert_eq!(page.header_size(), 63);
        assert_eq!(page.num_empty_slots(), 504);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_insert_uses_first_free_slot() -> StorageResult<()> {
        let schema = schema();
        let mut page = empty_page(&schema);

        let mut t0 = tuple(&schema, 1, 10);
        let mut t1 = tuple(&schema, 2, 20);
        assert_eq!(page.insert_tuple(&mut t0)?, 0);
        assert_eq!(page.insert_tuple(&mut t1)?, 1);
        assert_eq!(t1.record_id(), Some(RecordId::new(page.id(), 1)));

        page.delete_tuple(&t0)?;
        assert!(!page.is_slot_used(0));
        assert!(page.is_slot_used(1));

        let mut t2 = tuple(&schema, 3, 30);
        assert_eq!(page.insert_tuple(&mut t2)?, 0);
        assert_eq!(page.num_empty_slots(), 502);
        Ok(())
    }

    #[test]
    fn test_page_data_reparses() -> StorageResult<()> {
        let schema = schema();
        let mut page = empty_page(&schema);
        for i in 0..5 {
            page.insert_tuple(&mut tuple(&schema, i, i * 2))?;
        }
        let victim = page.tuple_at(2).cloned().unwrap();
        page.delete_tuple(&victim)?;

        let data = page.page_data()?;
        assert_eq!(data.len(), PAGE_SIZE);

        let reparsed = HeapPage::parse(page.id(), Arc::clone(&schema), &data)?;
        let values: Vec<&Field> = reparsed.iter().filter_map(|t| t.field(0)).collect();
        assert_eq!(
            values,
            vec![&Field::Int(0), &Field::Int(1), &Field::Int(3), &Field::Int(4)]
        );
        assert_eq!(
            reparsed.tuple_at(3).and_then(|t| t.record_id()),
            Some(RecordId::new(page.id(), 3))
        );
        assert!(reparsed.tuple_at(2).is_none());
        Ok(())
    }

    #[test]
    fn test_page_full() -> StorageResult<()> {
        let schema = schema();
        let mut page = empty_page(&schema);
        for i in 0..page.num_slots() as i32 {
            page.insert_tuple(&mut tuple(&schema, i, 0))?;
        }

        assert_eq!(page.num_empty_slots(), 0);
        assert!(matches!(
            page.insert_tuple(&mut tuple(&schema, -1, 0)),
            Err(StorageError::PageFull { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_delete_errors() -> StorageResult<()> {
        let schema = schema();
        let mut page = empty_page(&schema);

        let unplaced = tuple(&schema, 1, 1);
        assert!(page.delete_tuple(&unplaced).is_err());

        let mut elsewhere = tuple(&schema, 1, 1);
        elsewhere.set_record_id(Some(RecordId::new(PageId::new(1, 7), 0)));
        assert!(page.delete_tuple(&elsewhere).is_err());

        let mut empty_slot = tuple(&schema, 1, 1);
        empty_slot.set_record_id(Some(RecordId::new(page.id(), 4)));
        assert!(page.delete_tuple(&empty_slot).is_err());

        let mut out_of_range = tuple(&schema, 1, 1);
        out_of_range.set_record_id(Some(RecordId::new(page.id(), 10_000)));
        assert!(page.delete_tuple(&out_of_range).is_err());
        Ok(())
    }

    #[test]
    fn test_insert_rejects_other_schema() {
        let schema = schema();
        let mut page = empty_page(&schema);
        let other = Arc::new(Schema::from_types(&[Type::String]).unwrap());
        let mut t = Tuple::from_fields(other, vec![Field::String("x".into())]).unwrap();

        assert!(matches!(
            page.insert_tuple(&mut t),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut page = empty_page(&schema());
        let tid = TransactionId::new(9);

        page.mark_dirty(Some(tid));
        assert!(page.is_dirty());
        assert_eq!(page.dirtier(), Some(tid));

        page.mark_dirty(None);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_oversized_schema_rejected() {
        let types = vec![Type::String; 40];
        let schema = Arc::new(Schema::from_types(&types).unwrap());
        assert_eq!(HeapPage::slots_per_page(&schema), 0);
        assert!(HeapPage::parse(PageId::new(1, 0), schema, &HeapPage::empty_page_data()).is_err());
    }
}
