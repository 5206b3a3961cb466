//! Access layer for tuple-oriented operations.
//!
//! - **HeapFile**: A table stored as an unordered set of fixed-slot pages
//! - **HeapScan**: Sequential scan over a table through the buffer pool
//! - **Tuple**: A schema-typed row carrying its RecordId once stored
//! - **Schema**: Ordered fixed-width field types with optional names
//! - **Field**: Int and String values with their on-page encoding

pub mod heap;
pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use heap::HeapFile;
pub use scan::{DbIterator, HeapScan};
pub use schema::{Column, Schema};
pub use tuple::{RecordId, Tuple};
pub use value::{Field, Type};
