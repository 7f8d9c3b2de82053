//! Hex module - Intel HEX parsing and write-operation building.
//!
//! - [`HexRecord`] - one decoded `:BBAAAATT...CC` line
//! - [`parse`] - whole-file parsing in file order
//! - [`write_operations`] - data records to page-sized [`WriteOperation`]s
//! - [`encode`] - operations back to Intel HEX text

mod loader;
mod record;

pub use loader::{encode, parse, write_operations, WriteOperation, MAX_RECORD_DATA};
pub use record::{HexRecord, RecordType, RECORD_MARKER};
