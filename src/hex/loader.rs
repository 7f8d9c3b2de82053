//! Intel HEX text to ordered write operations.
//!
//! # Example
//!
//! ```
//! use stk500_uploader::hex::{parse, write_operations};
//!
//! let text = ":0400000001020304F2\n:00000001FF\n";
//! let records = parse(text).unwrap();
//! let ops = write_operations(&records, 128);
//!
//! assert_eq!(ops.len(), 1);
//! assert_eq!(ops[0].address, 0);
//! assert_eq!(&ops[0].payload[..], &[1, 2, 3, 4]);
//! ```

use bytes::Bytes;

use super::record::{HexRecord, RecordType, RECORD_MARKER};
use crate::error::HexError;

/// Largest payload a single data record can carry.
pub const MAX_RECORD_DATA: usize = u8::MAX as usize;

/// A block of bytes destined for one program-page command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOperation {
    /// Byte address in flash.
    pub address: u32,
    pub payload: Bytes,
}

impl WriteOperation {
    pub fn new(address: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            address,
            payload: payload.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Flash word address (byte address / 2) as sent with `LoadAddress`.
    ///
    /// Truncated to 16 bits, the width of the load-address command.
    #[inline]
    pub fn word_address(&self) -> u16 {
        (self.address >> 1) as u16
    }
}

/// Parse Intel HEX text into records, in file order.
///
/// Lines that do not start with `:` are skipped. Parsing continues past an
/// end-of-file record.
pub fn parse(text: &str) -> Result<Vec<HexRecord>, HexError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| line.starts_with(RECORD_MARKER))
        .map(|(idx, line)| HexRecord::parse_line(line, idx + 1))
        .collect()
}

/// Turn data records into write operations.
///
/// Records keep their file order and zero-length records are dropped.
/// A record longer than `page_size` is split into page-sized operations.
///
/// Extended address records are not applied: every operation address is the
/// record's 16-bit offset. A warning is logged when such a record would have
/// moved the base address.
pub fn write_operations(records: &[HexRecord], page_size: usize) -> Vec<WriteOperation> {
    let page_size = page_size.max(1);
    let mut ops = Vec::with_capacity(records.len());

    for record in records {
        match record.record_type {
            RecordType::Data => {
                if record.data.is_empty() {
                    continue;
                }
                let base = record.address as u32;
                let mut offset = 0;
                while offset < record.data.len() {
                    let end = (offset + page_size).min(record.data.len());
                    ops.push(WriteOperation::new(
                        base + offset as u32,
                        record.data.slice(offset..end),
                    ));
                    offset = end;
                }
            }
            RecordType::ExtendedSegmentAddress | RecordType::ExtendedLinearAddress => {
                if let Some(upper) = record.upper_address().filter(|u| *u != 0) {
                    tracing::warn!(
                        "Ignoring {:?} record (base 0x{:08X}); addresses above 64 KiB are not supported",
                        record.record_type,
                        upper
                    );
                }
            }
            _ => {}
        }
    }

    ops
}

/// Encode write operations as Intel HEX text terminated by an EOF record.
///
/// Each operation becomes exactly one data record, so the output parses
/// back into the same operations.
pub fn encode(ops: &[WriteOperation]) -> Result<String, HexError> {
    let mut out = String::new();

    for (idx, op) in ops.iter().enumerate() {
        let address = u16::try_from(op.address).ok().filter(|_| op.len() <= MAX_RECORD_DATA);
        let Some(address) = address else {
            return Err(HexError::MalformedRecord {
                line: idx + 1,
                reason: format!(
                    "{} bytes at 0x{:X} do not fit a 16-bit data record",
                    op.len(),
                    op.address
                ),
            });
        };
        out.push_str(&HexRecord::data(address, op.payload.clone()).to_line());
        out.push('\n');
    }

    out.push_str(&HexRecord::end_of_file().to_line());
    out.push('\n');
    Ok(out)
}
