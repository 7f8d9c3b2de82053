//! Intel HEX record decoding and encoding.
//!
//! Record layout (ASCII, one per line):
//! ```text
//! ┌───┬────────────┬──────────┬──────────┬───────────────┬──────────┐
//! │ : │ Byte count │ Address  │ Type     │ Data          │ Checksum │
//! │   │ 2 digits   │ 4 digits │ 2 digits │ 2 × count     │ 2 digits │
//! └───┴────────────┴──────────┴──────────┴───────────────┴──────────┘
//! ```
//!
//! The checksum is decoded when present but never checked against the
//! record contents.

use std::fmt::Write as _;

use bytes::Bytes;

use crate::error::HexError;

/// Start-of-record marker.
pub const RECORD_MARKER: char = ':';

/// Characters before the data field (`:BBAAAATT`).
const HEADER_CHARS: usize = 9;

/// Record type byte (characters 7–8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Data,
    EndOfFile,
    ExtendedSegmentAddress,
    StartSegmentAddress,
    ExtendedLinearAddress,
    StartLinearAddress,
}

impl RecordType {
    /// Wire value of this record type.
    pub fn as_byte(self) -> u8 {
        match self {
            RecordType::Data => 0x00,
            RecordType::EndOfFile => 0x01,
            RecordType::ExtendedSegmentAddress => 0x02,
            RecordType::StartSegmentAddress => 0x03,
            RecordType::ExtendedLinearAddress => 0x04,
            RecordType::StartLinearAddress => 0x05,
        }
    }
}

impl TryFrom<u8> for RecordType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        Ok(match value {
            0x00 => RecordType::Data,
            0x01 => RecordType::EndOfFile,
            0x02 => RecordType::ExtendedSegmentAddress,
            0x03 => RecordType::StartSegmentAddress,
            0x04 => RecordType::ExtendedLinearAddress,
            0x05 => RecordType::StartLinearAddress,
            other => return Err(other),
        })
    }
}

/// One decoded Intel HEX line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub record_type: RecordType,
    /// 16-bit load offset from the address field.
    pub address: u16,
    pub data: Bytes,
}

impl HexRecord {
    pub fn new(record_type: RecordType, address: u16, data: impl Into<Bytes>) -> Self {
        Self {
            record_type,
            address,
            data: data.into(),
        }
    }

    /// A data record.
    pub fn data(address: u16, data: impl Into<Bytes>) -> Self {
        Self::new(RecordType::Data, address, data)
    }

    /// The `:00000001FF` terminator.
    pub fn end_of_file() -> Self {
        Self::new(RecordType::EndOfFile, 0, Bytes::new())
    }

    /// Decode a single line.
    ///
    /// `line_no` is 1-based and only used for error reporting. The line must
    /// start with [`RECORD_MARKER`]; trailing whitespace is ignored.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self, HexError> {
        let malformed = |reason: String| HexError::MalformedRecord {
            line: line_no,
            reason,
        };

        let line = line.trim_end();
        let bytes = line.as_bytes();

        if bytes.first() != Some(&(RECORD_MARKER as u8)) {
            return Err(malformed("missing ':' record marker".to_string()));
        }
        if bytes.len() < HEADER_CHARS {
            return Err(malformed(format!(
                "record is {} characters, need at least {}",
                bytes.len(),
                HEADER_CHARS
            )));
        }

        let byte_at = |offset: usize| -> Result<u8, HexError> {
            decode_byte(&bytes[offset..offset + 2]).ok_or_else(|| {
                malformed(format!(
                    "invalid hex digit at column {}",
                    offset + 1
                ))
            })
        };

        let count = byte_at(1)? as usize;
        let address = u16::from_be_bytes([byte_at(3)?, byte_at(5)?]);
        let type_byte = byte_at(7)?;
        let record_type = RecordType::try_from(type_byte)
            .map_err(|t| malformed(format!("unknown record type 0x{:02X}", t)))?;

        // Data digits followed by exactly two checksum digits.
        let tail = bytes.len() - HEADER_CHARS;
        let data_chars = count * 2;
        if tail != data_chars + 2 {
            return Err(malformed(format!(
                "byte count {} does not match {} data characters plus checksum",
                count,
                tail.saturating_sub(2)
            )));
        }

        let mut data = Vec::with_capacity(count);
        for i in 0..count {
            data.push(byte_at(HEADER_CHARS + i * 2)?);
        }
        // Checksum value is not compared, only its digits.
        byte_at(HEADER_CHARS + data_chars)?;

        Ok(Self {
            record_type,
            address,
            data: Bytes::from(data),
        })
    }

    /// Declared byte count (always the data length).
    #[inline]
    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    /// Two's-complement checksum over count, address, type and data.
    pub fn checksum(&self) -> u8 {
        let [hi, lo] = self.address.to_be_bytes();
        let sum = self
            .data
            .iter()
            .fold(
                (self.data.len() as u8)
                    .wrapping_add(hi)
                    .wrapping_add(lo)
                    .wrapping_add(self.record_type.as_byte()),
                |acc, b| acc.wrapping_add(*b),
            );
        0u8.wrapping_sub(sum)
    }

    /// Upper address bits set by an extended address record.
    ///
    /// Returns `None` for every other record type.
    pub fn upper_address(&self) -> Option<u32> {
        if self.data.len() != 2 {
            return None;
        }
        let value = u16::from_be_bytes([self.data[0], self.data[1]]) as u32;
        match self.record_type {
            RecordType::ExtendedSegmentAddress => Some(value << 4),
            RecordType::ExtendedLinearAddress => Some(value << 16),
            _ => None,
        }
    }

    /// Encode back to a `:BBAAAATT...CC` line (no line terminator).
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the data is longer than 255 bytes.
    pub fn to_line(&self) -> String {
        debug_assert!(self.data.len() <= u8::MAX as usize);
        let mut line = String::with_capacity(HEADER_CHARS + 2 + self.data.len() * 2);
        let _ = write!(
            line,
            "{}{:02X}{:04X}{:02X}",
            RECORD_MARKER,
            self.data.len(),
            self.address,
            self.record_type.as_byte()
        );
        for b in self.data.iter() {
            let _ = write!(line, "{:02X}", b);
        }
        let _ = write!(line, "{:02X}", self.checksum());
        line
    }
}

#[inline]
fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[inline]
fn decode_byte(pair: &[u8]) -> Option<u8> {
    Some(nibble(pair[0])? << 4 | nibble(pair[1])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_record() {
        let record =
            HexRecord::parse_line(":100000000C9434000C9446000C9446000C9446006A", 1).unwrap();

        assert_eq!(record.record_type, RecordType::Data);
        assert_eq!(record.address, 0x0000);
        assert_eq!(record.byte_count(), 16);
        assert_eq!(&record.data[..4], &[0x0C, 0x94, 0x34, 0x00]);
    }

    #[test]
    fn test_parse_end_of_file() {
        let record = HexRecord::parse_line(":00000001FF", 7).unwrap();
        assert_eq!(record, HexRecord::end_of_file());
    }

    #[test]
    fn test_parse_tolerates_crlf_and_lowercase() {
        let record = HexRecord::parse_line(":02010000abcd85\r\n", 1).unwrap();
        assert_eq!(record.address, 0x0100);
        assert_eq!(&record.data[..], &[0xAB, 0xCD]);
    }

    #[test]
    fn test_checksum_is_not_validated() {
        // Correct checksum would be 0xFF.
        let record = HexRecord::parse_line(":0000000100", 1).unwrap();
        assert_eq!(record.record_type, RecordType::EndOfFile);
    }

    #[test]
    fn test_checksum_digits_are_not_data() {
        // Declares 3 bytes, carries 2 + checksum.
        let err = HexRecord::parse_line(":03000000AABBCC", 4).unwrap_err();
        match err {
            HexError::MalformedRecord { line, reason } => {
                assert_eq!(line, 4);
                assert!(reason.contains("byte count 3"));
            }
        }
    }

    #[test]
    fn test_missing_checksum_rejected() {
        assert!(HexRecord::parse_line(":0200100001FF", 1).is_err());
        assert!(HexRecord::parse_line(":00000001", 1).is_err());
    }

    #[test]
    fn test_byte_count_mismatch_rejected() {
        // Declares 4 bytes, carries 2 + checksum.
        let err = HexRecord::parse_line(":04000000AABBCC", 3).unwrap_err();
        match err {
            HexError::MalformedRecord { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("byte count 4"));
            }
        }
    }

    #[test]
    fn test_invalid_hex_digit_rejected() {
        let err = HexRecord::parse_line(":02000000AZBB00", 2).unwrap_err();
        assert!(err.to_string().contains("invalid hex digit at column 10"));
    }

    #[test]
    fn test_sign_prefix_is_not_a_digit() {
        assert!(HexRecord::parse_line(":+1000000", 1).is_err());
    }

    #[test]
    fn test_short_record_rejected() {
        let err = HexRecord::parse_line(":0000", 1).unwrap_err();
        assert!(err.to_string().contains("at least 9"));
    }

    #[test]
    fn test_unknown_record_type_rejected() {
        let err = HexRecord::parse_line(":00000009F7", 1).unwrap_err();
        assert!(err.to_string().contains("unknown record type 0x09"));
    }

    #[test]
    fn test_checksum_matches_known_records() {
        assert_eq!(HexRecord::end_of_file().checksum(), 0xFF);

        let record =
            HexRecord::parse_line(":100000000C9434000C9446000C9446000C9446006A", 1).unwrap();
        assert_eq!(record.checksum(), 0x6A);
    }

    #[test]
    fn test_to_line_reproduces_input() {
        let line = ":100000000C9434000C9446000C9446000C9446006A";
        let record = HexRecord::parse_line(line, 1).unwrap();
        assert_eq!(record.to_line(), line);
        assert_eq!(HexRecord::end_of_file().to_line(), ":00000001FF");
    }

    #[test]
    fn test_upper_address() {
        let linear = HexRecord::parse_line(":020000040001F9", 1).unwrap();
        assert_eq!(linear.upper_address(), Some(0x0001_0000));

        let segment = HexRecord::parse_line(":020000021000EC", 1).unwrap();
        assert_eq!(segment.upper_address(), Some(0x0001_0000));

        assert_eq!(HexRecord::data(0, vec![1, 2]).upper_address(), None);
    }

    #[test]
    fn test_record_type_round_trip_byte() {
        for byte in 0u8..=5 {
            let kind = RecordType::try_from(byte).unwrap();
            assert_eq!(kind.as_byte(), byte);
        }
        assert_eq!(RecordType::try_from(6), Err(6));
    }
}
