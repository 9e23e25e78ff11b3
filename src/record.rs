//! Record chain decoding.
//!
//! Records inside a page are prefix-compressed against the record before
//! them:
//!
//! ```text
//! flags         : u8   bit 7 = record length follows
//!                      bit 6 = header length follows
//!                      bits 0..5 = bytes copied from the previous record
//! record_length : u16 LE (only when bit 7 is set, else inherited)
//! header_length : u16 LE (only when bit 6 is set, else inherited)
//! data          : record_length - copied bytes
//! ```
//!
//! The first record of a page has no predecessor, so it must carry both
//! lengths and copy nothing.
//!
//! The first `header_length` bytes of a record's data form its header; see
//! [`RecordHeader`].

use log::trace;
use serde::Serialize;
use thiserror::Error;

use crate::binary::{CursorError, RandomAccess};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record flags {flags:#04x} lack the record/header lengths required without a previous record")]
    MissingLengths { flags: u8 },
    #[error("Record copies {copy} byte(s) but has no previous record")]
    NoPrevious { copy: usize },
    #[error("Record copies {copy} byte(s) from a previous record of {available} byte(s), length {record_length}")]
    CopyTooLong { copy: usize, available: usize, record_length: usize },
    #[error("Record header length {header_length} exceeds record length {record_length}")]
    HeaderTooLong { header_length: usize, record_length: usize },
    #[error("Record data: {0}")]
    Cursor(#[from] CursorError),
}

/// Decoder for one record chain; the seam between pages and record formats.
///
/// Both methods must advance the cursor by exactly the bytes they consume.
/// The end of a chain is signalled by the cursor running out of bytes, not
/// by an error.
pub trait RecordDecoder {
    type Record;

    fn decode_first(&self, rx: &mut RandomAccess) -> Result<Self::Record, RecordError>;

    fn decode_next(&self, previous: &Self::Record, rx: &mut RandomAccess) -> Result<Self::Record, RecordError>;
}

// ── Header ───────────────────────────────────────────────────────────────────

pub const HEADER_TABLE_NAME:       u8 = 0xFE;
pub const HEADER_DATA:             u8 = 0xF3;
pub const HEADER_METADATA:         u8 = 0xF6;
pub const HEADER_TABLE_DEFINITION: u8 = 0xFA;
pub const HEADER_MEMO:             u8 = 0xFC;

/// What a record holds, decided by its header bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordHeader {
    TableName { name: String },
    Data { table_number: u32, record_number: Option<u32> },
    Metadata { table_number: u32 },
    TableDefinition { table_number: u32, block: Option<u16> },
    Memo { table_number: u32, owner: Option<u32> },
    Index { table_number: u32, index_number: u8 },
    Unknown,
}

impl RecordHeader {
    pub fn parse(header: &[u8]) -> RecordHeader {
        if header.first() == Some(&HEADER_TABLE_NAME) {
            return RecordHeader::TableName { name: latin1(&header[1..]) };
        }
        if header.len() < 5 {
            return RecordHeader::Unknown;
        }

        let table_number = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let be32 = |at: usize| {
            header.get(at..at + 4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        };
        match header[4] {
            HEADER_DATA     => RecordHeader::Data { table_number, record_number: be32(5) },
            HEADER_METADATA => RecordHeader::Metadata { table_number },
            HEADER_TABLE_DEFINITION => RecordHeader::TableDefinition {
                table_number,
                block: header.get(5..7).map(|b| u16::from_le_bytes([b[0], b[1]])),
            },
            HEADER_MEMO => RecordHeader::Memo { table_number, owner: be32(5) },
            index_number => RecordHeader::Index { table_number, index_number },
        }
    }

    pub fn table_number(&self) -> Option<u32> {
        match self {
            RecordHeader::Data { table_number, .. }
            | RecordHeader::Metadata { table_number }
            | RecordHeader::TableDefinition { table_number, .. }
            | RecordHeader::Memo { table_number, .. }
            | RecordHeader::Index { table_number, .. } => Some(*table_number),
            RecordHeader::TableName { .. } | RecordHeader::Unknown => None,
        }
    }
}

pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

// ── TpsRecord ────────────────────────────────────────────────────────────────

/// One record, with its prefix-shared bytes already reconstructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpsRecord {
    flags:         u8,
    header_length: usize,
    data:          Vec<u8>,
    header:        RecordHeader,
}

impl TpsRecord {
    pub fn flags(&self) -> u8 { self.flags }
    pub fn record_length(&self) -> usize { self.data.len() }
    pub fn header_length(&self) -> usize { self.header_length }
    pub fn data(&self) -> &[u8] { &self.data }
    pub fn header(&self) -> &RecordHeader { &self.header }

    pub fn header_bytes(&self) -> &[u8] {
        &self.data[..self.header_length]
    }

    /// Data after the header.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.header_length..]
    }

    /// Cursor over the payload, for value decoders.
    pub fn payload_cursor(&self) -> RandomAccess {
        RandomAccess::from(self.payload())
    }

    fn build(flags: u8, record_length: usize, header_length: usize, data: Vec<u8>) -> Result<Self, RecordError> {
        if header_length > record_length {
            return Err(RecordError::HeaderTooLong { header_length, record_length });
        }
        let header = RecordHeader::parse(&data[..header_length]);
        trace!("record: {record_length} byte(s), header {header:?}");
        Ok(TpsRecord { flags, header_length, data, header })
    }
}

/// The TopSpeed record chain format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TpsRecordDecoder;

impl RecordDecoder for TpsRecordDecoder {
    type Record = TpsRecord;

    fn decode_first(&self, rx: &mut RandomAccess) -> Result<TpsRecord, RecordError> {
        let flags = rx.read_u8()?;
        if flags & 0xC0 != 0xC0 {
            return Err(RecordError::MissingLengths { flags });
        }
        let copy = (flags & 0x3F) as usize;
        if copy != 0 {
            return Err(RecordError::NoPrevious { copy });
        }
        let record_length = rx.read_u16_le()? as usize;
        let header_length = rx.read_u16_le()? as usize;
        let data = rx.read_bytes(record_length)?.to_vec();
        TpsRecord::build(flags, record_length, header_length, data)
    }

    fn decode_next(&self, previous: &TpsRecord, rx: &mut RandomAccess) -> Result<TpsRecord, RecordError> {
        let flags = rx.read_u8()?;
        let record_length = if flags & 0x80 != 0 {
            rx.read_u16_le()? as usize
        } else {
            previous.record_length()
        };
        let header_length = if flags & 0x40 != 0 {
            rx.read_u16_le()? as usize
        } else {
            previous.header_length()
        };

        let copy = (flags & 0x3F) as usize;
        if copy > previous.record_length() || copy > record_length {
            return Err(RecordError::CopyTooLong {
                copy,
                available: previous.record_length(),
                record_length,
            });
        }

        let mut data = Vec::with_capacity(record_length);
        data.extend_from_slice(&previous.data()[..copy]);
        data.extend_from_slice(rx.read_bytes(record_length - copy)?);
        TpsRecord::build(flags, record_length, header_length, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_header(table: u32, record: u32) -> Vec<u8> {
        let mut h = table.to_be_bytes().to_vec();
        h.push(HEADER_DATA);
        h.extend(record.to_be_bytes());
        h
    }

    #[test]
    fn first_record_carries_both_lengths() {
        let mut bytes = vec![0xC0, 11, 0, 9, 0];
        bytes.extend(data_header(1, 2));
        bytes.extend([0xAA, 0xBB]);
        let mut rx = RandomAccess::from(bytes);
        let rec = TpsRecordDecoder.decode_first(&mut rx).unwrap();
        assert!(rx.is_at_end());
        assert_eq!(rec.record_length(), 11);
        assert_eq!(rec.payload(), &[0xAA, 0xBB]);
        assert_eq!(rec.header(), &RecordHeader::Data { table_number: 1, record_number: Some(2) });
    }

    #[test]
    fn first_record_without_lengths_fails() {
        let mut rx = RandomAccess::from(vec![0x80, 1, 0, 0xFF]);
        assert_eq!(
            TpsRecordDecoder.decode_first(&mut rx).unwrap_err(),
            RecordError::MissingLengths { flags: 0x80 }
        );
    }

    #[test]
    fn next_record_shares_prefix_and_inherits_lengths() {
        let mut first = vec![0xC0, 11, 0, 9, 0];
        first.extend(data_header(1, 2));
        first.extend([0xAA, 0xBB]);
        // copy 8 bytes (table + kind + 3 bytes of record number), send the rest
        let next = vec![0x08, 0x03, 0xCC, 0xDD];
        let mut rx = RandomAccess::from([first, next].concat());

        let a = TpsRecordDecoder.decode_first(&mut rx).unwrap();
        let b = TpsRecordDecoder.decode_next(&a, &mut rx).unwrap();
        assert!(rx.is_at_end());
        assert_eq!(b.record_length(), 11);
        assert_eq!(b.header_length(), 9);
        assert_eq!(b.header(), &RecordHeader::Data { table_number: 1, record_number: Some(3) });
        assert_eq!(b.payload(), &[0xCC, 0xDD]);
    }

    #[test]
    fn copy_longer_than_previous_fails() {
        let mut rx = RandomAccess::from(vec![0xC0, 2, 0, 0, 0, 1, 2, 0x05, 9, 9, 9]);
        let a = TpsRecordDecoder.decode_first(&mut rx).unwrap();
        assert!(matches!(
            TpsRecordDecoder.decode_next(&a, &mut rx),
            Err(RecordError::CopyTooLong { copy: 5, .. })
        ));
    }

    #[test]
    fn truncated_record_is_cursor_error() {
        let mut rx = RandomAccess::from(vec![0xC0, 10, 0, 0, 0, 1, 2]);
        assert!(matches!(TpsRecordDecoder.decode_first(&mut rx), Err(RecordError::Cursor(_))));
    }

    #[test]
    fn header_kinds() {
        assert_eq!(
            RecordHeader::parse(&[0xFE, b'C', b'U', b'S', b'T']),
            RecordHeader::TableName { name: "CUST".into() }
        );
        assert_eq!(RecordHeader::parse(&[0, 0, 0, 7, HEADER_METADATA]), RecordHeader::Metadata { table_number: 7 });
        assert_eq!(
            RecordHeader::parse(&[0, 0, 0, 7, HEADER_TABLE_DEFINITION, 1, 0]),
            RecordHeader::TableDefinition { table_number: 7, block: Some(1) }
        );
        assert_eq!(
            RecordHeader::parse(&[0, 0, 0, 7, 0x01, 0, 0]),
            RecordHeader::Index { table_number: 7, index_number: 1 }
        );
        assert_eq!(RecordHeader::parse(&[1, 2]), RecordHeader::Unknown);
        assert_eq!(RecordHeader::parse(&[0, 0, 1, 0, HEADER_MEMO]).table_number(), Some(256));
    }
}
