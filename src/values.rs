//! Scalar field decoders and rows.
//!
//! Every decoder consumes exactly the field's byte width from the cursor:
//! the fixed width for numeric, date and time fields, or the declared
//! length for strings, decimals and groups.  PSTRING is the exception; it
//! consumes its length byte plus that many characters.
//!
//! Text is Latin-1.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use thiserror::Error;

use crate::binary::{CursorError, RandomAccess};
use crate::record::{latin1, RecordHeader, TpsRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Unknown field type code {0:#04x}")]
    UnknownType(u8),
    #[error("Invalid date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: u16, month: u8, day: u8 },
    #[error("Invalid time {hours:02}:{minutes:02}:{seconds:02}.{centiseconds:02}")]
    InvalidTime { hours: u8, minutes: u8, seconds: u8, centiseconds: u8 },
    #[error("Record {0:?} is not a data record")]
    NotData(RecordHeader),
    #[error("Field value: {0}")]
    Cursor(#[from] CursorError),
}

// ── FieldType ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum FieldType {
    Byte    = 0x01,
    Short   = 0x02,
    UShort  = 0x03,
    Date    = 0x04,
    Time    = 0x05,
    Long    = 0x06,
    ULong   = 0x07,
    SReal   = 0x08,
    Real    = 0x09,
    Decimal = 0x0A,
    String  = 0x12,
    CString = 0x13,
    PString = 0x14,
    Group   = 0x16,
}

impl FieldType {
    pub fn from_code(code: u8) -> Result<Self, ValueError> {
        Ok(match code {
            0x01 => FieldType::Byte,
            0x02 => FieldType::Short,
            0x03 => FieldType::UShort,
            0x04 => FieldType::Date,
            0x05 => FieldType::Time,
            0x06 => FieldType::Long,
            0x07 => FieldType::ULong,
            0x08 => FieldType::SReal,
            0x09 => FieldType::Real,
            0x0A => FieldType::Decimal,
            0x12 => FieldType::String,
            0x13 => FieldType::CString,
            0x14 => FieldType::PString,
            0x16 => FieldType::Group,
            other => return Err(ValueError::UnknownType(other)),
        })
    }

    pub fn code(self) -> u8 { self as u8 }

    /// Width on disk, for types that have a fixed one.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            FieldType::Byte => Some(1),
            FieldType::Short | FieldType::UShort => Some(2),
            FieldType::Date
            | FieldType::Time
            | FieldType::Long
            | FieldType::ULong
            | FieldType::SReal => Some(4),
            FieldType::Real => Some(8),
            FieldType::Decimal
            | FieldType::String
            | FieldType::CString
            | FieldType::PString
            | FieldType::Group => None,
        }
    }
}

// ── TpsValue ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TpsValue {
    Byte(u8),
    Short(i16),
    UShort(u16),
    /// `None` for the all-zero date.
    Date(Option<NaiveDate>),
    /// `None` for the all-zero time.
    Time(Option<NaiveTime>),
    Long(i32),
    ULong(u32),
    SReal(f32),
    Real(f64),
    /// Exact decimal text, since values may carry up to 31 digits.
    Decimal(String),
    String(String),
    Group(Vec<u8>),
}

impl TpsValue {
    /// Decode one field at the cursor.  `length` is the declared byte length
    /// (ignored by fixed-width types); `digits_after_decimal` only matters
    /// for DECIMAL.
    pub fn decode(
        field_type:           FieldType,
        rx:                   &mut RandomAccess,
        length:               usize,
        digits_after_decimal: usize,
    ) -> Result<TpsValue, ValueError> {
        Ok(match field_type {
            FieldType::Byte    => TpsValue::Byte(rx.read_u8()?),
            FieldType::Short   => TpsValue::Short(rx.read_i16_le()?),
            FieldType::UShort  => TpsValue::UShort(rx.read_u16_le()?),
            FieldType::Date    => TpsValue::Date(decode_date(rx)?),
            FieldType::Time    => TpsValue::Time(decode_time(rx)?),
            FieldType::Long    => TpsValue::Long(rx.read_i32_le()?),
            FieldType::ULong   => TpsValue::ULong(rx.read_u32_le()?),
            FieldType::SReal   => TpsValue::SReal(rx.read_f32_le()?),
            FieldType::Real    => TpsValue::Real(rx.read_f64_le()?),
            FieldType::Decimal => TpsValue::Decimal(decode_decimal(rx.read_bytes(length)?, digits_after_decimal)),
            FieldType::String  => TpsValue::String(latin1(rx.read_bytes(length)?)),
            FieldType::CString => {
                let bytes = rx.read_bytes(length)?;
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                TpsValue::String(latin1(&bytes[..end]))
            }
            FieldType::PString => {
                let len = rx.read_u8()? as usize;
                TpsValue::String(latin1(rx.read_bytes(len)?))
            }
            FieldType::Group   => TpsValue::Group(rx.read_bytes(length)?.to_vec()),
        })
    }
}

/// `[day, month, year (u16 LE)]`.
fn decode_date(rx: &mut RandomAccess) -> Result<Option<NaiveDate>, ValueError> {
    let day = rx.read_u8()?;
    let month = rx.read_u8()?;
    let year = rx.read_u16_le()?;
    if day == 0 && month == 0 && year == 0 {
        return Ok(None);
    }
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .map(Some)
        .ok_or(ValueError::InvalidDate { year, month, day })
}

/// `[centiseconds, seconds, minutes, hours]`; the top bit of hours is unused.
fn decode_time(rx: &mut RandomAccess) -> Result<Option<NaiveTime>, ValueError> {
    let raw = rx.read_u32_le()?;
    if raw == 0 {
        return Ok(None);
    }
    let centiseconds = (raw & 0xFF) as u8;
    let seconds = ((raw >> 8) & 0xFF) as u8;
    let minutes = ((raw >> 16) & 0xFF) as u8;
    let hours = ((raw >> 24) & 0x7F) as u8;
    NaiveTime::from_hms_milli_opt(hours as u32, minutes as u32, seconds as u32, centiseconds as u32 * 10)
        .map(Some)
        .ok_or(ValueError::InvalidTime { hours, minutes, seconds, centiseconds })
}

/// Packed BCD.  The first nibble is the sign (non-zero is negative), the
/// remaining nibbles are digits with `digits_after` of them after the point.
fn decode_decimal(bytes: &[u8], digits_after: usize) -> String {
    let nibbles = hex::encode(bytes);
    if nibbles.is_empty() {
        return "0".into();
    }
    let (sign, digits) = nibbles.split_at(1);
    let (whole, fraction) = digits.split_at(digits.len().saturating_sub(digits_after));

    let whole = whole.trim_start_matches('0');
    let mut out = String::with_capacity(nibbles.len() + 2);
    if sign != "0" {
        out.push('-');
    }
    out.push_str(if whole.is_empty() { "0" } else { whole });
    if digits_after > 0 {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

// ── Rows ─────────────────────────────────────────────────────────────────────

/// Where a field lives inside a data record's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name:                 String,
    pub field_type:           FieldType,
    pub offset:               usize,
    pub length:               usize,
    pub digits_after_decimal: usize,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType, offset: usize, length: usize) -> Self {
        Self { name: name.into(), field_type, offset, length, digits_after_decimal: 0 }
    }

    pub fn with_digits_after_decimal(mut self, digits: usize) -> Self {
        self.digits_after_decimal = digits;
        self
    }
}

/// A decoded data record, handed to mapping layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub record_number: u32,
    pub values:        BTreeMap<String, TpsValue>,
}

impl Row {
    pub fn decode(record_number: u32, payload: &[u8], fields: &[FieldDefinition]) -> Result<Row, ValueError> {
        let mut rx = RandomAccess::from(payload);
        let mut values = BTreeMap::new();
        for field in fields {
            rx.jump_absolute(field.offset)?;
            let value = TpsValue::decode(field.field_type, &mut rx, field.length, field.digits_after_decimal)?;
            values.insert(field.name.clone(), value);
        }
        Ok(Row { record_number, values })
    }

    /// Decode a data record.  Other record kinds are rejected.
    pub fn from_record(record: &TpsRecord, fields: &[FieldDefinition]) -> Result<Row, ValueError> {
        match record.header() {
            RecordHeader::Data { record_number: Some(n), .. } => Self::decode(*n, record.payload(), fields),
            other => Err(ValueError::NotData(other.clone())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TpsValue> {
        self.values.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(field_type: FieldType, bytes: &[u8], length: usize, digits: usize) -> TpsValue {
        let mut rx = RandomAccess::from(bytes);
        let value = TpsValue::decode(field_type, &mut rx, length, digits).unwrap();
        assert!(rx.is_at_end(), "{field_type:?} left {} byte(s)", rx.remaining());
        value
    }

    #[test]
    fn date() {
        assert_eq!(
            decode(FieldType::Date, &[0x10, 0x07, 0xE3, 0x07], 4, 0),
            TpsValue::Date(NaiveDate::from_ymd_opt(2019, 7, 16))
        );
        assert_eq!(decode(FieldType::Date, &[0, 0, 0, 0], 4, 0), TpsValue::Date(None));
    }

    #[test]
    fn invalid_date_is_error() {
        let mut rx = RandomAccess::from(vec![32, 1, 0xE3, 0x07]);
        assert_eq!(
            TpsValue::decode(FieldType::Date, &mut rx, 4, 0),
            Err(ValueError::InvalidDate { year: 2019, month: 1, day: 32 })
        );
    }

    #[test]
    fn time() {
        assert_eq!(
            decode(FieldType::Time, &[5, 30, 15, 13], 4, 0),
            TpsValue::Time(NaiveTime::from_hms_milli_opt(13, 15, 30, 50))
        );
    }

    #[test]
    fn integers_and_reals() {
        assert_eq!(decode(FieldType::Byte, &[0xFE], 1, 0), TpsValue::Byte(254));
        assert_eq!(decode(FieldType::Short, &[0xFE, 0xFF], 2, 0), TpsValue::Short(-2));
        assert_eq!(decode(FieldType::ULong, &[1, 0, 0, 0x80], 4, 0), TpsValue::ULong(0x8000_0001));
        assert_eq!(decode(FieldType::Real, &1.5f64.to_le_bytes(), 8, 0), TpsValue::Real(1.5));
    }

    #[test]
    fn strings() {
        assert_eq!(decode(FieldType::String, b"Joe   ", 6, 0), TpsValue::String("Joe   ".into()));
        assert_eq!(decode(FieldType::CString, b"ab\0cd", 5, 0), TpsValue::String("ab".into()));
        assert_eq!(decode(FieldType::PString, &[3, b'x', 0xE9, b'z'], 0, 0), TpsValue::String("x\u{e9}z".into()));
    }

    #[test]
    fn string_keeps_fixed_width_padding() {
        let padded = format!("{:<16}", "Joe Smith");
        assert_eq!(decode(FieldType::String, b"Joe Smith       ", 16, 0), TpsValue::String(padded));
        assert_eq!(decode(FieldType::String, b"Joe Smith       ", 9, 0), TpsValue::String("Joe Smith".into()));
    }

    #[test]
    fn decimals() {
        assert_eq!(decode(FieldType::Decimal, &[0x00, 0x01, 0x23, 0x45], 4, 2), TpsValue::Decimal("123.45".into()));
        assert_eq!(decode(FieldType::Decimal, &[0xF0, 0x12, 0x34], 3, 2), TpsValue::Decimal("-12.34".into()));
        assert_eq!(decode(FieldType::Decimal, &[0x00, 0x00, 0x05], 3, 3), TpsValue::Decimal("0.005".into()));
        assert_eq!(decode(FieldType::Decimal, &[0x00, 0x42], 2, 0), TpsValue::Decimal("42".into()));
    }

    #[test]
    fn type_codes() {
        assert_eq!(FieldType::from_code(0x0A), Ok(FieldType::Decimal));
        assert_eq!(FieldType::PString.code(), 0x14);
        assert_eq!(FieldType::from_code(0x11), Err(ValueError::UnknownType(0x11)));
        assert_eq!(FieldType::Group.fixed_width(), None);
    }

    #[test]
    fn row_from_fields() {
        let mut payload = 7i32.to_le_bytes().to_vec();
        payload.extend(b"Ann ");
        let fields = [
            FieldDefinition::new("NAME", FieldType::String, 4, 4),
            FieldDefinition::new("ID", FieldType::Long, 0, 4),
        ];
        let row = Row::decode(9, &payload, &fields).unwrap();
        assert_eq!(row.record_number, 9);
        assert_eq!(row.get("ID"), Some(&TpsValue::Long(7)));
        assert_eq!(row.get("NAME"), Some(&TpsValue::String("Ann ".into())));

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["values"]["ID"], 7);
        assert_eq!(json["values"]["NAME"], "Ann ");
    }
}
