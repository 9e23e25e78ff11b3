//! The TopSpeed file header.
//!
//! # On-disk layout
//!
//! ```text
//! Offset  Size     Field
//!      0     4     address                 always 0
//!      4     2     header_size             LE
//!      6     4     file_length_1           LE
//!     10     4     file_length_2           LE
//!     14     4     magic                   "tOpS"
//!     18     2     reserved                zero
//!     20     4     last_issued_row         BE
//!     24     4     changes                 LE
//!     28     4     management_page_ref     LE
//!   0x20   240     page_start[60]          LE page references
//!  0x110   240     page_end[60]            LE page references
//! ```
//!
//! A page reference `r` addresses file offset `(r << 8) + 0x200`.

use log::warn;
use thiserror::Error;

use crate::binary::{CursorError, RandomAccess};

pub const MAGIC: &[u8; 4] = b"tOpS";
pub const PAGE_RANGES: usize = 60;
/// Bytes covered by the header; page references start counting here.
pub const HEADER_SIZE: usize = 0x200;
/// Pages start on multiples of this.
pub const PAGE_ALIGNMENT: usize = 0x100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Not a TopSpeed file: header address is {0:#x}, expected 0")]
    NonZeroAddress(u32),
    #[error("Invalid magic number {0:02x?}, expected \"tOpS\"")]
    InvalidMagic([u8; 4]),
    #[error("File header: {0}")]
    Cursor(#[from] CursorError),
}

/// File offset of a page reference.
pub fn page_offset(reference: u32) -> u64 {
    ((reference as u64) << 8) + HEADER_SIZE as u64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub header_size:         u16,
    pub file_length_1:       u32,
    pub file_length_2:       u32,
    pub last_issued_row:     u32,
    pub changes:             u32,
    pub management_page_ref: u32,
    pub page_start:          [u32; PAGE_RANGES],
    pub page_end:            [u32; PAGE_RANGES],
}

impl FileHeader {
    /// Parse the header at the cursor position.
    pub fn read(rx: &mut RandomAccess) -> Result<Self, HeaderError> {
        let address = rx.read_u32_le()?;
        if address != 0 {
            return Err(HeaderError::NonZeroAddress(address));
        }
        let header_size = rx.read_u16_le()?;
        let file_length_1 = rx.read_u32_le()?;
        let file_length_2 = rx.read_u32_le()?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(rx.read_bytes(4)?);
        if &magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }

        let reserved = rx.read_u16_le()?;
        if reserved != 0 {
            warn!("file header: reserved field is {reserved:#06x}");
        }
        let last_issued_row = rx.read_u32_be()?;
        let changes = rx.read_u32_le()?;
        let management_page_ref = rx.read_u32_le()?;

        let mut page_start = [0u32; PAGE_RANGES];
        for slot in page_start.iter_mut() {
            *slot = rx.read_u32_le()?;
        }
        let mut page_end = [0u32; PAGE_RANGES];
        for slot in page_end.iter_mut() {
            *slot = rx.read_u32_le()?;
        }

        Ok(Self {
            header_size,
            file_length_1,
            file_length_2,
            last_issued_row,
            changes,
            management_page_ref,
            page_start,
            page_end,
        })
    }

    /// Non-empty `[start, end)` file offset ranges holding pages.
    pub fn page_ranges(&self) -> Vec<(u64, u64)> {
        self.page_start
            .iter()
            .zip(self.page_end.iter())
            .map(|(s, e)| (page_offset(*s), page_offset(*e)))
            .filter(|(s, e)| s < e)
            .collect()
    }
}
