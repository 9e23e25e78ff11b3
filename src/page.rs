//! TopSpeed pages.
//!
//! # On-disk layout (little-endian)
//!
//! ```text
//! Offset  Size  Field
//!      0     4  address                      file offset of this page
//!      4     2  page_size                    bytes on disk, header included
//!      6     2  page_size_uncompressed
//!      8     2  page_size_uncompressed_without_header
//!     10     2  record_count
//!     12     1  flags                        0x00 = record page
//!     13     …  body (page_size - 13 bytes, run-length encoded when
//!               page_size != page_size_uncompressed and flags == 0)
//! ```
//!
//! # Lazy state
//! A page starts [`PageState::Fresh`]: only the compressed body is held.
//! The first call needing the body expands it and moves the page to
//! [`PageState::Materialized`]; records are decoded on demand and cached
//! there.  [`Page::flush`] drops both and returns to `Fresh`.  The compressed
//! body is kept, so every later access yields the same bytes and records.
//!
//! A page is not meant to be shared between threads while materializing;
//! distinct pages are independent.

use std::fmt;

use log::{debug, warn};
use thiserror::Error;

use crate::binary::{CursorError, RandomAccess};
use crate::codec::{self, RleError};
use crate::record::{RecordDecoder, RecordError, TpsRecordDecoder};

/// Bytes before the body.
pub const PAGE_HEADER_SIZE: usize = 13;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("Page header: {0}")]
    Header(#[from] CursorError),
    #[error("Page size {page_size} at {address:#010x} is smaller than the 13-byte header")]
    InvalidPageSize { address: u32, page_size: u16 },
    #[error(
        "Bad RLE data block in TpsPage({address:#010x},{page_size:#06x},{page_size_uncompressed:#06x},\
         {page_size_uncompressed_without_header:#06x},{record_count:#06x},{flags:#04x}): {source}"
    )]
    RunLengthEncoding {
        address:                               u32,
        page_size:                             u16,
        page_size_uncompressed:                u16,
        page_size_uncompressed_without_header: u16,
        record_count:                          u16,
        flags:                                 u8,
        #[source]
        source:                                RleError,
    },
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Lazily computed contents of a page.
#[derive(Debug, Clone)]
pub enum PageState<R> {
    Fresh,
    Materialized {
        data:    RandomAccess,
        /// `None` until records are first requested.
        records: Option<Vec<R>>,
    },
}

pub struct Page<D: RecordDecoder = TpsRecordDecoder> {
    address:                               u32,
    page_size:                             u16,
    page_size_uncompressed:                u16,
    page_size_uncompressed_without_header: u16,
    record_count:                          u16,
    flags:                                 u8,
    compressed:                            RandomAccess,
    decoder:                               D,
    state:                                 PageState<D::Record>,
}

impl Page<TpsRecordDecoder> {
    /// Parse a page header at the cursor position and take its body.
    pub fn read(rx: &mut RandomAccess) -> Result<Self, PageError> {
        Self::read_with(rx, TpsRecordDecoder)
    }
}

impl<D: RecordDecoder> Page<D> {
    pub fn read_with(rx: &mut RandomAccess, decoder: D) -> Result<Self, PageError> {
        let address = rx.read_u32_le()?;
        let page_size = rx.read_u16_le()?;
        if (page_size as usize) < PAGE_HEADER_SIZE {
            return Err(PageError::InvalidPageSize { address, page_size });
        }

        let mut header = rx.read(page_size as usize - 6)?;
        let page_size_uncompressed = header.read_u16_le()?;
        let page_size_uncompressed_without_header = header.read_u16_le()?;
        let record_count = header.read_u16_le()?;
        let flags = header.read_u8()?;
        let compressed = header.read(page_size as usize - PAGE_HEADER_SIZE)?;

        Ok(Page {
            address,
            page_size,
            page_size_uncompressed,
            page_size_uncompressed_without_header,
            record_count,
            flags,
            compressed,
            decoder,
            state: PageState::Fresh,
        })
    }

    pub fn address(&self) -> u32 { self.address }
    pub fn page_size(&self) -> u16 { self.page_size }
    pub fn page_size_uncompressed(&self) -> u16 { self.page_size_uncompressed }
    pub fn page_size_uncompressed_without_header(&self) -> u16 { self.page_size_uncompressed_without_header }
    pub fn record_count(&self) -> u16 { self.record_count }
    pub fn flags(&self) -> u8 { self.flags }
    pub fn state(&self) -> &PageState<D::Record> { &self.state }

    pub fn is_flushed(&self) -> bool {
        matches!(self.state, PageState::Fresh)
    }

    /// Whether the body is run-length encoded.
    pub fn is_compressed(&self) -> bool {
        self.page_size != self.page_size_uncompressed && self.flags == 0
    }

    /// The raw (still compressed) body.
    pub fn compressed_data(&self) -> &RandomAccess { &self.compressed }

    // ── Decompression ────────────────────────────────────────────────────────

    fn decompress(&mut self) -> Result<RandomAccess, PageError> {
        if !self.is_compressed() {
            return Ok(self.compressed.clone());
        }

        let target = (self.page_size_uncompressed as usize).saturating_sub(PAGE_HEADER_SIZE);
        let expanded = {
            let mut rx = self.compressed.scoped();
            codec::expand(&mut rx, target)
        };
        let expanded = expanded.map_err(|source| PageError::RunLengthEncoding {
            address:                               self.address,
            page_size:                             self.page_size,
            page_size_uncompressed:                self.page_size_uncompressed,
            page_size_uncompressed_without_header: self.page_size_uncompressed_without_header,
            record_count:                          self.record_count,
            flags:                                 self.flags,
            source,
        })?;

        if expanded.len() != target {
            warn!("{self}: expanded to {} byte(s), header declares {target}", expanded.len());
        }
        debug!("{self}: expanded {} -> {} byte(s)", self.compressed.len(), expanded.len());
        Ok(RandomAccess::from(expanded))
    }

    /// Expand the body if needed and hand out the decoder together with the
    /// materialized body and record cache.
    fn materialize(&mut self) -> Result<(&D, &mut RandomAccess, &mut Option<Vec<D::Record>>), PageError> {
        loop {
            match self.state {
                PageState::Materialized { ref mut data, ref mut records } => {
                    return Ok((&self.decoder, data, records));
                }
                PageState::Fresh => {
                    let data = self.decompress()?;
                    self.state = PageState::Materialized { data, records: None };
                }
            }
        }
    }

    /// The decompressed body, expanding it on first use.
    pub fn uncompressed_data(&mut self) -> Result<&RandomAccess, PageError> {
        let (_, data, _) = self.materialize()?;
        Ok(&*data)
    }

    // ── Records ──────────────────────────────────────────────────────────────

    /// Decode the record chain again, replacing any cached records.
    ///
    /// Pages with non-zero flags hold no records.  Decoding stops at the
    /// end of the body or after `record_count` records, whichever comes
    /// first.  On error the cache is left empty and the next call retries.
    pub fn parse_records(&mut self) -> Result<&[D::Record], PageError> {
        let flags = self.flags;
        let wanted = self.record_count as usize;
        let (decoder, data, records) = self.materialize()?;
        *records = None;

        let mut parsed = Vec::new();
        if flags == 0x00 {
            let mut rx = data.scoped();
            while !rx.is_at_end() && parsed.len() < wanted {
                let next = match parsed.last() {
                    None       => decoder.decode_first(&mut rx)?,
                    Some(prev) => decoder.decode_next(prev, &mut rx)?,
                };
                parsed.push(next);
            }
        }

        Ok(records.insert(parsed).as_slice())
    }

    /// Cached records, decoding them on first use.
    pub fn records(&mut self) -> Result<&[D::Record], PageError> {
        match self.state {
            PageState::Materialized { records: Some(ref records), .. } => Ok(records.as_slice()),
            _ => self.parse_records(),
        }
    }

    /// Drop the decompressed body and cached records.
    pub fn flush(&mut self) {
        if !self.is_flushed() {
            debug!("{self}: flushed");
        }
        self.state = PageState::Fresh;
    }
}

impl<D: RecordDecoder> fmt::Display for Page<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TpsPage({:08X},{:04X},{:04X},{:04X},{:04X},{:02X})",
            self.address,
            self.page_size,
            self.page_size_uncompressed,
            self.page_size_uncompressed_without_header,
            self.record_count,
            self.flags,
        )
    }
}

impl<D: RecordDecoder> fmt::Debug for Page<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
