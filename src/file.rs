//! Whole-file access.
//!
//! [`TpsFile`] parses the file header and every page header up front.  Page
//! bodies stay compressed until their records are asked for; see
//! [`crate::page`].
//!
//! ```no_run
//! use topspeed::file::TpsFile;
//!
//! let mut file = TpsFile::open("CUSTOMER.TPS")?;
//! for record in file.records()? {
//!     println!("{:?}", record.header());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::binary::RandomAccess;
use crate::crypto::Key;
use crate::header::{FileHeader, HeaderError, PAGE_ALIGNMENT};
use crate::page::{Page, PageError};
use crate::record::{RecordHeader, TpsRecord};

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("Page at {offset:#x}: {source}")]
    Page { offset: u64, #[source] source: PageError },
}

pub struct TpsFile {
    header: FileHeader,
    pages:  Vec<Page>,
}

impl TpsFile {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FileError> {
        let path = path.as_ref();
        debug!("opening {}", path.display());
        Self::from_bytes(fs::read(path)?)
    }

    /// Open a file encrypted with `key`.
    pub fn open_encrypted<P: AsRef<Path>>(path: P, key: &Key) -> Result<Self, FileError> {
        let path = path.as_ref();
        debug!("opening {} (encrypted)", path.display());
        Self::from_encrypted_bytes(fs::read(path)?, key)
    }

    /// Decrypt every whole 64-byte block, then parse.
    pub fn from_encrypted_bytes(mut bytes: Vec<u8>, key: &Key) -> Result<Self, FileError> {
        key.decrypt(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FileError> {
        let mut rx = RandomAccess::from(bytes);
        let header = FileHeader::read(&mut rx)?;
        let pages = read_pages(&header, &mut rx)?;
        debug!("loaded {} page(s) from {} byte(s)", pages.len(), rx.len());
        Ok(Self { header, pages })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn header(&self) -> &FileHeader { &self.header }

    pub fn pages(&self) -> &[Page] { &self.pages }

    pub fn pages_mut(&mut self) -> &mut [Page] { &mut self.pages }

    /// Every record of every page, in page order.
    pub fn records(&mut self) -> Result<Vec<TpsRecord>, FileError> {
        let mut out = Vec::new();
        for page in self.pages.iter_mut() {
            let offset = page.address() as u64;
            let records = page.records().map_err(|source| FileError::Page { offset, source })?;
            out.extend_from_slice(records);
        }
        Ok(out)
    }

    /// Table number to table name, from the table-name records.
    pub fn table_names(&mut self) -> Result<BTreeMap<u32, String>, FileError> {
        let mut names = BTreeMap::new();
        for record in self.records()? {
            if let RecordHeader::TableName { name } = record.header() {
                match record.payload().get(..4) {
                    Some(b) => {
                        names.insert(u32::from_be_bytes([b[0], b[1], b[2], b[3]]), name.clone());
                    }
                    None => warn!("table name record {name:?} has no table number"),
                }
            }
        }
        Ok(names)
    }

    /// Decompress every page body ahead of use.
    pub fn materialize(&mut self) -> Result<(), FileError> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            let results: Vec<Result<(), FileError>> = self
                .pages
                .par_iter_mut()
                .map(|page| {
                    let offset = page.address() as u64;
                    page.uncompressed_data()
                        .map(|_| ())
                        .map_err(|source| FileError::Page { offset, source })
                })
                .collect();

            // Surface the first error if any.
            for r in results {
                r?;
            }
        }

        #[cfg(not(feature = "parallel"))]
        for page in self.pages.iter_mut() {
            let offset = page.address() as u64;
            page.uncompressed_data().map_err(|source| FileError::Page { offset, source })?;
        }

        Ok(())
    }

    /// Drop every decompressed body and record cache.
    pub fn flush(&mut self) {
        for page in self.pages.iter_mut() {
            page.flush();
        }
    }
}

/// Walk each page range on 0x100 boundaries.  A page is recognised by its
/// address field matching its own offset; anything else is skipped.
fn read_pages(header: &FileHeader, rx: &mut RandomAccess) -> Result<Vec<Page>, FileError> {
    let mut pages = Vec::new();
    let file_len = rx.len() as u64;

    for (start, end) in header.page_ranges() {
        let end = end.min(file_len);
        let mut offset = start;
        while offset + 4 <= end {
            rx.jump_absolute(offset as usize).map_err(|e| FileError::Page { offset, source: e.into() })?;
            let address = rx.scoped().read_u32_le().map_err(|e| FileError::Page { offset, source: e.into() })?;

            if address as u64 != offset {
                trace!("no page at {offset:#x} (address field {address:#x})");
                offset += PAGE_ALIGNMENT as u64;
                continue;
            }

            let page = Page::read(rx).map_err(|source| FileError::Page { offset, source })?;
            trace!("{page}");
            offset = align_up(offset + page.page_size() as u64);
            pages.push(page);
        }
    }
    Ok(pages)
}

fn align_up(offset: u64) -> u64 {
    let a = PAGE_ALIGNMENT as u64;
    offset.div_ceil(a) * a
}
