//! Incrementally recovered key material.
//!
//! Serialized form (little-endian):
//!
//! ```text
//! count : u32                 always 16
//! slots : count x { valid: u8 (0/1), word: i32 }
//! ```
//!
//! Candidate sets are stored as a u32 candidate count followed by that many
//! serialized keys.

use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block::{Block, BLOCK_WORDS};
use crate::crypto::{decrypt_pair, swap_partner, Key, KeyError};
use crate::recovery::range::CandidateRange;
use crate::recovery::scan::{scan, ScanMode, ScanResults};

/// A key with a validity flag per slot.
///
/// Equality, ordering and hashing are structural over all sixteen words
/// (valid or not) and then all sixteen flags, so values can be used
/// directly as map keys when merging candidate sets.  The word in an
/// invalid slot carries no meaning.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PartialKey {
    key:   [i32; BLOCK_WORDS],
    valid: [bool; BLOCK_WORDS],
}

impl PartialKey {
    /// Sixteen unknown slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy with slot `index` set to `value`.
    pub fn with(&self, index: usize, value: i32) -> Result<PartialKey, KeyError> {
        check_index(index)?;
        let mut next = *self;
        next.key[index] = value;
        next.valid[index] = true;
        Ok(next)
    }

    pub fn is_complete(&self) -> bool {
        self.valid.iter().all(|v| *v)
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.valid.get(index).copied().unwrap_or(false)
    }

    /// The word in slot `index`, if recovered.
    pub fn value(&self, index: usize) -> Option<i32> {
        if self.is_valid(index) { Some(self.key[index]) } else { None }
    }

    /// Unknown slots in ascending order.
    pub fn invalid_indexes(&self) -> Vec<usize> {
        (0..BLOCK_WORDS).filter(|i| !self.valid[*i]).collect()
    }

    pub fn to_key(&self) -> Result<Key, KeyError> {
        if !self.is_complete() {
            return Err(KeyError::IncompleteKey);
        }
        Ok(Key::new(self.key))
    }

    /// Decrypt the two positions touched by key slot `index`.
    pub fn partial_decrypt(&self, index: usize, block: &Block) -> Result<Block, KeyError> {
        check_index(index)?;
        if !self.valid[index] {
            return Err(KeyError::InvalidIndex(index));
        }
        let key_word = self.key[index];
        let partner = swap_partner(key_word);
        let (plain_a, plain_b) = decrypt_pair(key_word, block.value_at(index)?, block.value_at(partner)?);
        block.derive(index, partner, plain_a, plain_b)
    }

    // ── Scans ────────────────────────────────────────────────────────────────

    /// Every key word for slot `index` that turns `encrypted` into
    /// `plaintext` at that position, across the whole key-word space.
    pub fn key_index_scan(
        &self,
        index:     usize,
        encrypted: &Block,
        plaintext: &Block,
    ) -> Result<ScanResults, KeyError> {
        self.key_index_scan_in(index, encrypted, plaintext, &CandidateRange::full())
    }

    pub fn key_index_scan_in(
        &self,
        index:     usize,
        encrypted: &Block,
        plaintext: &Block,
        range:     &CandidateRange,
    ) -> Result<ScanResults, KeyError> {
        scan(self, index, encrypted, plaintext, range, ScanMode::Cross)
    }

    /// Like [`key_index_scan`](Self::key_index_scan) but only key words
    /// whose swap partner is `index` itself.
    pub fn key_index_self_scan(
        &self,
        index:     usize,
        encrypted: &Block,
        plaintext: &Block,
    ) -> Result<ScanResults, KeyError> {
        self.key_index_self_scan_in(index, encrypted, plaintext, &CandidateRange::full())
    }

    pub fn key_index_self_scan_in(
        &self,
        index:     usize,
        encrypted: &Block,
        plaintext: &Block,
        range:     &CandidateRange,
    ) -> Result<ScanResults, KeyError> {
        scan(self, index, encrypted, plaintext, range, ScanMode::SelfSwap)
    }

    // ── Serialization ────────────────────────────────────────────────────────

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), KeyError> {
        writer.write_u32::<LittleEndian>(BLOCK_WORDS as u32)?;
        for (valid, word) in self.valid.iter().zip(self.key.iter()) {
            writer.write_u8(u8::from(*valid))?;
            writer.write_i32::<LittleEndian>(*word)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, KeyError> {
        let count = reader.read_u32::<LittleEndian>()?;
        if count as usize != BLOCK_WORDS {
            return Err(KeyError::InvalidArgument(format!(
                "partial key has {count} slot(s), expected {BLOCK_WORDS}"
            )));
        }
        let mut out = PartialKey::new();
        for i in 0..BLOCK_WORDS {
            out.valid[i] = reader.read_u8()? != 0;
            out.key[i] = reader.read_i32::<LittleEndian>()?;
        }
        Ok(out)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + BLOCK_WORDS * 5);
        // writing into a Vec cannot fail
        let _ = self.write(&mut out);
        out
    }
}

/// Write a candidate set: u32 count, then each key.  The writer is flushed
/// before returning so buffered tails surface their I/O errors here.
pub fn write_candidates<'a, W, I>(mut writer: W, candidates: I) -> Result<(), KeyError>
where
    W: Write,
    I: IntoIterator<Item = &'a PartialKey>,
    I::IntoIter: ExactSizeIterator,
{
    let candidates = candidates.into_iter();
    writer.write_u32::<LittleEndian>(candidates.len() as u32)?;
    for key in candidates {
        key.write(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_candidates<R: Read>(mut reader: R) -> Result<Vec<PartialKey>, KeyError> {
    let count = reader.read_u32::<LittleEndian>()? as usize;
    (0..count).map(|_| PartialKey::read(&mut reader)).collect()
}

fn check_index(index: usize) -> Result<(), KeyError> {
    if index >= BLOCK_WORDS {
        return Err(KeyError::InvalidArgument(format!(
            "key index {index} out of range 0..{BLOCK_WORDS}"
        )));
    }
    Ok(())
}

impl fmt::Debug for PartialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialKey({self})")
    }
}

impl fmt::Display for PartialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..BLOCK_WORDS {
            if i > 0 { f.write_str(" ")?; }
            match self.value(i) {
                Some(w) => write!(f, "{:08x}", w as u32)?,
                None    => f.write_str("????????")?,
            }
        }
        Ok(())
    }
}
