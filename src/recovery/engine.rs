//! Multi-block key recovery.
//!
//! The engine holds one or more known `(encrypted, plaintext)` block pairs
//! and a set of candidate [`PartialKey`]s.  Each candidate carries, per
//! pair, the block as it looks after the decryption steps for its
//! recovered slots have been applied.  Decryption runs slot 15 down to
//! slot 0, so slots are recovered in that order:
//!
//! 1. scan the first pair's intermediate block for the slot,
//! 2. apply each surviving word to every other pair and keep it only when
//!    the plaintext word at the slot matches there too,
//! 3. replace the candidate set with the survivors.
//!
//! Slot 15 is bootstrapped with a self-swap scan, falling back to a cross
//! scan when no self-swapping word fits.  A slot can only be fixed this way
//! while no later (lower) slot swaps into it; when a step leaves no
//! survivor the candidate set is kept unchanged and the caller should
//! supply different known blocks.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::block::{Block, BLOCK_WORDS};
use crate::crypto::{Key, KeyError};
use crate::recovery::partial_key::PartialKey;
use crate::recovery::range::CandidateRange;
use crate::recovery::scan::ScanMode;

/// A ciphertext block with its known plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownBlock {
    pub encrypted: Block,
    pub plaintext: Block,
}

impl KnownBlock {
    pub fn new(encrypted: Block, plaintext: Block) -> Self {
        Self { encrypted, plaintext }
    }

    /// Parse a pair of 64-byte blocks given as hex.
    pub fn from_hex(encrypted: &str, plaintext: &str) -> Result<Self, KeyError> {
        let decode = |s: &str| -> Result<Block, KeyError> {
            let bytes = hex::decode(s.trim())
                .map_err(|e| KeyError::InvalidArgument(format!("bad block hex: {e}")))?;
            Block::from_bytes(&bytes)
        };
        Ok(Self { encrypted: decode(encrypted)?, plaintext: decode(plaintext)? })
    }
}

pub struct KeyRecoveryEngine {
    known:      Vec<KnownBlock>,
    range:      CandidateRange,
    candidates: BTreeMap<PartialKey, Vec<Block>>,
}

impl KeyRecoveryEngine {
    pub fn new(known: Vec<KnownBlock>) -> Result<Self, KeyError> {
        if known.is_empty() {
            return Err(KeyError::InvalidArgument("at least one known block is required".into()));
        }
        let start: Vec<Block> = known.iter().map(|k| k.encrypted).collect();
        let mut candidates = BTreeMap::new();
        candidates.insert(PartialKey::new(), start);
        Ok(Self { known, range: CandidateRange::full(), candidates })
    }

    /// Resume from previously saved candidates.  Their intermediate blocks
    /// are rebuilt by replaying the recovered slots from 15 downwards.
    pub fn resume(known: Vec<KnownBlock>, saved: &[PartialKey]) -> Result<Self, KeyError> {
        let mut engine = Self::new(known)?;
        if saved.is_empty() {
            return Ok(engine);
        }
        let mut candidates = BTreeMap::new();
        for key in saved {
            let mut blocks: Vec<Block> = engine.known.iter().map(|k| k.encrypted).collect();
            for index in (0..BLOCK_WORDS).rev().filter(|i| key.is_valid(*i)) {
                for block in blocks.iter_mut() {
                    *block = key.partial_decrypt(index, block)?;
                }
            }
            candidates.insert(*key, blocks);
        }
        engine.candidates = candidates;
        Ok(engine)
    }

    /// Restrict every scan to `range`.
    pub fn with_range(mut self, range: CandidateRange) -> Self {
        self.range = range;
        self
    }

    pub fn range(&self) -> &CandidateRange { &self.range }

    pub fn known_blocks(&self) -> &[KnownBlock] { &self.known }

    pub fn candidate_count(&self) -> usize { self.candidates.len() }

    pub fn candidates(&self) -> impl ExactSizeIterator<Item = &PartialKey> + '_ {
        self.candidates.keys()
    }

    /// Run one recovery step for `index`.  Returns the number of candidates
    /// that survived; zero leaves the candidate set untouched.
    pub fn scan_index(&mut self, index: usize, mode: ScanMode) -> Result<usize, KeyError> {
        if index >= BLOCK_WORDS {
            return Err(KeyError::InvalidArgument(format!(
                "key index {index} out of range 0..{BLOCK_WORDS}"
            )));
        }

        let first_plain = self.known[0].plaintext;
        let mut next = BTreeMap::new();

        for (key, blocks) in &self.candidates {
            if key.is_valid(index) {
                next.insert(*key, blocks.clone());
                continue;
            }

            let found = match mode {
                ScanMode::Cross    => key.key_index_scan_in(index, &blocks[0], &first_plain, &self.range)?,
                ScanMode::SelfSwap => key.key_index_self_scan_in(index, &blocks[0], &first_plain, &self.range)?,
            };

            'candidate: for (candidate, first) in found {
                let mut advanced = Vec::with_capacity(blocks.len());
                advanced.push(first);
                for (block, known) in blocks.iter().zip(&self.known).skip(1) {
                    let decrypted = candidate.partial_decrypt(index, block)?;
                    if decrypted.value_at(index)? != known.plaintext.value_at(index)? {
                        continue 'candidate;
                    }
                    advanced.push(decrypted);
                }
                next.insert(candidate, advanced);
            }
        }

        if next.is_empty() {
            warn!("slot {index}: no candidate fits every known block ({mode:?})");
            return Ok(0);
        }

        debug!("slot {index}: {} candidate(s) after corroboration", next.len());
        self.candidates = next;
        Ok(self.candidates.len())
    }

    /// Recover every remaining slot, 15 down to 0, and return the keys that
    /// decrypt all known blocks exactly.  An empty result means some slot
    /// could not be fixed from the current known blocks.
    pub fn recover(&mut self) -> Result<Vec<Key>, KeyError> {
        for index in (0..BLOCK_WORDS).rev() {
            if self.candidates.keys().all(|k| k.is_valid(index)) {
                continue;
            }

            let mut survivors = if index == BLOCK_WORDS - 1 {
                self.scan_index(index, ScanMode::SelfSwap)?
            } else {
                0
            };
            if survivors == 0 {
                survivors = self.scan_index(index, ScanMode::Cross)?;
            }
            if survivors == 0 {
                return Ok(Vec::new());
            }
        }

        let keys = self.completed_keys();
        info!("key recovery finished with {} verified key(s)", keys.len());
        Ok(keys)
    }

    /// True once some candidate is complete and reproduces every plaintext.
    pub fn is_complete(&self) -> bool {
        !self.completed_keys().is_empty()
    }

    pub fn completed_keys(&self) -> Vec<Key> {
        self.candidates
            .iter()
            .filter(|(key, blocks)| {
                key.is_complete()
                    && blocks.iter().zip(&self.known).all(|(b, k)| *b == k.plaintext)
            })
            .filter_map(|(key, _)| key.to_key().ok())
            .collect()
    }
}

/// True when `key` decrypts every encrypted block to its plaintext.
pub fn verify(key: &Key, known: &[KnownBlock]) -> bool {
    known.iter().all(|k| key.decrypt_block(&k.encrypted) == k.plaintext)
}
