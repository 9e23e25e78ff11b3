//! Known-plaintext scan for one key slot.
//!
//! For a target slot `i` every candidate word `k` in a [`CandidateRange`] is
//! tried: with `j = k & 0x0F`, the decryption step is applied to cipher
//! positions `i` and `j` and `k` survives when the result at `i` equals the
//! known plaintext word.  Survivors are returned as a map from the extended
//! [`PartialKey`] to the block with both positions decrypted.
//!
//! Unrelated words can satisfy the equation by coincidence, so a scan
//! returns a set.  Intersecting against further known blocks narrows it.
//! An empty result is not an error: it means the block pair cannot fix the
//! slot, and the caller should try another one.
//!
//! # Parallelism
//! With the `parallel` feature the range is split into
//! `PARTITIONS_PER_THREAD` parts per Rayon worker and the per-part maps are
//! merged.  Candidate order never matters, so the merged map is identical
//! to a sequential scan.

use std::collections::BTreeMap;

use log::{debug, trace};

use crate::block::{Block, BLOCK_WORDS};
use crate::crypto::{decrypt_pair, swap_partner, KeyError};
use crate::recovery::partial_key::PartialKey;
use crate::recovery::range::CandidateRange;

/// Surviving candidates keyed by the extended partial key.
pub type ScanResults = BTreeMap<PartialKey, Block>;

/// Parts per worker thread; keeps workers busy when some parts finish early.
pub const PARTITIONS_PER_THREAD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Any swap partner.
    Cross,
    /// Only words whose swap partner is the target slot itself.
    SelfSwap,
}

pub(crate) fn scan(
    base:      &PartialKey,
    index:     usize,
    encrypted: &Block,
    plaintext: &Block,
    range:     &CandidateRange,
    mode:      ScanMode,
) -> Result<ScanResults, KeyError> {
    if index >= BLOCK_WORDS {
        return Err(KeyError::InvalidArgument(format!(
            "key index {index} out of range 0..{BLOCK_WORDS}"
        )));
    }
    debug!("scanning slot {index} ({mode:?}) over {:#x}..{:#x}", range.start(), range.end());

    #[cfg(feature = "parallel")]
    let results = {
        use rayon::prelude::*;

        let parts = range.split(rayon::current_num_threads() * PARTITIONS_PER_THREAD);
        let partials: Vec<Result<ScanResults, KeyError>> = parts
            .par_iter()
            .map(|part| scan_partition(base, index, encrypted, plaintext, part, mode))
            .collect();

        // Surface the first error if any.
        let mut merged = ScanResults::new();
        for p in partials {
            merged.extend(p?);
        }
        merged
    };

    #[cfg(not(feature = "parallel"))]
    let results = scan_partition(base, index, encrypted, plaintext, range, mode)?;

    debug!("slot {index}: {} candidate(s)", results.len());
    Ok(results)
}

fn scan_partition(
    base:      &PartialKey,
    index:     usize,
    encrypted: &Block,
    plaintext: &Block,
    range:     &CandidateRange,
    mode:      ScanMode,
) -> Result<ScanResults, KeyError> {
    let cipher = encrypted.values();
    let plain = plaintext.value_at(index)?;
    let candidates = match mode {
        ScanMode::Cross    => range.iter(),
        ScanMode::SelfSwap => range.iter_with_partner(index),
    };

    let mut results = ScanResults::new();
    for key_word in candidates {
        let partner = swap_partner(key_word);
        let (plain_a, plain_b) = decrypt_pair(key_word, cipher[index], cipher[partner]);
        if plain_a == plain {
            trace!("slot {index}: candidate {:08x} (partner {partner})", key_word as u32);
            let block = encrypted.derive(index, partner, plain_a, plain_b)?;
            results.insert(base.with(index, key_word)?, block);
        }
    }
    Ok(results)
}
