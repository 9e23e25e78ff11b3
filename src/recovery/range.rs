//! Partitionable enumeration of the 32-bit key-word space.
//!
//! A [`CandidateRange`] is a half-open interval of `u64` values inside
//! `[0, 2^32)`; each value is reinterpreted as a signed key word.  Ranges are
//! `Copy`, so restarting an enumeration is just iterating the range again,
//! and [`Candidates::remaining`] hands back the unvisited tail of a
//! partially consumed iterator.

use crate::crypto::KeyError;

/// Number of distinct 32-bit key words.
pub const KEY_SPACE: u64 = 1 << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateRange {
    start: u64,
    end:   u64,
}

impl CandidateRange {
    /// The whole key-word space.
    pub const fn full() -> Self {
        Self { start: 0, end: KEY_SPACE }
    }

    pub fn new(start: u64, end: u64) -> Result<Self, KeyError> {
        if start > end || end > KEY_SPACE {
            return Err(KeyError::InvalidArgument(format!(
                "candidate range {start:#x}..{end:#x} is not inside 0..{KEY_SPACE:#x}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 { self.start }
    pub fn end(&self) -> u64 { self.end }
    pub fn len(&self) -> u64 { self.end - self.start }
    pub fn is_empty(&self) -> bool { self.start == self.end }

    pub fn contains(&self, key_word: i32) -> bool {
        let v = key_word as u32 as u64;
        v >= self.start && v < self.end
    }

    /// Split into at most `parts` contiguous, non-empty ranges that together
    /// cover `self` exactly.  Earlier parts absorb the remainder.
    pub fn split(&self, parts: usize) -> Vec<CandidateRange> {
        let parts = (parts.max(1) as u64).min(self.len().max(1));
        let base = self.len() / parts;
        let extra = self.len() % parts;

        let mut out = Vec::with_capacity(parts as usize);
        let mut start = self.start;
        for i in 0..parts {
            let len = base + u64::from(i < extra);
            if len == 0 { continue; }
            out.push(CandidateRange { start, end: start + len });
            start += len;
        }
        out
    }

    /// Every key word in the range.
    pub fn iter(&self) -> Candidates {
        Candidates { next: self.start, end: self.end, step: 1 }
    }

    /// Only the key words whose swap partner (low nibble) is `partner`.
    pub fn iter_with_partner(&self, partner: usize) -> Candidates {
        let partner = (partner & 0x0F) as u64;
        let mut first = (self.start & !0x0F) | partner;
        if first < self.start {
            first += 16;
        }
        Candidates { next: first, end: self.end, step: 16 }
    }
}

impl Default for CandidateRange {
    fn default() -> Self { Self::full() }
}

impl IntoIterator for CandidateRange {
    type Item = i32;
    type IntoIter = Candidates;
    fn into_iter(self) -> Candidates { self.iter() }
}

/// Lazy iterator over a [`CandidateRange`].
#[derive(Debug, Clone)]
pub struct Candidates {
    next: u64,
    end:  u64,
    step: u64,
}

impl Candidates {
    /// The part of the range not yet yielded, for resuming later.
    pub fn remaining(&self) -> CandidateRange {
        let start = self.next.min(self.end);
        CandidateRange { start, end: self.end }
    }
}

impl Iterator for Candidates {
    type Item = i32;

    #[inline]
    fn next(&mut self) -> Option<i32> {
        if self.next >= self.end {
            return None;
        }
        let v = self.next;
        self.next += self.step;
        Some(v as u32 as i32)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.next >= self.end {
            0
        } else {
            ((self.end - self.next + self.step - 1) / self.step) as usize
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for Candidates {}
