//! TopSpeed block cipher: key material and decryption.
//!
//! The key is sixteen 32-bit words.  Key word `i` pairs cipher position `i`
//! with a swap partner `j = key[i] & 0x0F`.  One decryption step is:
//!
//! ```text
//! a = cipher[i] - key[i]          (wrapping)
//! b = cipher[j] - key[i]
//! plain[i] = (a & key[i]) | (b & !key[i])
//! plain[j] = (b & key[i]) | (a & !key[i])
//! ```
//!
//! A whole 64-byte block is decrypted by applying the step for key indices
//! 15 down to 0, each step seeing the output of the previous one.
//!
//! Layout of a materialized key: 16 words x 4 bytes, little-endian (64 B).

use std::fmt;
use std::io;

use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use thiserror::Error;

use crate::block::{Block, BLOCK_SIZE, BLOCK_WORDS};

/// Byte length of a materialized key.
pub const KEY_SIZE: usize = BLOCK_WORDS * 4;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Key index {0} has not been recovered")]
    InvalidIndex(usize),
    #[error("Incomplete PartialKey")]
    IncompleteKey,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Swap partner selected by a key word.
#[inline]
pub fn swap_partner(key_word: i32) -> usize {
    (key_word & 0x0F) as usize
}

/// One decryption step for key word `key_word` at `position_a`.
///
/// Returns `(plain_a, plain_b)` for `position_a` and its swap partner.
#[inline]
pub fn decrypt_pair(key_word: i32, cipher_a: i32, cipher_b: i32) -> (i32, i32) {
    let a = cipher_a.wrapping_sub(key_word);
    let b = cipher_b.wrapping_sub(key_word);
    let plain_a = (a & key_word) | (b & !key_word);
    let plain_b = (b & key_word) | (a & !key_word);
    (plain_a, plain_b)
}

// ── Key ──────────────────────────────────────────────────────────────────────

/// A complete 16-word key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    words: [i32; BLOCK_WORDS],
}

impl Key {
    pub fn new(words: [i32; BLOCK_WORDS]) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[i32; BLOCK_WORDS] {
        &self.words
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_SIZE {
            return Err(KeyError::InvalidArgument(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut words = [0i32; BLOCK_WORDS];
        LittleEndian::read_i32_into(bytes, &mut words);
        Ok(Self { words })
    }

    /// Parse 128 hex digits (the 64-byte little-endian form).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| KeyError::InvalidArgument(format!("bad key hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        let mut out = [0u8; KEY_SIZE];
        for (chunk, w) in out.chunks_exact_mut(4).zip(self.words.iter()) {
            LittleEndian::write_i32(chunk, *w);
        }
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decrypt one block: steps for key indices 15 down to 0.
    pub fn decrypt_block(&self, block: &Block) -> Block {
        let mut values = *block.values();
        for index in (0..BLOCK_WORDS).rev() {
            let key_word = self.words[index];
            let partner = swap_partner(key_word);
            let (plain_a, plain_b) = decrypt_pair(key_word, values[index], values[partner]);
            values[index] = plain_a;
            values[partner] = plain_b;
        }
        Block::new(values)
    }

    /// Decrypt every whole 64-byte block of `data` in place.  A trailing
    /// partial block is left untouched.
    pub fn decrypt(&self, data: &mut [u8]) {
        let mut blocks = 0usize;
        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            let mut values = [0i32; BLOCK_WORDS];
            LittleEndian::read_i32_into(chunk, &mut values);
            let plain = self.decrypt_block(&Block::new(values));
            LittleEndian::write_i32_into(plain.values(), chunk);
            blocks += 1;
        }
        trace!("decrypted {blocks} block(s)");
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, w) in self.words.iter().enumerate() {
            if i > 0 { f.write_str(" ")?; }
            write!(f, "{:08x}", *w as u32)?;
        }
        Ok(())
    }
}
