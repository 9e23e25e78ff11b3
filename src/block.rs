use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::crypto::KeyError;

/// Words per cipher block.
pub const BLOCK_WORDS: usize = 16;
/// Bytes per cipher block.
pub const BLOCK_SIZE: usize = BLOCK_WORDS * 4;

/// Sixteen signed 32-bit words; a word's index is also its cipher position.
///
/// Blocks are plain values: [`Block::derive`] returns a new block and never
/// touches the receiver.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Block {
    values: [i32; BLOCK_WORDS],
}

impl Block {
    pub fn new(values: [i32; BLOCK_WORDS]) -> Self {
        Self { values }
    }

    /// Decode 64 little-endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != BLOCK_SIZE {
            return Err(KeyError::InvalidArgument(format!(
                "block must be {BLOCK_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut values = [0i32; BLOCK_WORDS];
        LittleEndian::read_i32_into(bytes, &mut values);
        Ok(Self { values })
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        LittleEndian::write_i32_into(&self.values, &mut out);
        out
    }

    pub fn values(&self) -> &[i32; BLOCK_WORDS] {
        &self.values
    }

    pub fn value_at(&self, position: usize) -> Result<i32, KeyError> {
        self.values
            .get(position)
            .copied()
            .ok_or_else(|| KeyError::InvalidArgument(format!("block position {position} out of range")))
    }

    /// Copy of this block with `position_a` and `position_b` replaced.
    /// When both positions are equal, `value_b` wins.
    pub fn derive(
        &self,
        position_a: usize,
        position_b: usize,
        value_a:    i32,
        value_b:    i32,
    ) -> Result<Block, KeyError> {
        for p in [position_a, position_b] {
            if p >= BLOCK_WORDS {
                return Err(KeyError::InvalidArgument(format!("block position {p} out of range")));
            }
        }
        let mut values = self.values;
        values[position_a] = value_a;
        values[position_b] = value_b;
        Ok(Block { values })
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({self})")
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 { f.write_str(" ")?; }
            write!(f, "{:08x}", *v as u32)?;
        }
        Ok(())
    }
}
