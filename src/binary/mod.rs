//! Random-access byte cursor shared by the page, record and value decoders.
//!
//! A [`RandomAccess`] is a window over a reference-counted byte buffer with a
//! movable read position.  Taking a sub-window with [`RandomAccess::read`]
//! never copies: both windows share the same allocation.
//!
//! # Mark / restore
//! Positions are saved on a LIFO stack with [`push_position`] and restored
//! with [`pop_position`].  [`RandomAccess::scoped`] wraps the pair in a
//! [`PositionGuard`] that restores on drop, so the cursor is back where it
//! started on every exit path, including `?` early returns.
//!
//! # Endianness
//! TopSpeed is little-endian throughout, except for table and record numbers
//! inside record headers which are big-endian.  Both are exposed.
//!
//! [`push_position`]: RandomAccess::push_position
//! [`pop_position`]: RandomAccess::pop_position

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("Unexpected end of data at position {position}: wanted {wanted} byte(s), {available} available")]
    UnexpectedEof { position: usize, wanted: usize, available: usize },
    #[error("Position {position} is outside the window of {len} byte(s)")]
    OutOfRange { position: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, CursorError>;

// ── RandomAccess ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RandomAccess {
    data:     Arc<[u8]>,
    base:     usize,
    len:      usize,
    position: usize,
    marks:    Vec<usize>,
}

impl RandomAccess {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let data: Arc<[u8]> = data.into();
        let len = data.len();
        Self { data, base: 0, len, position: 0, marks: Vec::new() }
    }

    /// Length of the window in bytes.
    #[inline]
    pub fn len(&self) -> usize { self.len }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    #[inline]
    pub fn position(&self) -> usize { self.position }

    #[inline]
    pub fn remaining(&self) -> usize { self.len - self.position }

    #[inline]
    pub fn is_at_end(&self) -> bool { self.position >= self.len }

    /// The whole window, independent of the read position.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.base..self.base + self.len]
    }

    /// Bytes from the read position to the end of the window.
    pub fn remaining_slice(&self) -> &[u8] {
        &self.as_slice()[self.position..]
    }

    pub fn to_vec(&self) -> Vec<u8> { self.as_slice().to_vec() }

    pub fn jump_absolute(&mut self, position: usize) -> Result<()> {
        if position > self.len {
            return Err(CursorError::OutOfRange { position, len: self.len });
        }
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    // ── Mark / restore ───────────────────────────────────────────────────────

    pub fn push_position(&mut self) {
        self.marks.push(self.position);
    }

    /// Restore the most recently pushed position.  Returns `false` when the
    /// mark stack is empty, leaving the position untouched.
    pub fn pop_position(&mut self) -> bool {
        match self.marks.pop() {
            Some(p) => { self.position = p; true }
            None    => false,
        }
    }

    /// Push the current position and return a guard that pops it on drop.
    pub fn scoped(&mut self) -> PositionGuard<'_> {
        self.push_position();
        PositionGuard { cursor: self }
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        let available = self.remaining();
        if count > available {
            return Err(CursorError::UnexpectedEof {
                position: self.position,
                wanted:   count,
                available,
            });
        }
        let start = self.base + self.position;
        self.position += count;
        Ok(&self.data[start..start + count])
    }

    /// Take the next `count` bytes as a new window sharing this buffer.
    pub fn read(&mut self, count: usize) -> Result<RandomAccess> {
        self.take(count)?;
        Ok(RandomAccess {
            data:     Arc::clone(&self.data),
            base:     self.base + self.position - count,
            len:      count,
            position: 0,
            marks:    Vec::new(),
        })
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&[u8]> {
        self.take(count)
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.remaining_slice().first().copied().ok_or(CursorError::UnexpectedEof {
            position:  self.position,
            wanted:    1,
            available: 0,
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32_le(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64_le(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }
}

impl fmt::Debug for RandomAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomAccess")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("position", &self.position)
            .field("marks", &self.marks.len())
            .finish()
    }
}

impl From<Vec<u8>> for RandomAccess {
    fn from(v: Vec<u8>) -> Self { Self::new(v) }
}

impl From<&[u8]> for RandomAccess {
    fn from(v: &[u8]) -> Self { Self::new(v) }
}

// ── PositionGuard ────────────────────────────────────────────────────────────

/// Scoped mark created by [`RandomAccess::scoped`].  Dereferences to the
/// cursor; the saved position is restored when the guard goes out of scope.
pub struct PositionGuard<'a> {
    cursor: &'a mut RandomAccess,
}

impl Deref for PositionGuard<'_> {
    type Target = RandomAccess;
    fn deref(&self) -> &RandomAccess { &*self.cursor }
}

impl DerefMut for PositionGuard<'_> {
    fn deref_mut(&mut self) -> &mut RandomAccess { &mut *self.cursor }
}

impl Drop for PositionGuard<'_> {
    fn drop(&mut self) {
        self.cursor.pop_position();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_and_big_endian() {
        let mut rx = RandomAccess::from(vec![0x10, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x2A]);
        assert_eq!(rx.read_u32_le().unwrap(), 0x10);
        assert_eq!(rx.read_u16_le().unwrap(), 20);
        assert_eq!(rx.read_u32_be().unwrap(), 0x2A);
        assert!(rx.is_at_end());
    }

    #[test]
    fn short_read_reports_position_and_leaves_cursor() {
        let mut rx = RandomAccess::from(vec![1, 2, 3]);
        rx.read_u8().unwrap();
        let err = rx.read_u32_le().unwrap_err();
        assert_eq!(err, CursorError::UnexpectedEof { position: 1, wanted: 4, available: 2 });
        assert_eq!(rx.position(), 1);
    }

    #[test]
    fn sub_window_is_independent() {
        let mut rx = RandomAccess::from(vec![0xAA, 1, 2, 3, 0xBB]);
        rx.read_u8().unwrap();
        let mut inner = rx.read(3).unwrap();
        assert_eq!(inner.len(), 3);
        assert_eq!(inner.as_slice(), &[1, 2, 3]);
        assert_eq!(inner.read_u8().unwrap(), 1);
        assert_eq!(rx.read_u8().unwrap(), 0xBB);
    }

    #[test]
    fn nested_guards_restore_in_lifo_order() {
        let mut rx = RandomAccess::from(vec![0u8; 8]);
        rx.skip(1).unwrap();
        {
            let mut outer = rx.scoped();
            outer.skip(2).unwrap();
            {
                let mut inner = outer.scoped();
                inner.skip(3).unwrap();
                assert_eq!(inner.position(), 6);
            }
            assert_eq!(outer.position(), 3);
        }
        assert_eq!(rx.position(), 1);
        assert!(!rx.pop_position());
    }

    #[test]
    fn guard_restores_on_error_path() {
        fn fails(rx: &mut RandomAccess) -> Result<u32> {
            let mut scope = rx.scoped();
            scope.skip(2)?;
            scope.read_u32_le()
        }
        let mut rx = RandomAccess::from(vec![0u8; 4]);
        assert!(fails(&mut rx).is_err());
        assert_eq!(rx.position(), 0);
    }
}
