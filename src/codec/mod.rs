//! TopSpeed run-length codec.
//!
//! Page bodies are stored as a stream of `(skip, repeat)` pairs:
//!
//! ```text
//! skip    : count of literal bytes that follow (1..=0x7FFF)
//! literal : <skip bytes copied verbatim>
//! repeat  : count of extra copies of the last literal byte (0..=0x7FFF)
//! ```
//!
//! Both counts use the same variable-length form: a single byte when it is
//! `<= 0x7F`, otherwise a second byte follows and the count is
//! `(second << 7) | (first & 0x7F)`.  The repeat count is omitted when the
//! literal run ends the input.  A zero skip is never written by the encoder
//! and is rejected.
//!
//! Only expansion is provided; pages are never written back.

use log::trace;
use thiserror::Error;

use crate::binary::RandomAccess;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RleError {
    #[error("Bad RLE skip (0x00) at offset {offset}")]
    ZeroSkip { offset: usize },
    #[error("RLE run at offset {offset} wants {wanted} byte(s), only {available} available")]
    Truncated { offset: usize, wanted: usize, available: usize },
}

/// Expand the run-length encoded bytes from the cursor position to the end
/// of its window.
///
/// `target_length` is the size the caller expects; it sizes the output
/// allocation but is not enforced, since page headers are not always
/// consistent with the stream.  The cursor is left at the end of the window
/// on success and at the failing offset on error.
pub fn expand(rx: &mut RandomAccess, target_length: usize) -> Result<Vec<u8>, RleError> {
    let mut out = Vec::with_capacity(target_length);

    while !rx.is_at_end() {
        let offset = rx.position();
        let skip = read_count(rx)?;
        if skip == 0 {
            return Err(RleError::ZeroSkip { offset });
        }

        let available = rx.remaining();
        let literal = rx.read_bytes(skip).map_err(|_| RleError::Truncated {
            offset,
            wanted: skip,
            available,
        })?;
        out.extend_from_slice(literal);

        if !rx.is_at_end() {
            // non-empty: skip > 0
            let repeated = out[out.len() - 1];
            let repeats = read_count(rx)?;
            out.resize(out.len() + repeats, repeated);
            trace!("rle: {skip} literal byte(s), {repeats} x {repeated:#04x}");
        }
    }

    Ok(out)
}

fn read_count(rx: &mut RandomAccess) -> Result<usize, RleError> {
    let offset = rx.position();
    let truncated = RleError::Truncated { offset, wanted: 1, available: 0 };

    let first = rx.read_u8().map_err(|_| truncated.clone())? as usize;
    if first <= 0x7F {
        return Ok(first);
    }
    let second = rx.read_u8().map_err(|_| truncated)? as usize;
    Ok((second << 7) | (first & 0x7F))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_bytes(bytes: &[u8]) -> Result<Vec<u8>, RleError> {
        let mut rx = RandomAccess::from(bytes);
        expand(&mut rx, 0)
    }

    #[test]
    fn literal_then_repeat() {
        let out = expand_bytes(&[0x03, b'a', b'b', b'c', 0x02, 0x01, b'z']).unwrap();
        assert_eq!(out, b"abcccz");
    }

    #[test]
    fn trailing_literal_has_no_repeat_count() {
        let out = expand_bytes(&[0x02, 0x10, 0x20]).unwrap();
        assert_eq!(out, vec![0x10, 0x20]);
    }

    #[test]
    fn zero_repeat_is_allowed() {
        let out = expand_bytes(&[0x01, 0x41, 0x00, 0x01, 0x42]).unwrap();
        assert_eq!(out, b"AB");
    }

    #[test]
    fn two_byte_counts() {
        // skip = (0x01 << 7) | 0x00 = 128
        let mut input = vec![0x80, 0x01];
        input.extend(std::iter::repeat(0x55).take(128));
        // repeat = (0x02 << 7) | 0x05 = 261
        input.extend([0x85, 0x02]);
        let out = expand_bytes(&input).unwrap();
        assert_eq!(out.len(), 128 + 261);
        assert!(out.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn zero_skip_is_rejected() {
        let err = expand_bytes(&[0x01, 0x41, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, RleError::ZeroSkip { offset: 3 });
    }

    #[test]
    fn short_literal_is_rejected() {
        let err = expand_bytes(&[0x05, 1, 2]).unwrap_err();
        assert_eq!(err, RleError::Truncated { offset: 0, wanted: 5, available: 2 });
    }

    #[test]
    fn empty_input_expands_to_nothing() {
        assert_eq!(expand_bytes(&[]).unwrap(), Vec::<u8>::new());
    }
}
