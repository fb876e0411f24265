//! Raw LZ4 block decompression.
//!
//! Operates on a bare LZ4 token stream with no frame header: each token byte
//! packs a 4-bit literal length and a 4-bit match length, either of which is
//! extended by 0xFF-continuation bytes. A match is a little-endian 16-bit
//! back-reference offset followed by `match_length + 4` bytes copied from the
//! already-produced output, byte by byte, so self-overlapping copies repeat
//! their window.
//!
//! The stream has no explicit terminator: it ends when the 2-byte offset read
//! hits end of input, which is only well-formed when the pending match-length
//! nibble is zero.

use std::io::{Cursor, Read};

use crate::compression::{check_distance, lz_copy, read_up_to, ReadExt};
use crate::error::{Error, Result};

/// Minimum match length implied by every back-reference token.
const MIN_MATCH: usize = 4;

/// Reads the 0xFF-continuation extension of a 4-bit length nibble.
///
/// A nibble below 15 is final; 15 accumulates further bytes, 255 per
/// continuation byte, until a terminator below 255.
fn read_length<R: Read>(src: &mut R, nibble: usize) -> Result<usize> {
    if nibble != 0xF {
        return Ok(nibble);
    }

    let mut length = nibble;
    loop {
        let part = src.read_u8()? as usize;
        length += part;
        if part != 0xFF {
            break;
        }
    }

    Ok(length)
}

/// Decompresses a raw LZ4 block stream from a byte slice.
///
/// `uncompressed_size` optionally bounds the output: production past it is
/// corruption, reaching it ends the decode and the result is clipped to it.
/// With `None` the stream runs until its natural end.
pub fn decompress(src: &[u8], uncompressed_size: Option<usize>) -> Result<Vec<u8>> {
    decompress_from(&mut Cursor::new(src), uncompressed_size)
}

/// Decompresses a raw LZ4 block stream from a reader.
pub fn decompress_from<R: Read>(src: &mut R, uncompressed_size: Option<usize>) -> Result<Vec<u8>> {
    let mut dst: Vec<u8> = Vec::new();

    loop {
        let token = match src.try_read_u8()? {
            Some(token) => token as usize,
            None => return Err(Error::Truncated),
        };

        let literal_len = read_length(src, token >> 4)?;

        if let Some(limit) = uncompressed_size {
            if dst.len() + literal_len > limit {
                return Err(Error::CorruptData("output exceeds declared uncompressed size"));
            }
        }

        let start = dst.len();
        dst.resize(start + literal_len, 0);
        if read_up_to(src, &mut dst[start..])? != literal_len {
            return Err(Error::Truncated);
        }

        if matches!(uncompressed_size, Some(limit) if dst.len() >= limit) {
            break;
        }

        // The offset read doubles as the end-of-stream probe: clean EOF here
        // is a valid end iff no match length is pending.
        let mut offset_buf = [0u8; 2];
        match read_up_to(src, &mut offset_buf)? {
            0 => {
                if token & 0xF != 0 {
                    return Err(Error::CorruptData("match length pending at end of stream"));
                }
                break;
            }
            1 => return Err(Error::Truncated),
            _ => {}
        }

        let offset = u16::from_le_bytes(offset_buf) as usize;
        if offset == 0 {
            return Err(Error::CorruptData("zero match offset"));
        }

        let match_len = read_length(src, token & 0xF)? + MIN_MATCH;

        if let Some(limit) = uncompressed_size {
            if dst.len() + match_len > limit {
                return Err(Error::CorruptData("output exceeds declared uncompressed size"));
            }
        }

        check_distance(&dst, offset, "match offset beyond output")?;
        lz_copy(&mut dst, offset, match_len);

        if matches!(uncompressed_size, Some(limit) if dst.len() >= limit) {
            break;
        }
    }

    if let Some(limit) = uncompressed_size {
        dst.truncate(limit);
    }

    Ok(dst)
}
