//! LZO1X decompression.
//!
//! The main loop dispatches on four opcode ranges that differ in how many
//! extra bytes encode the match length and distance, and whether the low two
//! bits of the last consumed byte carry a short trailing literal run into the
//! next iteration. A length field of zero escalates into a zero-run reader
//! accumulating 255 per zero byte.
//!
//! Two termination modes exist in the wild and both are honored: the explicit
//! end-of-stream marker (distance 16384, length 1) always terminates, and when
//! an expected output length is known — from the optional 5-byte header or
//! from the caller — reaching it terminates as well.

use std::io::{Cursor, Read};

use crate::compression::{check_distance, lz_copy, ReadExt};
use crate::error::{Error, Result};

/// Upper bound on an extended zero-run length; beyond it the stream is
/// assumed to be corrupt rather than merely enormous.
const MAX_RUN_LENGTH: usize = (1 << 32) - 1000;

/// Distance value reserved for the end-of-stream marker.
const EOS_DISTANCE: usize = 1 << 14;

/// Reads an extended length: the masked low bits of `val` if nonzero, else a
/// zero-run accumulation of 255 per zero byte plus the terminating byte.
fn read_length<R: Read>(src: &mut R, val: usize, mask: usize) -> Result<usize> {
    let masked = val & mask;
    if masked != 0 {
        return Ok(masked);
    }

    let mut length = 0usize;
    loop {
        let byte = src.read_u8()? as usize;
        if byte != 0 {
            return Ok(length + mask + byte);
        }
        if length >= MAX_RUN_LENGTH {
            return Err(Error::CorruptData("runaway zero-run length"));
        }
        length += 255;
    }
}

/// Decompresses an LZO1X stream from a byte slice.
///
/// With `header == true` a 5-byte header (magic 0xF0/0xF1 plus little-endian
/// output length) is consumed and the length taken from it; otherwise
/// `buflen`, if given, bounds the output. Headerless input without `buflen`
/// decodes until the end-of-stream marker.
pub fn decompress(src: &[u8], header: bool, buflen: Option<usize>) -> Result<Vec<u8>> {
    decompress_from(&mut Cursor::new(src), header, buflen)
}

/// Decompresses an LZO1X stream from a reader.
pub fn decompress_from<R: Read>(src: &mut R, header: bool, buflen: Option<usize>) -> Result<Vec<u8>> {
    let mut dst: Vec<u8> = Vec::new();

    let out_len = if header {
        let magic = src.read_u8()?;
        if magic != 0xF0 && magic != 0xF1 {
            return Err(Error::CorruptData("invalid header magic"));
        }
        Some(src.read_u32_le()? as usize)
    } else {
        buflen
    };

    let mut val = src.read_u8()? as usize;

    // A leading 17 is a bitstream-version marker: skip it and the version
    // byte that follows.
    if val == 17 {
        let _version = src.read_u8()?;
        val = src.read_u8()? as usize;
    }

    // A first opcode above 17 is an initial literal run with no trailing-bits
    // encoding.
    if val > 17 {
        let run = src.read_vec(val - 17)?;
        dst.extend_from_slice(&run);
        val = src.read_u8()? as usize;
        if val < 16 {
            return Err(Error::CorruptData("invalid opcode after initial literal run"));
        }
    }

    let mut state = 0usize;
    loop {
        let mut length;
        let dist;

        if val > 15 {
            if val > 63 {
                // Copy of 3-8 bytes within a 2 KiB distance.
                length = (val >> 5) - 1;
                dist = ((src.read_u8()? as usize) << 3) + ((val >> 2) & 7) + 1;
            } else if val > 31 {
                // Copy of a block within a 16 KiB distance.
                length = read_length(src, val, 31)?;
                val = src.read_u8()? as usize;
                dist = ((src.read_u8()? as usize) << 6) + (val >> 2) + 1;
            } else {
                // Copy of a block within a 16..48 KiB distance; doubles as the
                // end-of-stream marker.
                length = read_length(src, val, 7)?;
                let mut d = EOS_DISTANCE + ((val & 8) << 11);
                val = src.read_u8()? as usize;
                d += ((src.read_u8()? as usize) << 6) + (val >> 2);
                if d == EOS_DISTANCE {
                    if length != 1 {
                        return Err(Error::CorruptData("invalid end-of-stream marker"));
                    }
                    break;
                }
                dist = d;
            }
        } else if state == 0 {
            // Copy 4 or more literals, then a 2-11 KiB-distance match.
            length = read_length(src, val, 15)?;
            let run = src.read_vec(length + 3)?;
            dst.extend_from_slice(&run);

            val = src.read_u8()? as usize;
            if val > 15 {
                continue;
            }
            length = 1;
            dist = (1 << 11) + ((src.read_u8()? as usize) << 2) + (val >> 2) + 1;
        } else {
            // Short match right after a trailing literal run.
            length = 0;
            dist = ((src.read_u8()? as usize) << 2) + (val >> 2) + 1;
        }

        check_distance(&dst, dist, "back-reference beyond output")?;
        lz_copy(&mut dst, dist, length + 2);

        // The low 2 bits of the last consumed byte are a trailing literal run
        // carried into the next iteration.
        state = val & 3;
        if state > 0 {
            let run = src.read_vec(state)?;
            dst.extend_from_slice(&run);
        }

        if matches!(out_len, Some(n) if dst.len() == n) {
            break;
        }

        val = src.read_u8()? as usize;
    }

    Ok(dst)
}
