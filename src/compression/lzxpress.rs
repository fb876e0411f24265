//! [MS-XCA] LZ77 + bitmask ("plain LZXPRESS") decompression.
//!
//! A 32-bit little-endian flag word precedes every group of up to 32 symbols;
//! flags are consumed most-significant bit first. A clear bit is a literal
//! byte, a set bit a 2-byte match token: `offset = token / 8 + 1`,
//! `length = token % 8 + 3`.
//!
//! Length escalation when the 3-bit field saturates goes nibble → byte →
//! 16-bit → 32-bit, and the nibble stage is shared: the first saturated match
//! takes the low nibble of an extra byte and remembers its position, the
//! second takes that same byte's high nibble.

use std::io::Read;

use crate::compression::{check_distance, lz_copy};
use crate::error::{Error, Result};

fn need(src: &[u8], pos: usize, n: usize) -> Result<()> {
    if pos + n > src.len() {
        return Err(Error::Truncated);
    }
    Ok(())
}

/// Decompresses a plain LZXPRESS stream from a byte slice.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    let mut dst: Vec<u8> = Vec::new();
    let mut pos = 0;

    let mut flags: u32 = 0;
    let mut flag_count: u32 = 0;

    // Position of the shared half-byte for saturated match lengths; the low
    // nibble is consumed first, the high nibble on the next occurrence.
    let mut half_byte: Option<usize> = None;

    while pos < src.len() {
        if flag_count == 0 {
            need(src, pos, 4)?;
            flags = u32::from_le_bytes([src[pos], src[pos + 1], src[pos + 2], src[pos + 3]]);
            pos += 4;
            flag_count = 32;
        }
        flag_count -= 1;

        if flags & (1 << flag_count) == 0 {
            dst.push(src[pos]);
            pos += 1;
        } else {
            // A flag word can be padded with set bits past the data.
            if pos == src.len() {
                break;
            }

            need(src, pos, 2)?;
            let token = u16::from_le_bytes([src[pos], src[pos + 1]]) as usize;
            pos += 2;

            let offset = token / 8 + 1;
            let mut length = token % 8;

            if length == 7 {
                length = match half_byte.take() {
                    Some(p) => src[p] as usize / 16,
                    None => {
                        need(src, pos, 1)?;
                        half_byte = Some(pos);
                        let nibble = src[pos] as usize % 16;
                        pos += 1;
                        nibble
                    }
                };

                if length == 15 {
                    need(src, pos, 1)?;
                    length = src[pos] as usize;
                    pos += 1;

                    if length == 255 {
                        need(src, pos, 2)?;
                        length = u16::from_le_bytes([src[pos], src[pos + 1]]) as usize;
                        pos += 2;

                        if length == 0 {
                            need(src, pos, 4)?;
                            length = u32::from_le_bytes([
                                src[pos],
                                src[pos + 1],
                                src[pos + 2],
                                src[pos + 3],
                            ]) as usize;
                            pos += 4;
                        }

                        if length < 15 + 7 {
                            return Err(Error::CorruptData("extended match length too small"));
                        }
                        length -= 15 + 7;
                    }
                    length += 15;
                }
                length += 7;
            }
            length += 3;

            check_distance(&dst, offset, "match offset beyond output")?;
            lz_copy(&mut dst, offset, length);
        }
    }

    Ok(dst)
}

/// Decompresses a plain LZXPRESS stream from a reader, consuming it fully.
pub fn decompress_from<R: Read>(src: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.read_to_end(&mut buf).map_err(Error::from)?;
    decompress(&buf)
}
