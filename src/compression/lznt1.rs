//! LZNT1 decompression (Windows NT chunked LZ77).
//!
//! The input is a sequence of chunks. Each chunk opens with a little-endian
//! 16-bit header: bits 12–13 are a fixed signature (anything else ends the
//! stream), the low 12 bits hold the chunk size minus 3, and bit 15 marks the
//! chunk as compressed. Uncompressed chunks are copied verbatim.
//!
//! Compressed chunks are groups of 8 tag bits; a set bit selects a 2-byte
//! back-reference token, a clear bit a literal byte. How the 16 token bits
//! split between distance and length depends on how far into the chunk the
//! output position is: the split width is `floor(log2(position))`-derived and
//! precomputed in a table indexed by position.

use std::io::Read;

use crate::compression::{check_distance, lz_copy};
use crate::error::{Error, Result};

const COMPRESSED_MASK: u16 = 1 << 15;
const SIGNATURE_MASK: u16 = 3 << 12;
const SIZE_MASK: u16 = (1 << 12) - 1;

/// Token split widths per in-chunk output position.
///
/// `DISPLACEMENT_TABLE[p]` is the number of token bits given to the distance
/// beyond the base 4, i.e. the number of right-shifts needed to bring `p`
/// under 16.
const DISPLACEMENT_TABLE: [u8; 8192] = build_displacement_table();

const fn build_displacement_table() -> [u8; 8192] {
    let mut table = [0u8; 8192];
    let mut i = 0;
    while i < 8192 {
        let mut position = i;
        let mut width = 0u8;
        while position >= 0x10 {
            position >>= 1;
            width += 1;
        }
        table[i] = width;
        i += 1;
    }
    table
}

/// Decompresses an LZNT1 chunk stream from a byte slice.
///
/// Consumes chunks until the input is exhausted or a header without the
/// signature bits is found (a clean stop, not an error).
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    let mut dst: Vec<u8> = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let chunk_offset = pos;
        let chunk_out_start = dst.len();

        if pos + 2 > src.len() {
            return Err(Error::Truncated);
        }
        let header = u16::from_le_bytes([src[pos], src[pos + 1]]);
        pos += 2;

        if header & SIGNATURE_MASK != SIGNATURE_MASK {
            break;
        }

        let hsize = (header & SIZE_MASK) as usize;
        let chunk_end = chunk_offset + hsize + 3;

        if header & COMPRESSED_MASK != 0 {
            while pos < chunk_end {
                if pos >= src.len() {
                    return Err(Error::Truncated);
                }
                let tags = src[pos];
                pos += 1;

                for bit in 0..8 {
                    if pos >= chunk_end {
                        break;
                    }

                    if tags & (1 << bit) != 0 {
                        if pos + 2 > src.len() {
                            return Err(Error::Truncated);
                        }
                        let token = u16::from_le_bytes([src[pos], src[pos + 1]]);
                        pos += 2;

                        // The split width tracks the previous output position
                        // in this chunk; position 0 wraps to the table tail.
                        let rel = dst.len() - chunk_out_start;
                        if rel > DISPLACEMENT_TABLE.len() {
                            return Err(Error::CorruptData("chunk output too large"));
                        }
                        let width = if rel == 0 {
                            DISPLACEMENT_TABLE[DISPLACEMENT_TABLE.len() - 1]
                        } else {
                            DISPLACEMENT_TABLE[rel - 1]
                        };

                        let distance = (token >> (12 - width)) as usize + 1;
                        let length = (token & (0xFFF >> width)) as usize + 3;

                        check_distance(&dst, distance, "back-reference beyond output")?;
                        lz_copy(&mut dst, distance, length);
                    } else {
                        if pos >= src.len() {
                            return Err(Error::Truncated);
                        }
                        dst.push(src[pos]);
                        pos += 1;
                    }
                }
            }
        } else {
            let length = hsize + 1;
            if pos + length > src.len() {
                return Err(Error::Truncated);
            }
            dst.extend_from_slice(&src[pos..pos + length]);
            pos += length;
        }
    }

    Ok(dst)
}

/// Decompresses an LZNT1 chunk stream from a reader, consuming it fully.
pub fn decompress_from<R: Read>(src: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.read_to_end(&mut buf).map_err(Error::from)?;
    decompress(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement_table_widths() {
        assert_eq!(DISPLACEMENT_TABLE[0], 0);
        assert_eq!(DISPLACEMENT_TABLE[15], 0);
        assert_eq!(DISPLACEMENT_TABLE[16], 1);
        assert_eq!(DISPLACEMENT_TABLE[31], 1);
        assert_eq!(DISPLACEMENT_TABLE[32], 2);
        assert_eq!(DISPLACEMENT_TABLE[4095], 8);
        assert_eq!(DISPLACEMENT_TABLE[8191], 9);
    }

    #[test]
    fn uncompressed_chunk_verbatim() {
        // Signature bits, not compressed, hsize 2 -> 3 data bytes.
        assert_eq!(decompress(b"\x02\x30abc").unwrap(), b"abc");
    }

    #[test]
    fn compressed_chunk_with_backreference() {
        // Tag 0b0000_0010: literal 'a', then token 0x0000 at position 1
        // (width 0): distance 1, length 3.
        assert_eq!(decompress(b"\x03\xb0\x02a\x00\x00").unwrap(), b"aaaa");
    }

    #[test]
    fn missing_signature_stops_cleanly() {
        assert_eq!(decompress(b"\x00\x00whatever").unwrap(), b"");
    }

    #[test]
    fn empty_input() {
        assert_eq!(decompress(b"").unwrap(), b"");
    }

    #[test]
    fn truncated_header() {
        assert!(matches!(decompress(b"\x02"), Err(Error::Truncated)));
    }

    #[test]
    fn truncated_uncompressed_chunk() {
        // hsize 4 -> 5 data bytes declared, 3 present.
        assert!(matches!(decompress(b"\x04\x30abc"), Err(Error::Truncated)));
    }

    #[test]
    fn backreference_before_any_output_is_corrupt() {
        // Tag selects a token as the chunk's first symbol.
        assert!(matches!(
            decompress(b"\x03\xb0\x01\x00\x00"),
            Err(Error::CorruptData(_))
        ));
    }
}
