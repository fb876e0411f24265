//! Apple LZBITMAP decompression (APFS).
//!
//! A stream opens with the magic `ZBM\x09` and is a sequence of chunks, each
//! headed by 3-byte little-endian compressed and uncompressed sizes. A
//! compressed size exactly 6 over the uncompressed size marks a stored chunk;
//! an uncompressed size of zero ends the stream.
//!
//! A compressed chunk is region-structured: three more 3-byte offsets point
//! at the distance, bitmap and token regions inside the chunk, literals start
//! right after at offset 15, and the last 17 bytes hold a 120-bit field
//! defining tokens 3-14 as (bitmap byte, distance kind) pairs. Tokens are
//! nibbles; each selected token expands 8 output bytes steered by a bitmap, a
//! set bit taking the next literal and a clear bit copying one byte from the
//! current match distance.

use std::io::Read;

use crate::error::{Error, Result};

const MAGIC: &[u8] = b"ZBM\x09";

/// Byte offset of the literal region within a compressed chunk: 6 header
/// bytes plus three 3-byte region offsets.
const LITERAL_START: usize = 15;

/// Size of the chunk tail holding the packed token map.
const TOKEN_MAP_TAIL: usize = 17;

/// Nibble iterator over the token region, low nibble of each byte first.
struct Nibbles<'a> {
    data: &'a [u8],
    pos: usize,
    high: bool,
}

impl<'a> Nibbles<'a> {
    fn new(data: &'a [u8]) -> Self {
        Nibbles { data, pos: 0, high: false }
    }
}

impl Iterator for Nibbles<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        if self.high {
            self.pos += 1;
            self.high = false;
            Some(byte >> 4)
        } else {
            self.high = true;
            Some(byte & 0xF)
        }
    }
}

fn u24(buf: &[u8], pos: usize) -> usize {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], 0]) as usize
}

/// Reads a 3-byte little-endian size, zero-padding at end of input so a
/// stream ending cleanly at a chunk boundary parses as end of stream.
fn read_u24_padded(src: &[u8], pos: &mut usize) -> usize {
    let mut bytes = [0u8; 4];
    for (i, slot) in bytes.iter_mut().take(3).enumerate() {
        if let Some(&b) = src.get(*pos + i) {
            *slot = b;
        }
    }
    *pos = (*pos + 3).min(src.len());
    u32::from_le_bytes(bytes) as usize
}

fn decompress_chunk(buf: &[u8], uncompressed_size: usize, dst: &mut Vec<u8>) -> Result<()> {
    if buf.len() < LITERAL_START {
        return Err(Error::Truncated);
    }

    let mut distance_offset = u24(buf, 6);
    let mut bitmap_offset = u24(buf, 9);
    let token_offset = u24(buf, 12);
    let mut literal_offset = LITERAL_START;

    // Tokens 0-2 read their bitmap from the bitmap region and carry the
    // distance kind directly; 3-14 come from the 120-bit field in the tail,
    // 10 bits each: a fixed bitmap byte plus a 2-bit distance kind.
    let tail_start = buf.len().saturating_sub(TOKEN_MAP_TAIL);
    let mut bits: u128 = 0;
    for (i, &byte) in buf[tail_start..].iter().take(16).enumerate() {
        bits |= (byte as u128) << (8 * i);
    }

    let mut token_map = [(0u8, 0u8); 15];
    for (i, entry) in token_map.iter_mut().enumerate() {
        if i < 3 {
            *entry = (0, i as u8);
        } else {
            *entry = ((bits & 0xFF) as u8, ((bits >> 8) & 3) as u8);
            bits >>= 10;
        }
    }

    let mut tokens = Nibbles::new(if token_offset < tail_start {
        &buf[token_offset..tail_start]
    } else {
        &[]
    });

    // The match distance starts at 8 and persists until a token replaces it.
    let mut distance = 8usize;
    let mut remaining = uncompressed_size;
    let mut prev_token: Option<u8> = None;

    while remaining > 0 {
        let idx = match prev_token.take() {
            Some(token) => token,
            None => match tokens.next() {
                Some(token) => token,
                None => break,
            },
        };
        if idx == 0xF {
            return Err(Error::CorruptData("invalid token index"));
        }

        let mut repeat = tokens.next().ok_or(Error::Truncated)? as usize;
        if repeat != 0xF {
            // Not a repeat count: it is the next token, held for the next
            // iteration.
            prev_token = Some(repeat as u8);
            repeat = 1;
        } else {
            let mut total = 4usize;
            while repeat == 0xF {
                repeat = tokens.next().ok_or(Error::Truncated)? as usize;
                total = total
                    .checked_add(repeat)
                    .ok_or(Error::CorruptData("invalid repeat count"))?;
            }
            repeat = total;
        }

        for _ in 0..repeat {
            let (map_bitmap, kind) = token_map[idx as usize];
            let mut bitmap = if idx < 3 {
                let byte = *buf.get(bitmap_offset).ok_or(Error::Truncated)?;
                bitmap_offset += 1;
                byte
            } else {
                map_bitmap
            };

            match kind {
                1 => {
                    distance = *buf.get(distance_offset).ok_or(Error::Truncated)? as usize;
                    distance_offset += 1;
                }
                2 => {
                    if distance_offset + 2 > buf.len() {
                        return Err(Error::Truncated);
                    }
                    distance =
                        u16::from_le_bytes([buf[distance_offset], buf[distance_offset + 1]])
                            as usize;
                    distance_offset += 2;
                }
                _ => {}
            }

            for _ in 0..8 {
                if bitmap & 1 != 0 {
                    let byte = *buf.get(literal_offset).ok_or(Error::Truncated)?;
                    literal_offset += 1;
                    dst.push(byte);
                } else {
                    if distance == 0 || distance > dst.len() {
                        return Err(Error::CorruptData("invalid match distance"));
                    }
                    let byte = dst[dst.len() - distance];
                    dst.push(byte);
                }

                bitmap >>= 1;
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Decompresses an LZBITMAP stream from a byte slice.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    if src.get(..4) != Some(MAGIC) {
        return Err(Error::CorruptData("invalid magic"));
    }

    let mut dst: Vec<u8> = Vec::new();
    let mut pos = 4usize;

    loop {
        let compressed_size = read_u24_padded(src, &mut pos);
        let uncompressed_size = read_u24_padded(src, &mut pos);

        if compressed_size == uncompressed_size + 6 {
            // Stored chunk.
            if pos + uncompressed_size > src.len() {
                return Err(Error::Truncated);
            }
            dst.extend_from_slice(&src[pos..pos + uncompressed_size]);
            pos += uncompressed_size;
        } else if uncompressed_size == 0 {
            break;
        } else {
            let chunk_start = pos - 6;
            if chunk_start + compressed_size > src.len() {
                return Err(Error::Truncated);
            }
            decompress_chunk(
                &src[chunk_start..chunk_start + compressed_size],
                uncompressed_size,
                &mut dst,
            )?;
            pos = chunk_start + compressed_size;
        }
    }

    Ok(dst)
}

/// Decompresses an LZBITMAP stream from a reader, consuming it fully.
pub fn decompress_from<R: Read>(src: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.read_to_end(&mut buf).map_err(Error::from)?;
    decompress(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    const SMALL: &str = concat!(
        "5a424d092d0000a0000018000018000018000061616161616161617835ef",
        "340f0000f10f00000000000000000000000000060000000000",
    );

    #[test]
    fn stored_chunks() {
        let src = hex::decode(concat!(
            "5a424d093100002b0000536d616c6c2066696c657320646f6e2774206765",
            "7420636f6d7072657373656420617420616c6c2e2e2e0a060000000000",
        ))
        .unwrap();
        assert_eq!(
            decompress(&src).unwrap(),
            b"Small files don't get compressed at all...\n"
        );
    }

    #[test]
    fn compressed_chunk() {
        let src = hex::decode(SMALL).unwrap();
        let out = decompress(&src).unwrap();
        assert_eq!(out, [b"a".repeat(158), b"xa".to_vec()].concat());
        assert_eq!(
            hex::encode(Sha256::digest(&out)),
            "ef56118ff333a8bfeffc346c4987a1a178762570b3eb1d704a2c1e9b3a877561"
        );
    }

    #[test]
    fn invalid_magic() {
        assert!(matches!(
            decompress(b"NOPE\x00\x00\x00\x00\x00\x00"),
            Err(Error::CorruptData("invalid magic"))
        ));
    }

    #[test]
    fn short_input_is_invalid_magic() {
        assert!(matches!(decompress(b"ZB"), Err(Error::CorruptData(_))));
    }

    #[test]
    fn magic_only_ends_cleanly() {
        // Header reads past the end parse as a zero-size end-of-stream chunk.
        assert_eq!(decompress(b"ZBM\x09").unwrap(), b"");
    }

    #[test]
    fn truncated_stored_chunk() {
        // Stored chunk declaring 16 bytes with 4 present.
        let mut src = b"ZBM\x09".to_vec();
        src.extend_from_slice(&[0x16, 0x00, 0x00, 0x10, 0x00, 0x00]);
        src.extend_from_slice(b"data");
        assert!(matches!(decompress(&src), Err(Error::Truncated)));
    }

    #[test]
    fn nibble_iterator_order() {
        let mut nibbles = Nibbles::new(&[0x21, 0x43]);
        assert_eq!(nibbles.next(), Some(1));
        assert_eq!(nibbles.next(), Some(2));
        assert_eq!(nibbles.next(), Some(3));
        assert_eq!(nibbles.next(), Some(4));
        assert_eq!(nibbles.next(), None);
    }
}
