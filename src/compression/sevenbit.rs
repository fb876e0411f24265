//! 7-bit packing, as used for GSM SMS text.
//!
//! Eight 7-bit units pack into seven bytes, least significant bits first.
//! This is the one format in the crate with an encode direction.

use std::io::Read;

use crate::error::{Error, Result};

/// Packs 7-bit units into bytes.
///
/// The high bit of every input byte is discarded. A final partial byte is
/// emitted only when it packs to a nonzero value, so input ending in NUL
/// units may lose those trailing units; text content is unaffected.
pub fn compress(src: &[u8]) -> Vec<u8> {
    let mut dst: Vec<u8> = Vec::with_capacity(src.len() * 7 / 8 + 1);

    let mut val = 0u16;
    let mut shift = 0u32;
    for &byte in src {
        val |= ((byte & 0x7F) as u16) << shift;
        shift += 7;

        if shift >= 8 {
            dst.push((val & 0xFF) as u8);
            val >>= 8;
            shift -= 8;
        }
    }

    if val != 0 {
        dst.push((val & 0xFF) as u8);
    }

    dst
}

/// Packs 7-bit units from a reader into bytes.
pub fn compress_from<R: Read>(src: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.read_to_end(&mut buf).map_err(Error::from)?;
    Ok(compress(&buf))
}

/// Unpacks bytes into 7-bit units, one output byte per unit.
///
/// With `wide` every unit is followed by a zero byte, yielding UTF-16LE for
/// ASCII content.
pub fn decompress(src: &[u8], wide: bool) -> Vec<u8> {
    let mut dst: Vec<u8> = Vec::with_capacity(src.len() * 8 / 7 + 1);

    let push = |dst: &mut Vec<u8>, unit: u8| {
        dst.push(unit);
        if wide {
            dst.push(0);
        }
    };

    let mut val = 0u16;
    let mut shift = 0u32;
    for &byte in src {
        val |= (byte as u16) << shift;
        push(&mut dst, (val & 0x7F) as u8);

        val >>= 7;
        shift += 1;
        if shift == 7 {
            // Seven input bytes carry an eighth unit.
            push(&mut dst, (val & 0x7F) as u8);
            val >>= 7;
            shift = 0;
        }
    }

    dst
}

/// Unpacks 7-bit units from a reader.
pub fn decompress_from<R: Read>(src: &mut R, wide: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.read_to_end(&mut buf).map_err(Error::from)?;
    Ok(decompress(&buf, wide))
}
