//! Decompressors for a family of proprietary and legacy compression formats.
//!
//! Every decoder is a stateless pure function: it consumes a byte source and
//! materializes the full decompressed output in memory. Two entry points are
//! provided per format — one over a byte slice and one over a seekable
//! cursor — resolved once at the call boundary; decoder internals only ever
//! see the reader abstraction.
//!
//! The formats:
//!
//! | Module                | Format                                      |
//! |-----------------------|---------------------------------------------|
//! | [`lz4`]               | raw LZ4 block stream (no frame header)      |
//! | [`lznt1`]             | Windows LZNT1 chunked stream                |
//! | [`lzo`]               | LZO1X byte stream                           |
//! | [`lzxpress`]          | [MS-XCA] LZ77 + bitmask ("plain")           |
//! | [`lzxpress_huffman`]  | [MS-XCA] LZ77 + Huffman                     |
//! | [`lzfse`]             | Apple LZFSE (FSE entropy coded blocks)      |
//! | [`lzvn`]              | Apple LZVN (token indirection)              |
//! | [`lzbitmap`]          | Apple LZBITMAP (APFS)                       |
//! | [`sevenbit`]          | GSM-style 7-bit packing (encode + decode)   |
//!
//! Only [`sevenbit`] has an encode direction; the LZ-style formats are
//! decode-only.

pub mod lz4;
pub mod lzbitmap;
pub mod lzfse;
pub mod lznt1;
pub mod lzo;
pub mod lzvn;
pub mod lzxpress;
pub mod lzxpress_huffman;
pub mod sevenbit;

use std::io::Read;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Byte-source helpers shared by the cursor-based decoders
// ─────────────────────────────────────────────────────────────────────────────

/// Small-read helpers over any [`Read`] source.
///
/// All `read_*` methods fail with [`Error::Truncated`] when the source cannot
/// produce the requested bytes; `try_read_u8` instead reports a clean EOF as
/// `None` for decoders whose outer loop legitimately ends at end of input.
pub(crate) trait ReadExt: Read {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn try_read_u8(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match read_up_to(self, &mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read + ?Sized> ReadExt for R {}

/// Reads as many bytes as the source can produce, up to `buf.len()`.
///
/// Unlike [`Read::read_exact`] a short count is not an error; unlike a single
/// [`Read::read`] call, interrupted and partial reads are retried until the
/// buffer is full or the source is exhausted.
pub(crate) fn read_up_to<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match src.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

// ─────────────────────────────────────────────────────────────────────────────
// Back-reference copy
// ─────────────────────────────────────────────────────────────────────────────

/// Appends `length` bytes copied from `distance` bytes behind the end of
/// `dst`.
///
/// When `distance < length` the copy overlaps its own output and the window
/// is repeated cyclically, which is exactly what a byte-at-a-time
/// self-referential copy produces. Callers must validate `1 <= distance <=
/// dst.len()` first; every format words its own corruption error.
pub(crate) fn lz_copy(dst: &mut Vec<u8>, distance: usize, length: usize) {
    debug_assert!(distance >= 1 && distance <= dst.len());
    dst.reserve(length);
    for _ in 0..length {
        let byte = dst[dst.len() - distance];
        dst.push(byte);
    }
}

/// Validates a match distance against the bytes produced so far.
pub(crate) fn check_distance(dst: &[u8], distance: usize, msg: &'static str) -> Result<()> {
    if distance == 0 || distance > dst.len() {
        return Err(Error::CorruptData(msg));
    }
    Ok(())
}
