//! [MS-XCA] LZ77 + Huffman ("LZXPRESS Huffman") decompression.
//!
//! The input is a sequence of chunks, each producing up to 64 KiB of output.
//! A chunk opens with a 256-byte table of 4-bit canonical code lengths for
//! 512 symbols (two per byte, low nibble first): symbols 0-255 are literals,
//! 256-511 pack a match's offset exponent and a 4-bit length seed.
//!
//! Codes are assigned canonically — symbols sorted by (length, value), codes
//! counted upward and left-shifted on every length increase — and the decoder
//! materializes them as an explicit binary tree in a fixed 1024-node arena.
//!
//! The bitstream holds a 32-bit window refilled 16 bits at a time; the
//! refill reads past the end of the data as zero bits, which is what lets
//! the final chunk drain without a terminator.

use std::io::Read;

use crate::compression::{check_distance, lz_copy};
use crate::error::{Error, Result};

const CODE_TABLE_SIZE: usize = 256;
const SYMBOL_COUNT: usize = 512;
const ARENA_SIZE: usize = 1024;
const CHUNK_SIZE: usize = 65536;

// ─────────────────────────────────────────────────────────────────────────────
// Canonical Huffman tree
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Default)]
struct Node {
    symbol: u16,
    is_leaf: bool,
    // Arena indices; 0 means absent (the root can never be a child).
    children: [u16; 2],
}

/// Inserts the leaf at arena index `idx` under the code `mask` of `bits`
/// bits, allocating internal nodes from `idx + 1` upward. Returns the next
/// free arena index.
fn add_leaf(nodes: &mut [Node; ARENA_SIZE], idx: usize, mask: u32, bits: u8) -> Result<usize> {
    let mut node = 0usize;
    let mut next = idx + 1;
    let mut bits = bits;

    while bits > 1 {
        bits -= 1;
        let child = ((mask >> bits) & 1) as usize;
        if nodes[node].children[child] == 0 {
            if next >= ARENA_SIZE {
                return Err(Error::CorruptData("huffman tree overflow"));
            }
            nodes[node].children[child] = next as u16;
            next += 1;
        }
        node = nodes[node].children[child] as usize;
    }

    nodes[node].children[(mask & 1) as usize] = idx as u16;
    Ok(next)
}

/// Builds the canonical code tree from a 256-byte nibble-packed length table.
fn build_tree(table: &[u8]) -> Result<Box<[Node; ARENA_SIZE]>> {
    // (length, symbol) pairs; tuple order gives the canonical sort.
    let mut symbols: Vec<(u8, u16)> = Vec::with_capacity(SYMBOL_COUNT);
    for (i, &byte) in table.iter().enumerate() {
        symbols.push((byte & 0xF, (2 * i) as u16));
        symbols.push((byte >> 4, (2 * i + 1) as u16));
    }
    symbols.sort_unstable();

    let mut nodes: Box<[Node; ARENA_SIZE]> = Box::new([Node::default(); ARENA_SIZE]);

    let mut mask: u32 = 0;
    let mut bits: u8 = 1;
    let mut idx = 1usize;

    for &(length, symbol) in symbols.iter().filter(|s| s.0 > 0) {
        if idx >= ARENA_SIZE {
            return Err(Error::CorruptData("huffman tree overflow"));
        }
        nodes[idx].symbol = symbol;
        nodes[idx].is_leaf = true;

        mask <<= length - bits;
        bits = length;

        idx = add_leaf(&mut nodes, idx, mask, bits)?;
        mask += 1;
    }

    Ok(nodes)
}

// ─────────────────────────────────────────────────────────────────────────────
// Bitstream
// ─────────────────────────────────────────────────────────────────────────────

/// 32-bit big-endian-bit window over the source, refilled 16 bits at a time.
struct BitReader<'a> {
    src: &'a [u8],
    pos: usize,
    mask: u32,
    bits: i32,
}

impl<'a> BitReader<'a> {
    fn new(src: &'a [u8], pos: usize) -> Self {
        let mut reader = BitReader { src, pos, mask: 0, bits: 0 };
        let high = reader.read_u16_padded() as u32;
        let low = reader.read_u16_padded() as u32;
        reader.mask = (high << 16) + low;
        reader.bits = 32;
        reader
    }

    /// Reads a little-endian u16, padding missing trailing bytes with zeros.
    fn read_u16_padded(&mut self) -> u16 {
        let avail = self.src.len().saturating_sub(self.pos);
        match avail {
            0 => 0,
            1 => {
                let value = (self.src[self.pos] as u16) << 8;
                self.pos += 1;
                value
            }
            _ => {
                let value = u16::from_le_bytes([self.src[self.pos], self.src[self.pos + 1]]);
                self.pos += 2;
                value
            }
        }
    }

    /// Reads one raw byte from the source, bypassing the bit window.
    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self.src.get(self.pos).ok_or(Error::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Peeks the top `n` bits of the window without consuming them.
    fn lookup(&self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        self.mask >> (32 - n)
    }

    /// Consumes `n` bits, refilling the window whenever it drops below 16.
    fn skip(&mut self, n: u32) {
        self.mask = self.mask.wrapping_shl(n);
        self.bits -= n as i32;
        if self.bits < 16 {
            let refill = self.read_u16_padded() as u32;
            self.mask = self.mask.wrapping_add(refill.wrapping_shl((16 - self.bits) as u32));
            self.bits += 16;
        }
    }
}

fn decode_symbol(reader: &mut BitReader<'_>, nodes: &[Node; ARENA_SIZE]) -> Result<u16> {
    let mut node = 0usize;
    while !nodes[node].is_leaf {
        let bit = reader.lookup(1) as usize;
        reader.skip(1);
        let next = nodes[node].children[bit];
        if next == 0 {
            return Err(Error::CorruptData("invalid huffman code"));
        }
        node = next as usize;
    }
    Ok(nodes[node].symbol)
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoder
// ─────────────────────────────────────────────────────────────────────────────

/// Decompresses an LZXPRESS Huffman stream from a byte slice.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    let mut dst: Vec<u8> = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        if pos + CODE_TABLE_SIZE > src.len() {
            return Err(Error::Truncated);
        }
        let nodes = build_tree(&src[pos..pos + CODE_TABLE_SIZE])?;
        pos += CODE_TABLE_SIZE;

        let mut reader = BitReader::new(src, pos);
        let mut chunk_size = 0usize;

        while chunk_size < CHUNK_SIZE && reader.pos < src.len() {
            let symbol = decode_symbol(&mut reader, &nodes)?;

            if symbol < 256 {
                dst.push(symbol as u8);
                chunk_size += 1;
                continue;
            }

            let symbol = symbol - 256;
            let mut length = (symbol & 0xF) as usize;
            let exponent = (symbol >> 4) as u32;
            let offset = (1usize << exponent) + reader.lookup(exponent) as usize;

            if length == 15 {
                length = reader.read_byte()? as usize + 15;
                if length == 270 {
                    length = reader.read_u16_padded() as usize;
                }
            }

            reader.skip(exponent);
            length += 3;

            check_distance(&dst, offset, "match offset beyond output")?;
            lz_copy(&mut dst, offset, length);
            chunk_size += length;
        }

        pos = reader.pos;
    }

    Ok(dst)
}

/// Decompresses an LZXPRESS Huffman stream from a reader, consuming it fully.
pub fn decompress_from<R: Read>(src: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.read_to_end(&mut buf).map_err(Error::from)?;
    decompress(&buf)
}
