//! Apple LZFSE decompression.
//!
//! An LZFSE stream is a sequence of blocks, each introduced by a 4-byte
//! magic: `bvx$` ends the stream, `bvx-` is raw data, `bvxn` wraps an LZVN
//! payload, and `bvx1`/`bvx2` are the FSE entropy-coded blocks proper (v2
//! differs from v1 only in packing its header fields and frequency tables
//! into bitfields).
//!
//! A compressed block carries four FSE decoder tables built from normalized
//! symbol frequency histograms: one for literals (1024 states, decoded four
//! at a time through four interleaved states) and one each for the L/M/D
//! components of a match (literal count, match length, match distance). L, M
//! and D values are split into an FSE-coded base symbol and raw low-order
//! extra bits pulled straight from the bitstream. A distance of zero repeats
//! the previous match's distance.
//!
//! Both payload bitstreams are consumed back to front: bits are pulled from
//! the most significant end of the little-endian payload.

use std::io::Read;

use crate::compression::{lz_copy, lzvn};
use crate::error::{Error, Result};

const END_OF_STREAM_MAGIC: &[u8] = b"bvx$";
const UNCOMPRESSED_MAGIC: &[u8] = b"bvx-";
const COMPRESSED_V1_MAGIC: &[u8] = b"bvx1";
const COMPRESSED_V2_MAGIC: &[u8] = b"bvx2";
const COMPRESSED_LZVN_MAGIC: &[u8] = b"bvxn";

const L_SYMBOLS: usize = 20;
const M_SYMBOLS: usize = 20;
const D_SYMBOLS: usize = 64;
const LITERAL_SYMBOLS: usize = 256;
const L_STATES: u32 = 64;
const M_STATES: u32 = 64;
const D_STATES: u32 = 256;
const LITERAL_STATES: u32 = 1024;
const MATCHES_PER_BLOCK: usize = 10000;
const LITERALS_PER_BLOCK: usize = 4 * MATCHES_PER_BLOCK;

const V2_HEADER_SIZE: usize = 28;

// ─────────────────────────────────────────────────────────────────────────────
// Static value tables
// ─────────────────────────────────────────────────────────────────────────────

// Compact frequency encoding used by v2 headers: the low 5 bits of the
// window select the field width; widths 8 and 14 carry their value in the
// bits above the low nibble.
#[rustfmt::skip]
const FREQ_NBITS_TABLE: [u32; 32] = [
    2, 3, 2, 5, 2, 3, 2, 8, 2, 3, 2, 5, 2, 3, 2, 14,
    2, 3, 2, 5, 2, 3, 2, 8, 2, 3, 2, 5, 2, 3, 2, 14,
];
#[rustfmt::skip]
const FREQ_VALUE_TABLE: [i8; 32] = [
    0, 2, 1, 4, 0, 3, 1, -1, 0, 2, 1, 5, 0, 3, 1, -1,
    0, 2, 1, 6, 0, 3, 1, -1, 0, 2, 1, 7, 0, 3, 1, -1,
];

// L, M and D values split into an FSE-coded base symbol plus raw low-order
// bits; per symbol, the number of raw bits and the base value.
#[rustfmt::skip]
const L_EXTRA_BITS: [u32; L_SYMBOLS] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 3, 5, 8,
];
#[rustfmt::skip]
const L_BASE_VALUE: [u32; L_SYMBOLS] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 20, 28, 60,
];
#[rustfmt::skip]
const M_EXTRA_BITS: [u32; M_SYMBOLS] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 5, 8, 11,
];
#[rustfmt::skip]
const M_BASE_VALUE: [u32; M_SYMBOLS] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 24, 56, 312,
];
#[rustfmt::skip]
const D_EXTRA_BITS: [u32; D_SYMBOLS] = [
    0,  0,  0,  0,  1,  1,  1,  1,  2,  2,  2,  2,  3,  3,  3,  3,
    4,  4,  4,  4,  5,  5,  5,  5,  6,  6,  6,  6,  7,  7,  7,  7,
    8,  8,  8,  8,  9,  9,  9,  9,  10, 10, 10, 10, 11, 11, 11, 11,
    12, 12, 12, 12, 13, 13, 13, 13, 14, 14, 14, 14, 15, 15, 15, 15,
];
#[rustfmt::skip]
const D_BASE_VALUE: [u32; D_SYMBOLS] = [
    0,      1,      2,      3,     4,     6,     8,     10,    12,    16,
    20,     24,     28,     36,    44,    52,    60,    76,    92,    108,
    124,    156,    188,    220,   252,   316,   380,   444,   508,   636,
    764,    892,    1020,   1276,  1532,  1788,  2044,  2556,  3068,  3580,
    4092,   5116,   6140,   7164,  8188,  10236, 12284, 14332, 16380, 20476,
    24572,  28668,  32764,  40956, 49148, 57340, 65532, 81916, 98300, 114684,
    131068, 163836, 196604, 229372,
];

// ─────────────────────────────────────────────────────────────────────────────
// Byte-level header reader
// ─────────────────────────────────────────────────────────────────────────────

struct ByteReader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(src: &'a [u8], pos: usize) -> Self {
        ByteReader { src, pos }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.src.len() {
            return Err(Error::Truncated);
        }
        let slice = &self.src[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Block header
// ─────────────────────────────────────────────────────────────────────────────

struct BlockHeader {
    n_literals: usize,
    n_matches: usize,
    n_literal_payload_bytes: usize,
    n_lmd_payload_bytes: usize,
    literal_bits: i32,
    literal_state: [u32; 4],
    lmd_bits: i32,
    l_state: u32,
    m_state: u32,
    d_state: u32,
    l_freq: [u16; L_SYMBOLS],
    m_freq: [u16; M_SYMBOLS],
    d_freq: [u16; D_SYMBOLS],
    literal_freq: [u16; LITERAL_SYMBOLS],
}

/// Extracts `nbits` bits of a 64-bit packed field starting at bit `offset`.
fn get_field(value: u64, offset: u32, nbits: u32) -> u64 {
    (value >> offset) & ((1u64 << nbits) - 1)
}

fn read_freq_array<const N: usize>(reader: &mut ByteReader<'_>) -> Result<[u16; N]> {
    let mut out = [0u16; N];
    for slot in out.iter_mut() {
        *slot = reader.u16()?;
    }
    Ok(out)
}

impl BlockHeader {
    /// Parses a v1 header: all fields stored as plain little-endian integers.
    fn parse_v1(reader: &mut ByteReader<'_>) -> Result<Self> {
        let _n_raw_bytes = reader.u32()?;
        let _n_payload_bytes = reader.u32()?;
        let n_literals = reader.u32()? as usize;
        let n_matches = reader.u32()? as usize;
        let n_literal_payload_bytes = reader.u32()? as usize;
        let n_lmd_payload_bytes = reader.u32()? as usize;
        let literal_bits = reader.u32()? as i32;
        let literal_state = [
            reader.u16()? as u32,
            reader.u16()? as u32,
            reader.u16()? as u32,
            reader.u16()? as u32,
        ];
        let lmd_bits = reader.u32()? as i32;
        let l_state = reader.u16()? as u32;
        let m_state = reader.u16()? as u32;
        let d_state = reader.u16()? as u32;

        Ok(BlockHeader {
            n_literals,
            n_matches,
            n_literal_payload_bytes,
            n_lmd_payload_bytes,
            literal_bits,
            literal_state,
            lmd_bits,
            l_state,
            m_state,
            d_state,
            l_freq: read_freq_array(reader)?,
            m_freq: read_freq_array(reader)?,
            d_freq: read_freq_array(reader)?,
            literal_freq: read_freq_array(reader)?,
        })
    }

    /// Parses a v2 header: three packed 64-bit fields followed by the
    /// compactly encoded frequency tables.
    fn parse_v2(reader: &mut ByteReader<'_>) -> Result<Self> {
        let _n_raw_bytes = reader.u32()?;
        let v0 = reader.u64()?;
        let v1 = reader.u64()?;
        let v2 = reader.u64()?;

        // Total size includes the magic and the header itself.
        let total_size = get_field(v2, 0, 32) as usize;
        let freq_tables_size = total_size
            .checked_sub(V2_HEADER_SIZE + 4)
            .ok_or(Error::CorruptData("block size smaller than header"))?;

        let (l_freq, m_freq, d_freq, literal_freq) = if freq_tables_size == 0 {
            ([0; L_SYMBOLS], [0; M_SYMBOLS], [0; D_SYMBOLS], [0; LITERAL_SYMBOLS])
        } else {
            decode_freq_tables(reader.take(freq_tables_size)?)
        };

        Ok(BlockHeader {
            n_literals: get_field(v0, 0, 20) as usize,
            n_matches: get_field(v0, 40, 20) as usize,
            n_literal_payload_bytes: get_field(v0, 20, 20) as usize,
            n_lmd_payload_bytes: get_field(v1, 40, 20) as usize,
            literal_bits: get_field(v0, 60, 3) as i32 - 7,
            literal_state: [
                get_field(v1, 0, 10) as u32,
                get_field(v1, 10, 10) as u32,
                get_field(v1, 20, 10) as u32,
                get_field(v1, 30, 10) as u32,
            ],
            lmd_bits: get_field(v1, 60, 3) as i32 - 7,
            l_state: get_field(v2, 32, 10) as u32,
            m_state: get_field(v2, 42, 10) as u32,
            d_state: get_field(v2, 52, 10) as u32,
            l_freq,
            m_freq,
            d_freq,
            literal_freq,
        })
    }
}

/// Reads `n` bits starting at `bit_pos` from a little-endian byte buffer,
/// zero-padding past its end.
fn peek_bits(data: &[u8], bit_pos: usize, n: u32) -> u64 {
    let base = bit_pos / 8;
    let shift = (bit_pos % 8) as u32;

    let mut word = [0u8; 8];
    for (i, slot) in word.iter_mut().enumerate() {
        if let Some(&byte) = data.get(base + i) {
            *slot = byte;
        }
    }

    let value = u64::from_le_bytes(word) >> shift;
    if n == 0 {
        0
    } else {
        value & (u64::MAX >> (64 - n))
    }
}

/// Decodes the 360 compactly encoded v2 frequency values, least significant
/// bits first.
#[allow(clippy::type_complexity)]
fn decode_freq_tables(
    data: &[u8],
) -> ([u16; L_SYMBOLS], [u16; M_SYMBOLS], [u16; D_SYMBOLS], [u16; LITERAL_SYMBOLS]) {
    let mut values = [0u16; L_SYMBOLS + M_SYMBOLS + D_SYMBOLS + LITERAL_SYMBOLS];
    let mut bit_pos = 0usize;

    for value in values.iter_mut() {
        let window = peek_bits(data, bit_pos, 14) as u32;
        let b = (window & 31) as usize;
        let nbits = FREQ_NBITS_TABLE[b];

        *value = match nbits {
            8 => 8 + ((window >> 4) & 0xF) as u16,
            14 => 24 + ((window >> 4) & 0x3FF) as u16,
            // Widths 2, 3 and 5 carry their value in the lookup table; the -1
            // placeholders only occur at widths 8 and 14.
            _ => FREQ_VALUE_TABLE[b] as u16,
        };
        bit_pos += nbits as usize;
    }

    let mut l_freq = [0u16; L_SYMBOLS];
    let mut m_freq = [0u16; M_SYMBOLS];
    let mut d_freq = [0u16; D_SYMBOLS];
    let mut literal_freq = [0u16; LITERAL_SYMBOLS];
    l_freq.copy_from_slice(&values[0..20]);
    m_freq.copy_from_slice(&values[20..40]);
    d_freq.copy_from_slice(&values[40..104]);
    literal_freq.copy_from_slice(&values[104..360]);
    (l_freq, m_freq, d_freq, literal_freq)
}

// ─────────────────────────────────────────────────────────────────────────────
// FSE decoder tables
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct DecoderEntry {
    k: u32,
    symbol: u8,
    delta: u32,
}

#[derive(Clone, Copy)]
struct ValueDecoderEntry {
    total_bits: u32,
    value_bits: u32,
    delta: u32,
    vbase: u32,
}

/// Builds the literal decoder table: one entry per state, assigning `freq[i]`
/// consecutive states to symbol `i`.
fn init_decoder_table(nstates: u32, freq: &[u16]) -> Result<Vec<DecoderEntry>> {
    let mut table = Vec::with_capacity(nstates as usize);
    let n_clz = nstates.leading_zeros();
    let mut sum_of_freq = 0u32;

    for (i, &f) in freq.iter().enumerate() {
        let f = f as u32;
        if f == 0 {
            continue;
        }

        sum_of_freq += f;
        if sum_of_freq > nstates {
            return Err(Error::CorruptData("invalid frequency table"));
        }

        // Shift needed to ensure nstates <= f << k < 2 * nstates.
        let k = f.leading_zeros() - n_clz;
        let j0 = ((2 * nstates) >> k) - f;

        for j in 0..f {
            let entry = if j < j0 {
                DecoderEntry { k, symbol: i as u8, delta: ((f + j) << k) - nstates }
            } else {
                DecoderEntry { k: k - 1, symbol: i as u8, delta: (j - j0) << (k - 1) }
            };
            table.push(entry);
        }
    }

    Ok(table)
}

/// Builds an L/M/D decoder table; each entry folds in the symbol's extra-bit
/// count and base value so a single bit pull yields both next state and value.
fn init_value_decoder_table(
    nstates: u32,
    freq: &[u16],
    extra_bits: &[u32],
    base_value: &[u32],
) -> Result<Vec<ValueDecoderEntry>> {
    let mut table = Vec::with_capacity(nstates as usize);
    let n_clz = nstates.leading_zeros();
    let mut sum_of_freq = 0u32;

    for (i, &f) in freq.iter().enumerate() {
        let f = f as u32;
        if f == 0 {
            continue;
        }

        sum_of_freq += f;
        if sum_of_freq > nstates {
            return Err(Error::CorruptData("invalid frequency table"));
        }

        let k = f.leading_zeros() - n_clz;
        let j0 = ((2 * nstates) >> k) - f;

        for j in 0..f {
            let entry = if j < j0 {
                ValueDecoderEntry {
                    total_bits: k + extra_bits[i],
                    value_bits: extra_bits[i],
                    delta: ((f + j) << k) - nstates,
                    vbase: base_value[i],
                }
            } else {
                ValueDecoderEntry {
                    total_bits: (k - 1) + extra_bits[i],
                    value_bits: extra_bits[i],
                    delta: (j - j0) << (k - 1),
                    vbase: base_value[i],
                }
            };
            table.push(entry);
        }
    }

    Ok(table)
}

// ─────────────────────────────────────────────────────────────────────────────
// Bitstream
// ─────────────────────────────────────────────────────────────────────────────

/// FSE payload bitstream, consumed from the most significant end of the
/// little-endian payload downward.
struct BitStream<'a> {
    data: &'a [u8],
    nbits: i64,
}

impl<'a> BitStream<'a> {
    fn new(data: &'a [u8], bits: i32) -> Self {
        BitStream { data, nbits: bits as i64 + (data.len() as i64) * 8 }
    }

    fn pull(&mut self, n: u32) -> Result<u64> {
        self.nbits -= n as i64;
        if self.nbits < 0 {
            return Err(Error::CorruptData("bitstream underflow"));
        }
        Ok(peek_bits(self.data, self.nbits as usize, n))
    }
}

fn fse_decode(state: &mut u32, table: &[DecoderEntry], stream: &mut BitStream<'_>) -> Result<u8> {
    let e = *table
        .get(*state as usize)
        .ok_or(Error::CorruptData("invalid decoder state"))?;
    *state = e.delta + stream.pull(e.k)? as u32;
    Ok(e.symbol)
}

fn fse_value_decode(
    state: &mut u32,
    table: &[ValueDecoderEntry],
    stream: &mut BitStream<'_>,
) -> Result<u32> {
    let e = *table
        .get(*state as usize)
        .ok_or(Error::CorruptData("invalid decoder state"))?;
    let bits = stream.pull(e.total_bits)? as u32;
    *state = e.delta + (bits >> e.value_bits);
    let value_mask = if e.value_bits == 0 { 0 } else { u32::MAX >> (32 - e.value_bits) };
    Ok(e.vbase + (bits & value_mask))
}

// ─────────────────────────────────────────────────────────────────────────────
// Block decoding
// ─────────────────────────────────────────────────────────────────────────────

struct LmdDecoders {
    l: Vec<ValueDecoderEntry>,
    m: Vec<ValueDecoderEntry>,
    d: Vec<ValueDecoderEntry>,
}

/// Decodes the L/M/D stream of one block against its literal pool. Match
/// distances are relative to this block's own output.
fn decode_lmd(
    header: &BlockHeader,
    literals: &[u8],
    decoders: &LmdDecoders,
    stream: &mut BitStream<'_>,
) -> Result<Vec<u8>> {
    let mut dst: Vec<u8> = Vec::new();
    let mut lit_pos = 0usize;

    let mut l_state = header.l_state;
    let mut m_state = header.m_state;
    let mut d_state = header.d_state;

    // Distance persists across matches; a decoded distance of 0 repeats it.
    let mut distance: Option<usize> = None;

    for _ in 0..header.n_matches {
        let l = fse_value_decode(&mut l_state, &decoders.l, stream)? as usize;
        if lit_pos + l >= LITERALS_PER_BLOCK + 64 {
            return Err(Error::CorruptData("literal overflow"));
        }
        if lit_pos + l > literals.len() {
            return Err(Error::Truncated);
        }

        let m = fse_value_decode(&mut m_state, &decoders.m, stream)? as usize;
        let new_d = fse_value_decode(&mut d_state, &decoders.d, stream)? as usize;
        if new_d != 0 {
            distance = Some(new_d);
        }

        let d = distance.ok_or(Error::CorruptData("invalid match distance"))?;
        if dst.len() + l < d {
            return Err(Error::CorruptData("invalid match distance"));
        }

        dst.extend_from_slice(&literals[lit_pos..lit_pos + l]);
        lit_pos += l;
        lz_copy(&mut dst, d, m);
    }

    Ok(dst)
}

fn decode_compressed_block(header: &BlockHeader, reader: &mut ByteReader<'_>) -> Result<Vec<u8>> {
    let literal_decoder = init_decoder_table(LITERAL_STATES, &header.literal_freq)?;
    let decoders = LmdDecoders {
        l: init_value_decoder_table(L_STATES, &header.l_freq, &L_EXTRA_BITS, &L_BASE_VALUE)?,
        m: init_value_decoder_table(M_STATES, &header.m_freq, &M_EXTRA_BITS, &M_BASE_VALUE)?,
        d: init_value_decoder_table(D_STATES, &header.d_freq, &D_EXTRA_BITS, &D_BASE_VALUE)?,
    };

    // Literals are decoded through four interleaved states, four at a time,
    // so the pool is padded up to a multiple of four.
    let mut stream = BitStream::new(reader.take(header.n_literal_payload_bytes)?, header.literal_bits);
    let mut literals = Vec::with_capacity(header.n_literals.next_multiple_of(4));
    let mut states = header.literal_state;
    for _ in (0..header.n_literals).step_by(4) {
        for state in states.iter_mut() {
            literals.push(fse_decode(state, &literal_decoder, &mut stream)?);
        }
    }

    let mut stream = BitStream::new(reader.take(header.n_lmd_payload_bytes)?, header.lmd_bits);
    decode_lmd(header, &literals, &decoders, &mut stream)
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry points
// ─────────────────────────────────────────────────────────────────────────────

/// Decompresses an LZFSE stream from a byte slice, block by block, until the
/// end-of-stream block.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    let mut dst: Vec<u8> = Vec::new();
    let mut reader = ByteReader::new(src, 0);

    loop {
        let magic = reader.take(4)?;

        match magic {
            m if m == END_OF_STREAM_MAGIC => break,
            m if m == UNCOMPRESSED_MAGIC => {
                let n_raw_bytes = reader.u32()? as usize;
                if n_raw_bytes == 0 {
                    continue;
                }
                dst.extend_from_slice(reader.take(n_raw_bytes)?);
            }
            m if m == COMPRESSED_V1_MAGIC || m == COMPRESSED_V2_MAGIC => {
                let header = if m == COMPRESSED_V1_MAGIC {
                    BlockHeader::parse_v1(&mut reader)?
                } else {
                    BlockHeader::parse_v2(&mut reader)?
                };
                let block = decode_compressed_block(&header, &mut reader)?;
                dst.extend_from_slice(&block);
            }
            m if m == COMPRESSED_LZVN_MAGIC => {
                let _n_raw_bytes = reader.u32()?;
                let n_payload_bytes = reader.u32()? as usize;
                let block = lzvn::decompress(reader.take(n_payload_bytes)?)?;
                dst.extend_from_slice(&block);
            }
            _ => return Err(Error::CorruptData("invalid block magic")),
        }
    }

    Ok(dst)
}

/// Decompresses an LZFSE stream from a reader, consuming it fully.
pub fn decompress_from<R: Read>(src: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.read_to_end(&mut buf).map_err(Error::from)?;
    decompress(&buf)
}
