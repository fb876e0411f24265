//! Apple LZVN decompression.
//!
//! Every packet starts with a single opcode byte whose value selects one of a
//! handful of layouts differing in where the literal count, match length and
//! match distance live. Small layouts pack all three into the opcode and one
//! extra byte; larger ones spill into 16-bit fields or dedicated bytes. The
//! "previous distance" layout reuses the distance of the last match, which
//! therefore persists across packets.
//!
//! The stream ends on an explicit end-of-stream opcode or when the declared
//! source size runs out mid-packet.

use std::io::Read;

use crate::compression::{check_distance, lz_copy};
use crate::error::{Error, Result};

enum Opcode {
    Eos,
    Nop,
    SmallLiteral,
    LargeLiteral,
    SmallMatch,
    LargeMatch,
    SmallDistance,
    MediumDistance,
    LargeDistance,
    PreviousDistance,
    Undefined,
}

/// Classifies an opcode byte. The distance layouts are interleaved across the
/// byte range, so the table below enumerates the exceptions before falling
/// through to the small-distance default.
fn classify(opcode: u8) -> Opcode {
    match opcode {
        6 => Opcode::Eos,
        14 | 22 => Opcode::Nop,
        224 => Opcode::LargeLiteral,
        225..=239 => Opcode::SmallLiteral,
        240 => Opcode::LargeMatch,
        241..=255 => Opcode::SmallMatch,
        160..=191 => Opcode::MediumDistance,
        7 | 15 | 23 | 31 | 39 | 47 | 55 | 63 | 71 | 79 | 87 | 95 | 103 | 111 | 135 | 143
        | 151 | 159 | 199 | 207 => Opcode::LargeDistance,
        70 | 78 | 86 | 94 | 102 | 110 | 134 | 142 | 150 | 158 | 198 | 206 => {
            Opcode::PreviousDistance
        }
        30 | 38 | 46 | 54 | 62 | 112..=127 | 208..=223 => Opcode::Undefined,
        _ => Opcode::SmallDistance,
    }
}

/// Decompresses an LZVN stream from a byte slice.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    let mut dst: Vec<u8> = Vec::new();
    let mut pos = 0usize;
    let mut src_size = src.len();

    let byte_at = |p: usize| -> Result<u8> { src.get(p).copied().ok_or(Error::Truncated) };
    let word_at = |p: usize| -> Result<u16> {
        if p + 2 > src.len() {
            return Err(Error::Truncated);
        }
        Ok(u16::from_le_bytes([src[p], src[p + 1]]))
    };

    // The distance of the last match; reused by the previous-distance layout.
    let mut distance = 0usize;

    while src_size > 0 {
        let opcode = byte_at(pos)?;

        let opcode_len;
        let mut literal_len = 0usize;
        let mut match_len = 0usize;

        match classify(opcode) {
            Opcode::Eos => break,
            Opcode::Nop => {
                opcode_len = 1;
            }
            Opcode::Undefined => return Err(Error::CorruptData("undefined opcode")),
            Opcode::SmallDistance => {
                opcode_len = 2;
                literal_len = ((opcode >> 6) & 3) as usize;
                match_len = (((opcode >> 3) & 7) + 3) as usize;
                if src_size <= opcode_len + literal_len {
                    break;
                }
                distance = (((opcode & 7) as usize) << 8) | byte_at(pos + 1)? as usize;
            }
            Opcode::MediumDistance => {
                opcode_len = 3;
                literal_len = ((opcode >> 3) & 3) as usize;
                if src_size <= opcode_len + literal_len {
                    break;
                }
                let extra = word_at(pos + 1)? as usize;
                match_len = (((opcode & 7) as usize) << 2 | (extra & 3)) + 3;
                distance = (extra >> 2) & 0x3FFF;
            }
            Opcode::LargeDistance => {
                opcode_len = 3;
                literal_len = ((opcode >> 6) & 3) as usize;
                match_len = (((opcode >> 3) & 7) + 3) as usize;
                if src_size <= opcode_len + literal_len {
                    break;
                }
                distance = word_at(pos + 1)? as usize;
            }
            Opcode::PreviousDistance => {
                opcode_len = 1;
                literal_len = ((opcode >> 6) & 3) as usize;
                match_len = (((opcode >> 3) & 7) + 3) as usize;
                if src_size <= opcode_len + literal_len {
                    break;
                }
            }
            Opcode::SmallMatch => {
                opcode_len = 1;
                if src_size <= opcode_len {
                    break;
                }
                match_len = (opcode & 0xF) as usize;
            }
            Opcode::LargeMatch => {
                opcode_len = 2;
                if src_size <= opcode_len {
                    break;
                }
                match_len = byte_at(pos + 1)? as usize + 16;
            }
            Opcode::SmallLiteral => {
                opcode_len = 1;
                literal_len = (opcode & 0xF) as usize;
            }
            Opcode::LargeLiteral => {
                opcode_len = 2;
                if src_size <= opcode_len {
                    break;
                }
                literal_len = byte_at(pos + 1)? as usize + 16;
            }
        }

        pos += opcode_len;
        src_size -= opcode_len.min(src_size);

        if literal_len > 0 {
            let take = literal_len.min(src_size);
            if pos + take > src.len() {
                return Err(Error::Truncated);
            }
            dst.extend_from_slice(&src[pos..pos + take]);
            pos += take;
            src_size -= take;
            if take < literal_len {
                break;
            }
        }

        if match_len > 0 {
            check_distance(&dst, distance, "invalid match distance")?;
            lz_copy(&mut dst, distance, match_len);
        }
    }

    Ok(dst)
}

/// Decompresses an LZVN stream from a reader, consuming it fully.
pub fn decompress_from<R: Read>(src: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.read_to_end(&mut buf).map_err(Error::from)?;
    decompress(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_then_small_distance_match() {
        // Small literal of 3 ("abc"), then small-distance packet 0x18
        // (LLMMMDDD: literal 0, match 3+3=6) with distance byte 3.
        let src = [0xE3, b'a', b'b', b'c', 0x18, 0x03, 0x06];
        assert_eq!(decompress(&src).unwrap(), b"abcabcabc");
    }

    #[test]
    fn previous_distance_reuses_last_match() {
        // After the first match at distance 3, opcode 70 (previous-distance,
        // LLMMM110: literal 1, match 0+3) copies one literal and rematches
        // at the same distance.
        let src = [0xE3, b'a', b'b', b'c', 0x18, 0x03, 70, b'X', 0x06];
        assert_eq!(decompress(&src).unwrap(), b"abcabcabcXbcX");
    }

    #[test]
    fn large_literal() {
        let mut src = vec![0xE0, 0x02];
        src.extend_from_slice(&[b'x'; 18]);
        src.push(0x06);
        assert_eq!(decompress(&src).unwrap(), vec![b'x'; 18]);
    }

    #[test]
    fn small_match_extends_previous() {
        // Literal "ab", small-distance match dist 2 len 3, then small match
        // opcode 0xF2 (len 2) continuing at the same distance.
        let src = [0xE2, b'a', b'b', 0x00, 0x02, 0xF2, 0x06];
        assert_eq!(decompress(&src).unwrap(), b"ababababa"[..7].to_vec());
    }

    #[test]
    fn eos_stops_decode() {
        let src = [0xE1, b'a', 0x06, 0xE1, b'z'];
        assert_eq!(decompress(&src).unwrap(), b"a");
    }

    #[test]
    fn match_with_no_distance_is_corrupt() {
        // Small match before any distance-setting packet.
        let src = [0xE1, b'a', 0xF2, 0x06];
        assert!(matches!(
            decompress(&src),
            Err(Error::CorruptData("invalid match distance"))
        ));
    }

    #[test]
    fn distance_beyond_output_is_corrupt() {
        let src = [0xE1, b'a', 0x00, 0x09, 0x06];
        assert!(matches!(
            decompress(&src),
            Err(Error::CorruptData("invalid match distance"))
        ));
    }

    #[test]
    fn undefined_opcode_is_corrupt() {
        assert!(matches!(
            decompress(&[30, 0, 0, 0]),
            Err(Error::CorruptData("undefined opcode"))
        ));
    }

    #[test]
    fn empty_input() {
        assert_eq!(decompress(b"").unwrap(), b"");
    }

    #[test]
    fn truncated_packet_body_ends_decode() {
        // Small-distance opcode with its distance byte missing: the declared
        // source size check breaks out before reading past the end.
        let src = [0xE1, b'a', 0x00];
        assert_eq!(decompress(&src).unwrap(), b"a");
    }
}
