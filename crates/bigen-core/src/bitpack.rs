//! Bit-level encoding and decoding utilities
//!
//! RAM init data is a bit-packed stream read by the runtime with a tiny
//! bit decoder. Bits are written most significant first and the final byte
//! is zero padded.

use crate::error::{BuiltinsError, BuiltinsResult};
use thiserror::Error;

/// Characters reachable through the LOOKUP1/LOOKUP2 escapes.
pub const STRING_LOOKUP: &[u8; 16] = b"0123456789_ \x82\x80\"{";

/// Strings up to this length encode their length in 5 bits.
const SHORT_STRING_MAX: usize = 30;

// ===== 5-bit string symbols =====

const SYM_LOOKUP1: u32 = 26;
const SYM_LOOKUP2: u32 = 27;
const SYM_SWITCH1: u32 = 28;
const SYM_SWITCH: u32 = 29;
// 30 is unused
const SYM_EIGHTBIT: u32 = 31;

/// Errors that can occur while decoding a bit stream
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Ran past the end of the stream
    #[error("Unexpected end of bit stream at bit {0}")]
    UnexpectedEnd(usize),

    /// A 5-bit symbol with no meaning was found
    #[error("Invalid string symbol {0} at bit {1}")]
    InvalidSymbol(u32, usize),
}

/// Counters describing how string characters were encoded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StringStats {
    pub optimal: usize,
    pub lookup1: usize,
    pub lookup2: usize,
    pub switch1: usize,
    pub switch: usize,
    pub eightbit: usize,
}

/// Bit stream writer
#[derive(Debug, Default)]
pub struct BitEncoder {
    buffer: Vec<u8>,
    bit_len: usize,
    varuint_count: usize,
    varuint_bits: usize,
}

impl BitEncoder {
    /// Create an empty encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Consume the encoder and return the zero padded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn push_bit(&mut self, bit: bool) {
        let shift = self.bit_len % 8;
        if shift == 0 {
            self.buffer.push(0);
        }
        if bit {
            if let Some(last) = self.buffer.last_mut() {
                *last |= 0x80 >> shift;
            }
        }
        self.bit_len += 1;
    }

    /// Emit `value` as an `n`-bit field.
    pub fn bits(&mut self, value: u32, n: u32) -> BuiltinsResult<()> {
        if n < 32 && (value >> n) != 0 {
            return Err(BuiltinsError::BitOverflow {
                value: u64::from(value),
                bits: n,
            });
        }
        for i in (0..n).rev() {
            self.push_bit((value >> i) & 1 != 0);
        }
        Ok(())
    }

    /// Emit a signed value after checking that it is non-negative.
    pub fn bits_i64(&mut self, value: i64, n: u32) -> BuiltinsResult<()> {
        match u32::try_from(value) {
            Ok(v) => self.bits(v, n),
            Err(_) => Err(BuiltinsError::BitOverflow {
                value: value as u64,
                bits: n,
            }),
        }
    }

    /// Emit a single flag bit.
    pub fn flag(&mut self, set: bool) {
        self.push_bit(set);
    }

    /// Emit raw bytes, 8 bits each.
    pub fn bytes(&mut self, data: &[u8]) {
        for &b in data {
            for i in (0..8).rev() {
                self.push_bit((b >> i) & 1 != 0);
            }
        }
    }

    /// Emit a variable length unsigned integer.
    ///
    /// A 2-bit selector picks one of: zero, 1..4 in 2 bits, 5..36 in 5 bits,
    /// 37..163 in 7 bits, or an escaped 20-bit value.
    pub fn varuint(&mut self, value: u32) -> BuiltinsResult<()> {
        let start = self.bit_len;
        match value {
            0 => self.bits(0, 2)?,
            1..=4 => {
                self.bits(1, 2)?;
                self.bits(value - 1, 2)?;
            }
            5..=36 => {
                self.bits(2, 2)?;
                self.bits(value - 5, 5)?;
            }
            37..=163 => {
                self.bits(3, 2)?;
                self.bits(value - 37 + 1, 7)?;
            }
            _ => {
                if value >= (1 << 20) {
                    return Err(BuiltinsError::VaruintOverflow {
                        value: u64::from(value),
                    });
                }
                self.bits(3, 2)?;
                self.bits(0, 7)?;
                self.bits(value, 20)?;
            }
        }
        self.varuint_count += 1;
        self.varuint_bits += self.bit_len - start;
        Ok(())
    }

    /// Average varuint size in bits, for diagnostics.
    pub fn varuint_efficiency(&self) -> Option<f64> {
        if self.varuint_count == 0 {
            None
        } else {
            Some(self.varuint_bits as f64 / self.varuint_count as f64)
        }
    }
}

fn is_lower(b: u8) -> bool {
    b.is_ascii_lowercase()
}

fn is_upper(b: u8) -> bool {
    b.is_ascii_uppercase()
}

/// Bit-pack a string into the 5-bit string format shared by string and
/// object init data.
pub fn pack_string(enc: &mut BitEncoder, s: &[u8], stats: &mut StringStats) -> BuiltinsResult<()> {
    if s.len() > 0xff {
        return Err(BuiltinsError::StringTooLong { len: s.len() });
    }
    if s.len() <= SHORT_STRING_MAX {
        enc.bits(s.len() as u32, 5)?;
    } else {
        enc.bits(31, 5)?;
        enc.bits(s.len() as u32, 8)?;
    }

    let mut uppercase = false;
    for (idx, &c) in s.iter().enumerate() {
        let next = s.get(idx + 1).copied();
        let next_lower = next.is_some_and(is_lower);
        let next_upper = next.is_some_and(is_upper);

        if is_lower(c) && !uppercase {
            enc.bits(u32::from(c - b'a'), 5)?;
            stats.optimal += 1;
        } else if is_upper(c) && uppercase {
            enc.bits(u32::from(c - b'A'), 5)?;
            stats.optimal += 1;
        } else if is_lower(c) {
            if next_lower {
                enc.bits(SYM_SWITCH, 5)?;
                uppercase = false;
                stats.switch += 1;
            } else {
                enc.bits(SYM_SWITCH1, 5)?;
                stats.switch1 += 1;
            }
            enc.bits(u32::from(c - b'a'), 5)?;
        } else if is_upper(c) {
            if next_upper {
                enc.bits(SYM_SWITCH, 5)?;
                uppercase = true;
                stats.switch += 1;
            } else {
                enc.bits(SYM_SWITCH1, 5)?;
                stats.switch1 += 1;
            }
            enc.bits(u32::from(c - b'A'), 5)?;
        } else if let Some(pos) = STRING_LOOKUP.iter().position(|&l| l == c) {
            if pos >= 8 {
                enc.bits(SYM_LOOKUP2, 5)?;
                enc.bits((pos - 8) as u32, 3)?;
                stats.lookup2 += 1;
            } else {
                enc.bits(SYM_LOOKUP1, 5)?;
                enc.bits(pos as u32, 3)?;
                stats.lookup1 += 1;
            }
        } else {
            enc.bits(SYM_EIGHTBIT, 5)?;
            enc.bits(u32::from(c), 8)?;
            stats.eightbit += 1;
        }
    }
    Ok(())
}

/// Bit stream reader, the inverse of [`BitEncoder`].
pub struct BitDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitDecoder<'a> {
    /// Create a decoder positioned at the first bit
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current bit position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read an `n`-bit field.
    pub fn bits(&mut self, n: u32) -> Result<u32, DecodeError> {
        let mut value = 0u32;
        for _ in 0..n {
            let byte = self
                .data
                .get(self.pos / 8)
                .ok_or(DecodeError::UnexpectedEnd(self.pos))?;
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }
        Ok(value)
    }

    /// Read a single flag bit.
    pub fn flag(&mut self) -> Result<bool, DecodeError> {
        Ok(self.bits(1)? != 0)
    }

    /// Read `n` raw bytes.
    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>, DecodeError> {
        (0..n).map(|_| self.bits(8).map(|b| b as u8)).collect()
    }

    /// Read a variable length unsigned integer.
    pub fn varuint(&mut self) -> Result<u32, DecodeError> {
        match self.bits(2)? {
            0 => Ok(0),
            1 => Ok(self.bits(2)? + 1),
            2 => Ok(self.bits(5)? + 5),
            _ => match self.bits(7)? {
                0 => self.bits(20),
                t => Ok(t - 1 + 37),
            },
        }
    }

    /// Read a bit-packed string.
    pub fn string(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut len = self.bits(5)? as usize;
        if len == 31 {
            len = self.bits(8)? as usize;
        }
        let mut out = Vec::with_capacity(len);
        let mut uppercase = false;
        for _ in 0..len {
            let at = self.pos;
            let sym = self.bits(5)?;
            let c = match sym {
                0..=25 => (if uppercase { b'A' } else { b'a' }) + sym as u8,
                SYM_LOOKUP1 => STRING_LOOKUP[self.bits(3)? as usize],
                SYM_LOOKUP2 => STRING_LOOKUP[8 + self.bits(3)? as usize],
                SYM_SWITCH1 => {
                    let t = self.bits(5)? as u8;
                    (if uppercase { b'a' } else { b'A' }) + t
                }
                SYM_SWITCH => {
                    uppercase = !uppercase;
                    let t = self.bits(5)? as u8;
                    (if uppercase { b'A' } else { b'a' }) + t
                }
                SYM_EIGHTBIT => self.bits(8)? as u8,
                other => return Err(DecodeError::InvalidSymbol(other, at)),
            };
            out.push(c);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(s: &[u8]) -> (Vec<u8>, usize) {
        let mut enc = BitEncoder::new();
        let mut stats = StringStats::default();
        pack_string(&mut enc, s, &mut stats).unwrap();
        let bits = enc.bit_len();
        (enc.into_bytes(), bits)
    }

    #[test]
    fn test_bits_msb_first_with_padding() {
        let mut enc = BitEncoder::new();
        enc.bits(0b101, 3).unwrap();
        assert_eq!(enc.bit_len(), 3);
        assert_eq!(enc.into_bytes(), vec![0b1010_0000]);
    }

    #[test]
    fn test_bits_overflow() {
        let mut enc = BitEncoder::new();
        let err = enc.bits(8, 3).unwrap_err();
        assert!(matches!(err, BuiltinsError::BitOverflow { value: 8, bits: 3 }));
        assert!(enc.bits_i64(-1, 3).is_err());
    }

    #[test]
    fn test_varuint_sizes() {
        let cases: [(u32, usize); 8] = [
            (0, 2),
            (1, 4),
            (4, 4),
            (5, 7),
            (36, 7),
            (37, 9),
            (163, 9),
            (164, 29),
        ];
        for (value, size) in cases {
            let mut enc = BitEncoder::new();
            enc.varuint(value).unwrap();
            assert_eq!(enc.bit_len(), size, "varuint {}", value);
            let bytes = enc.into_bytes();
            let mut dec = BitDecoder::new(&bytes);
            assert_eq!(dec.varuint().unwrap(), value);
        }
    }

    #[test]
    fn test_varuint_overflow() {
        let mut enc = BitEncoder::new();
        assert!(matches!(
            enc.varuint(1 << 20),
            Err(BuiltinsError::VaruintOverflow { .. })
        ));
    }

    #[test]
    fn test_pack_string_lowercase_is_optimal() {
        let (_, bits) = packed(b"abc");
        assert_eq!(bits, 5 + 3 * 5);
    }

    #[test]
    fn test_pack_string_case_switches() {
        // 'M' uses SWITCH1 (next is lower), "AB" uses SWITCH once
        let (bytes, bits) = packed(b"MaxAB");
        assert_eq!(bits, 5 + 10 + 5 + 5 + 10 + 5);
        let mut dec = BitDecoder::new(&bytes);
        assert_eq!(dec.string().unwrap(), b"MaxAB");
    }

    #[test]
    fn test_pack_string_lookup_and_eightbit() {
        let mut enc = BitEncoder::new();
        let mut stats = StringStats::default();
        pack_string(&mut enc, b"a1{\x82\xff", &mut stats).unwrap();
        assert_eq!(stats.optimal, 1);
        assert_eq!(stats.lookup1, 1);
        assert_eq!(stats.lookup2, 2);
        assert_eq!(stats.eightbit, 1);
        let bytes = enc.into_bytes();
        assert_eq!(BitDecoder::new(&bytes).string().unwrap(), b"a1{\x82\xff");
    }

    #[test]
    fn test_pack_long_string_length_escape() {
        let s = vec![b'x'; 40];
        let (bytes, bits) = packed(&s);
        assert_eq!(bits, 5 + 8 + 40 * 5);
        assert_eq!(BitDecoder::new(&bytes).string().unwrap(), s);
    }

    #[test]
    fn test_pack_string_too_long() {
        let mut enc = BitEncoder::new();
        let mut stats = StringStats::default();
        let s = vec![b'x'; 256];
        assert!(matches!(
            pack_string(&mut enc, &s, &mut stats),
            Err(BuiltinsError::StringTooLong { len: 256 })
        ));
    }

    #[test]
    fn test_decoder_unexpected_end() {
        let mut dec = BitDecoder::new(&[0xff]);
        assert_eq!(dec.bits(8).unwrap(), 0xff);
        assert!(matches!(dec.bits(1), Err(DecodeError::UnexpectedEnd(8))));
    }
}
