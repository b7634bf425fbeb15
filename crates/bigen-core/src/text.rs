//! Byte string helpers
//!
//! Metadata documents are text, but builtin strings are arbitrary byte
//! sequences (symbols carry 0x80..0xFF marker bytes). Code points
//! U+0000..U+00FF are identified with bytes 0x00..0xFF so that any byte
//! sequence, including invalid UTF-8, can be written down exactly.

use crate::error::{BuiltinsError, BuiltinsResult};

/// Convert document text into bytes, one byte per code point.
pub fn text_to_bytes(text: &str) -> BuiltinsResult<Vec<u8>> {
    text.chars()
        .map(|c| {
            let cp = c as u32;
            if cp > 0xff {
                Err(BuiltinsError::InvalidCodepoint {
                    text: text.to_string(),
                    codepoint: cp,
                })
            } else {
                Ok(cp as u8)
            }
        })
        .collect()
}

/// Convert bytes back into text, one code point per byte.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Printable, escaped form of a byte string for logs and C comments.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('\'');
    for &b in bytes {
        match b {
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            // Keep C comments intact
            b'*' | b'/' => out.push_str(&format!("\\x{:02x}", b)),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('\'');
    out
}

/// True if the string is a canonical ECMAScript array index.
pub fn is_array_index(bytes: &[u8]) -> bool {
    if bytes.is_empty() || bytes.len() > 10 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    let value = bytes
        .iter()
        .fold(0u64, |acc, &b| acc * 10 + u64::from(b - b'0'));
    value <= 0xffff_fffe
}

/// Character length as computed by the runtime: UTF-8 continuation bytes
/// are not counted, no validation is done.
pub fn char_length(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| (b & 0xc0) != 0x80).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_bytes_identity() {
        let bytes = text_to_bytes("a\u{82}b\u{ff}").unwrap();
        assert_eq!(bytes, vec![b'a', 0x82, b'b', 0xff]);
        assert_eq!(bytes_to_text(&bytes), "a\u{82}b\u{ff}");
    }

    #[test]
    fn test_text_rejects_wide_codepoint() {
        let err = text_to_bytes("x\u{100}").unwrap_err();
        assert!(matches!(
            err,
            BuiltinsError::InvalidCodepoint { codepoint: 0x100, .. }
        ));
    }

    #[test]
    fn test_array_index() {
        assert!(is_array_index(b"0"));
        assert!(is_array_index(b"123"));
        assert!(is_array_index(b"4294967294"));
        assert!(!is_array_index(b"4294967295"));
        assert!(!is_array_index(b"01"));
        assert!(!is_array_index(b"+1"));
        assert!(!is_array_index(b""));
        assert!(!is_array_index(b"length"));
    }

    #[test]
    fn test_char_length() {
        assert_eq!(char_length(b"abc"), 3);
        // U+00E4 in UTF-8
        assert_eq!(char_length(&[0xc3, 0xa4]), 1);
        // 0x82 looks like a continuation byte and is not counted
        assert_eq!(char_length(&[0x82, b'x']), 1);
        assert_eq!(char_length(&[0xff, b'x']), 2);
    }

    #[test]
    fn test_escape_bytes() {
        assert_eq!(escape_bytes(b"abc"), "'abc'");
        assert_eq!(escape_bytes(&[0x82, b'x']), "'\\x82x'");
    }
}
