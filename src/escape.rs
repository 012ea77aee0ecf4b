//! Percent escaping of data lines.
//!
//! Only `%`, LF and CR are escaped, as `%25`, `%0A` and `%0D`. Every other byte,
//! including non-ASCII ones, goes on the wire as is.

use crate::error::ParseError;

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

fn needs_escape(byte: u8) -> bool {
    matches!(byte, b'%' | b'\n' | b'\r')
}

pub fn escape(data: &[u8]) -> Vec<u8> {
    let extra = data.iter().filter(|&&b| needs_escape(b)).count();
    let mut out = Vec::with_capacity(data.len() + 2 * extra);
    for &byte in data {
        if needs_escape(byte) {
            out.push(b'%');
            out.push(HEX_UPPER[usize::from(byte >> 4)]);
            out.push(HEX_UPPER[usize::from(byte & 0x0f)]);
        } else {
            out.push(byte);
        }
    }
    out
}

/// Decode `%XX` sequences. Hex digits may be of either case.
pub fn unescape(data: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] != b'%' {
            out.push(data[i]);
            i += 1;
            continue;
        }

        let (hi, lo) = match data.get(i + 1..i + 3) {
            Some(&[hi, lo]) => (hi, lo),
            _ => return Err(ParseError::InvalidEscape(i)),
        };
        match (hex_value(hi), hex_value(lo)) {
            (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
            _ => return Err(ParseError::InvalidEscape(i)),
        }
        i += 3;
    }
    Ok(out)
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).map(|v| v as u8)
}
