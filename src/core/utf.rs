//! Single code point UTF-8 / UTF-32 conversion and byte-buffer repair helpers.
//!
//! Offsets reported by the tokenizer are UTF-32 indices (one unit per code
//! point), so callers holding raw UTF-8 need a strict, allocation-free codec.
//! Unlike `char::from_u32` plus `str::from_utf8`, these functions report the
//! exact failure and never allocate.

use super::error::{Result, TokenizerError};

/// Largest valid Unicode scalar value.
pub const MAX_CODEPOINT: u32 = 0x10FFFF;

#[inline]
fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Decode one code point from the start of `bytes`.
///
/// Returns the code point and the number of bytes consumed. Malformed lead
/// bytes, missing or bad continuation bytes, overlong forms, surrogates and
/// values above U+10FFFF are rejected with
/// [`TokenizerError::InvalidEncoding`] whose `offset` points at the offending
/// byte.
pub fn utf8_to_utf32(bytes: &[u8]) -> Result<(u32, usize)> {
    let Some(&lead) = bytes.first() else {
        return Err(TokenizerError::InvalidEncoding { offset: 0 });
    };

    let (len, init, min) = match lead {
        0x00..=0x7F => return Ok((lead as u32, 1)),
        0xC0..=0xDF => (2, (lead & 0x1F) as u32, 0x80),
        0xE0..=0xEF => (3, (lead & 0x0F) as u32, 0x800),
        0xF0..=0xF7 => (4, (lead & 0x07) as u32, 0x10000),
        _ => return Err(TokenizerError::InvalidEncoding { offset: 0 }),
    };

    let mut cp = init;
    for i in 1..len {
        match bytes.get(i) {
            Some(&b) if is_continuation(b) => cp = (cp << 6) | (b & 0x3F) as u32,
            _ => return Err(TokenizerError::InvalidEncoding { offset: i }),
        }
    }

    if cp < min || cp > MAX_CODEPOINT || (0xD800..=0xDFFF).contains(&cp) {
        return Err(TokenizerError::InvalidEncoding { offset: 0 });
    }
    Ok((cp, len))
}

/// Encode one code point into `out`, returning the number of bytes written.
pub fn utf32_to_utf8(cp: u32, out: &mut [u8; 4]) -> Result<usize> {
    let ch = char::from_u32(cp).ok_or(TokenizerError::InvalidCodepoint(cp))?;
    Ok(ch.encode_utf8(out).len())
}

/// Number of UTF-32 code units (code points) in `text`.
#[inline]
pub fn utf32_len(text: &str) -> usize {
    text.chars().count()
}

/// Length of the prefix of `bytes` that does not end inside an unfinished
/// multi-byte sequence.
///
/// Invalid bytes in the middle of the buffer are part of the prefix (they are
/// repaired later); only a trailing sequence that could still be completed by
/// more input is held back.
pub fn complete_prefix_len(bytes: &[u8]) -> usize {
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(_) => return bytes.len(),
            Err(e) => match e.error_len() {
                Some(n) => start += e.valid_up_to() + n,
                None => return start + e.valid_up_to(),
            },
        }
    }
}

/// Keep only well-formed sequences, dropping invalid and truncated ones.
pub fn sanitize(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, tail) = rest.split_at(e.valid_up_to());
                // valid_up_to guarantees this prefix is well formed
                out.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(n) => rest = &tail[n..],
                    None => return out,
                }
            }
        }
    }
}
