//! The GPT-2 byte alphabet shared by Whisper, RoBERTa and CLIP vocabularies.
//!
//! Byte-level vocabularies never store raw bytes. Each byte is spelled as one
//! printable character so that merges and pieces are plain strings:
//!
//! - Bytes 33-126 (`!` to `~`), 161-172 and 174-255 stand for themselves.
//! - The other 68 bytes (controls, space, 127-160, 173) take U+0100 onwards
//!   in byte order, so space becomes `Ġ` (U+0120) and newline `Ċ` (U+010A).

use std::sync::LazyLock;

/// One past the highest alphabet character.
const ALPHABET_END: usize = 0x100 + 68;

static BYTE_TO_CHAR: LazyLock<[char; 256]> = LazyLock::new(|| {
    let mut table = ['\0'; 256];
    let mut shifted = (0x100u32..ALPHABET_END as u32).filter_map(char::from_u32);
    for (b, slot) in (0u8..=255).zip(table.iter_mut()) {
        *slot = if stands_for_itself(b) {
            char::from(b)
        } else {
            shifted.next().unwrap_or(char::REPLACEMENT_CHARACTER)
        };
    }
    table
});

/// Dense reverse table indexed by code point; every alphabet char is below
/// [`ALPHABET_END`].
static CHAR_TO_BYTE: LazyLock<[Option<u8>; ALPHABET_END]> = LazyLock::new(|| {
    let mut table = [None; ALPHABET_END];
    for (b, &ch) in BYTE_TO_CHAR.iter().enumerate() {
        table[ch as usize] = Some(b as u8);
    }
    table
});

#[inline]
fn stands_for_itself(b: u8) -> bool {
    matches!(b, 33..=126 | 161..=172 | 174..=255)
}

/// Spell `bytes` in the byte alphabet.
///
/// ```
/// use shardtok::core::byte_level::byte_level_encode;
/// assert_eq!(byte_level_encode(b" hello"), "\u{120}hello");
/// ```
#[inline]
pub fn byte_level_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| BYTE_TO_CHAR[b as usize]).collect()
}

/// The byte spelled by `ch`, if it belongs to the alphabet.
#[inline]
pub fn byte_of(ch: char) -> Option<u8> {
    CHAR_TO_BYTE.get(ch as usize).copied().flatten()
}

/// Append the raw bytes for `piece` to `out`.
///
/// Characters outside the alphabet are copied through as UTF-8. Some
/// vocabularies carry such pieces and they decode verbatim.
pub fn byte_level_decode_into(piece: &str, out: &mut Vec<u8>) {
    let mut buf = [0u8; 4];
    for ch in piece.chars() {
        match byte_of(ch) {
            Some(b) => out.push(b),
            None => out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes()),
        }
    }
}

#[inline]
pub fn byte_level_char(byte: u8) -> char {
    BYTE_TO_CHAR[byte as usize]
}

/// All 256 alphabet characters, in byte order.
pub fn alphabet() -> impl Iterator<Item = char> {
    BYTE_TO_CHAR.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_is_a_bijection() {
        let mut seen = std::collections::HashSet::new();
        for (b, ch) in alphabet().enumerate() {
            assert!(seen.insert(ch), "duplicate mapping for {ch:?}");
            assert_eq!(byte_of(ch), Some(b as u8));
        }
        assert_eq!(seen.len(), 256);
        assert_eq!(alphabet().map(|c| c as usize).max(), Some(ALPHABET_END - 1));
    }

    #[test]
    fn test_whitespace_mapping() {
        assert_eq!(byte_level_char(b' '), '\u{0120}');
        assert_eq!(byte_level_char(b'\n'), '\u{010A}');
        assert_eq!(byte_level_char(0xAD), '\u{0143}');
        for b in 33u8..=126 {
            assert_eq!(byte_level_char(b), char::from(b));
        }
    }

    #[test]
    fn test_multibyte_text_survives() {
        // "é" is C3 A9
        assert_eq!(byte_level_encode("é".as_bytes()), "\u{C3}\u{A9}");
        let original = "Hello, 世界! 🌍";
        let mut decoded = Vec::new();
        byte_level_decode_into(&byte_level_encode(original.as_bytes()), &mut decoded);
        assert_eq!(String::from_utf8(decoded).unwrap(), original);
    }

    #[test]
    fn test_decode_into_passes_unknown_chars_through() {
        let mut out = Vec::new();
        byte_level_decode_into("\u{120}hi</w>", &mut out);
        assert_eq!(out, b" hi</w>");
        out.clear();
        byte_level_decode_into("▁", &mut out);
        assert_eq!(out, "▁".as_bytes());
        assert_eq!(byte_of('▁'), None);
    }
}
