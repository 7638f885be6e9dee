//! Pre-tokenizers: split normalized text into segments that the subword
//! models encode independently.
//!
//! Segments are returned as ranges of normalized characters so that the
//! caller can map every produced token back to the original input.

use std::ops::Range;

use fancy_regex::Regex;

use super::error::Result;
use super::normalizer::NormalizedText;

/// GPT-2 split pattern, shared by Whisper and RoBERTa.
pub const GPT2_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// CLIP split pattern. Whitespace is not part of any match and disappears.
pub const CLIP_PATTERN: &str = r"(?i)'s|'t|'re|'ve|'m|'ll|'d|[\p{L}]+|[\p{N}]|[^\s\p{L}\p{N}]+";

/// Byte offset of every char of `text`, plus `text.len()` as sentinel.
pub(crate) fn char_byte_offsets(text: &str) -> Vec<usize> {
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    offsets
}

/// Index of the char containing byte `byte`, given offsets from
/// [`char_byte_offsets`].
#[inline]
pub(crate) fn char_index_at(offsets: &[usize], byte: usize) -> usize {
    offsets.partition_point(|&b| b <= byte).saturating_sub(1)
}

/// Number of chars that start before byte `byte`.
#[inline]
pub(crate) fn char_index_end(offsets: &[usize], byte: usize) -> usize {
    offsets[..offsets.len() - 1].partition_point(|&b| b < byte)
}

/// Regex driven splitter used by the byte-level families.
#[derive(Debug)]
pub struct RegexSplitter {
    regex: Regex,
}

impl RegexSplitter {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// Char ranges of every match, in order. Unmatched characters are dropped.
    pub fn split(&self, text: &NormalizedText) -> Result<Vec<Range<usize>>> {
        let joined = text.as_string();
        let offsets = char_byte_offsets(&joined);
        let mut ranges = Vec::new();
        for m in self.regex.find_iter(&joined) {
            let m = m?;
            if m.start() == m.end() {
                continue;
            }
            ranges.push(char_index_at(&offsets, m.start())..char_index_end(&offsets, m.end()));
        }
        Ok(ranges)
    }
}

/// BERT's basic tokenizer: text cleanup, optional lower-casing and accent
/// stripping, then whitespace and punctuation splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicTokenizer {
    pub lowercase: bool,
    pub strip_accents: bool,
    pub tokenize_chinese_chars: bool,
}

impl BasicTokenizer {
    pub fn normalize(&self, text: &mut NormalizedText) {
        text.clean_controls();
        if self.tokenize_chinese_chars {
            text.isolate_cjk();
        }
        if self.lowercase {
            text.lowercase();
        }
        if self.strip_accents {
            text.strip_accents();
        }
    }

    pub fn split(&self, text: &NormalizedText) -> Vec<Range<usize>> {
        let chars = text.chars();
        let mut words = Vec::new();
        for word in text.split_whitespace() {
            let mut start = word.start;
            for i in word.clone() {
                if is_punctuation(chars[i]) {
                    if start < i {
                        words.push(start..i);
                    }
                    words.push(i..i + 1);
                    start = i + 1;
                }
            }
            if start < word.end {
                words.push(start..word.end);
            }
        }
        words
    }
}

/// ASCII symbols plus the Unicode punctuation blocks.
pub fn is_punctuation(ch: char) -> bool {
    let cp = ch as u32;
    if ch.is_ascii() {
        return (0x21..=0x2F).contains(&cp)
            || (0x3A..=0x40).contains(&cp)
            || (0x5B..=0x60).contains(&cp)
            || (0x7B..=0x7E).contains(&cp);
    }
    matches!(
        cp,
        0x00A1
            | 0x00A7
            | 0x00AB
            | 0x00B6
            | 0x00B7
            | 0x00BB
            | 0x00BF
            | 0x037E
            | 0x0387
            | 0x055A..=0x055F
            | 0x0589..=0x058A
            | 0x060C..=0x060D
            | 0x061B
            | 0x061F
            | 0x066A..=0x066D
            | 0x06D4
            | 0x0964..=0x0965
            | 0x0E4F
            | 0x0E5A..=0x0E5B
            | 0x2010..=0x2027
            | 0x2030..=0x205E
            | 0x207D..=0x207E
            | 0x208D..=0x208E
            | 0x2308..=0x230B
            | 0x2329..=0x232A
            | 0x2E00..=0x2E7F
            | 0x3001..=0x3003
            | 0x3008..=0x3011
            | 0x3014..=0x301F
            | 0x3030
            | 0x303D
            | 0x30A0
            | 0x30FB
            | 0xFE10..=0xFE19
            | 0xFE30..=0xFE52
            | 0xFE54..=0xFE61
            | 0xFE63
            | 0xFE68
            | 0xFE6A..=0xFE6B
            | 0xFF01..=0xFF03
            | 0xFF05..=0xFF0A
            | 0xFF0C..=0xFF0F
            | 0xFF1A..=0xFF1B
            | 0xFF1F..=0xFF20
            | 0xFF3B..=0xFF3D
            | 0xFF3F
            | 0xFF5B
            | 0xFF5D
            | 0xFF5F..=0xFF65
    )
}
