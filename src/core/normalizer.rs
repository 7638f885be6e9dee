//! Offset-preserving text normalization.
//!
//! [`NormalizedText`] stores the normalized characters together with, for each
//! of them, the half-open UTF-32 span of the *original* input it came from.
//! Every transformation in this module rewrites both vectors in lock-step, so
//! after any chain of operations a range of normalized characters can be
//! mapped back to the input with [`NormalizedText::span`].
//!
//! Unicode normalization forms are applied per combining sequence (a starter
//! plus the non-starters that follow it). Output characters of a sequence all
//! inherit the span of the whole sequence, which is the finest alignment that
//! composition allows.

use std::ops::Range;

use unicode_normalization::char::{
    canonical_combining_class, decompose_compatible,
};
use unicode_normalization::UnicodeNormalization;
use unicode_properties::{GeneralCategory, UnicodeGeneralCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationForm {
    Nfc,
    Nfd,
    Nfkc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    chars: Vec<char>,
    spans: Vec<(u32, u32)>,
    /// Original offset one past the last input character.
    end: u32,
}

impl NormalizedText {
    /// Wrap `text`, whose first character sits at UTF-32 offset `base` of the
    /// caller's original input.
    pub fn new(text: &str, base: u32) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut spans = Vec::with_capacity(text.len());
        let mut pos = base;
        for ch in text.chars() {
            chars.push(ch);
            spans.push((pos, pos + 1));
            pos += 1;
        }
        Self {
            chars,
            spans,
            end: pos,
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn spans(&self) -> &[(u32, u32)] {
        &self.spans
    }

    /// Collect a range of normalized characters into a `String`.
    pub fn slice(&self, range: Range<usize>) -> String {
        self.chars[range].iter().collect()
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    /// Original UTF-32 span covered by the normalized characters in `range`.
    ///
    /// An empty range maps to the empty span at its position.
    pub fn span(&self, range: Range<usize>) -> (u32, u32) {
        if range.start >= range.end {
            let at = self
                .spans
                .get(range.start)
                .map(|s| s.0)
                .unwrap_or(self.end);
            return (at, at);
        }
        let start = self.spans[range.start].0;
        let end = self.spans[range.start..range.end]
            .iter()
            .map(|s| s.1)
            .max()
            .unwrap_or(start);
        (start, end.max(start))
    }

    /// Like [`span`](Self::span) but ignores leading and trailing whitespace
    /// characters of the range, unless the range is whitespace only.
    pub fn trimmed_span(&self, range: Range<usize>) -> (u32, u32) {
        let chars = &self.chars[range.clone()];
        let Some(first) = chars.iter().position(|c| !c.is_whitespace()) else {
            return self.span(range);
        };
        let last = chars
            .iter()
            .rposition(|c| !c.is_whitespace())
            .unwrap_or(first);
        self.span(range.start + first..range.start + last + 1)
    }

    /// Replace each character by zero or more characters produced by `f`.
    ///
    /// Produced characters inherit the span of the character they replace.
    pub fn transform<F>(&mut self, mut f: F)
    where
        F: FnMut(char, &mut Vec<char>),
    {
        let mut chars = Vec::with_capacity(self.chars.len());
        let mut spans = Vec::with_capacity(self.spans.len());
        let mut produced = Vec::with_capacity(4);
        for (&ch, &span) in self.chars.iter().zip(&self.spans) {
            produced.clear();
            f(ch, &mut produced);
            spans.extend(std::iter::repeat_n(span, produced.len()));
            chars.extend_from_slice(&produced);
        }
        self.chars = chars;
        self.spans = spans;
    }

    pub fn filter<F>(&mut self, keep: F)
    where
        F: Fn(char) -> bool,
    {
        self.transform(|ch, out| {
            if keep(ch) {
                out.push(ch);
            }
        });
    }

    pub fn replace_char(&mut self, from: char, to: char) {
        for ch in &mut self.chars {
            if *ch == from {
                *ch = to;
            }
        }
    }

    pub fn lowercase(&mut self) {
        if self.chars.iter().all(|c| !c.is_uppercase()) {
            return;
        }
        self.transform(|ch, out| out.extend(ch.to_lowercase()));
    }

    pub fn normalize(&mut self, form: NormalizationForm) {
        if self.chars.iter().all(char::is_ascii) {
            return;
        }
        let n = self.chars.len();
        let mut chars = Vec::with_capacity(n);
        let mut spans = Vec::with_capacity(n);
        let mut cluster = String::new();
        let mut i = 0;
        while i < n {
            let mut j = i + 1;
            while j < n && continues_cluster(self.chars[j]) {
                j += 1;
            }
            let span = (self.spans[i].0, self.spans[j - 1].1.max(self.spans[i].1));
            if j == i + 1 && self.chars[i].is_ascii() {
                chars.push(self.chars[i]);
                spans.push(self.spans[i]);
            } else {
                cluster.clear();
                cluster.extend(&self.chars[i..j]);
                let before = chars.len();
                match form {
                    NormalizationForm::Nfc => chars.extend(cluster.nfc()),
                    NormalizationForm::Nfd => chars.extend(cluster.nfd()),
                    NormalizationForm::Nfkc => chars.extend(cluster.nfkc()),
                }
                spans.extend(std::iter::repeat_n(span, chars.len() - before));
            }
            i = j;
        }
        self.chars = chars;
        self.spans = spans;
    }

    /// Decompose and drop nonspacing marks (`café` becomes `cafe`). Spacing
    /// and enclosing marks stay.
    pub fn strip_accents(&mut self) {
        if self.chars.iter().all(char::is_ascii) {
            return;
        }
        self.normalize(NormalizationForm::Nfd);
        self.filter(|ch| ch.general_category() != GeneralCategory::NonspacingMark);
    }

    /// Drop NUL, U+FFFD and control characters; map every whitespace
    /// character to an ASCII space.
    pub fn clean_controls(&mut self) {
        self.transform(|ch, out| {
            if ch == '\0' || ch == char::REPLACEMENT_CHARACTER || is_control(ch) {
                return;
            }
            out.push(if ch.is_whitespace() { ' ' } else { ch });
        });
    }

    /// Collapse runs of whitespace into one space and drop leading and
    /// trailing whitespace.
    pub fn collapse_whitespace(&mut self) {
        let mut chars = Vec::with_capacity(self.chars.len());
        let mut spans = Vec::with_capacity(self.spans.len());
        let mut pending: Option<(u32, u32)> = None;
        for (&ch, &span) in self.chars.iter().zip(&self.spans) {
            if ch.is_whitespace() {
                if !chars.is_empty() && pending.is_none() {
                    pending = Some(span);
                }
                continue;
            }
            if let Some(ws) = pending.take() {
                chars.push(' ');
                spans.push(ws);
            }
            chars.push(ch);
            spans.push(span);
        }
        self.chars = chars;
        self.spans = spans;
    }

    /// Surround CJK ideographs with spaces so that each becomes a word.
    pub fn isolate_cjk(&mut self) {
        if !self.chars.iter().copied().any(is_cjk_ideograph) {
            return;
        }
        let mut chars = Vec::with_capacity(self.chars.len() * 2);
        let mut spans = Vec::with_capacity(self.spans.len() * 2);
        for (&ch, &(start, end)) in self.chars.iter().zip(&self.spans) {
            if is_cjk_ideograph(ch) {
                chars.extend([' ', ch, ' ']);
                spans.extend([(start, start), (start, end), (end, end)]);
            } else {
                chars.push(ch);
                spans.push((start, end));
            }
        }
        self.chars = chars;
        self.spans = spans;
    }

    /// Insert `ch` at the front with an empty span at the first offset.
    pub fn prepend(&mut self, ch: char) {
        let (at, _) = self.span(0..0);
        self.chars.insert(0, ch);
        self.spans.insert(0, (at, at));
    }

    /// Ranges of maximal non-whitespace runs.
    pub fn split_whitespace(&self) -> Vec<Range<usize>> {
        let mut words = Vec::new();
        let mut start = None;
        for (i, ch) in self.chars.iter().enumerate() {
            match (ch.is_whitespace(), start) {
                (true, Some(s)) => {
                    words.push(s..i);
                    start = None;
                }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            words.push(s..self.chars.len());
        }
        words
    }
}

fn continues_cluster(ch: char) -> bool {
    if ch.is_ascii() {
        return false;
    }
    // Hangul medial vowels and final consonants have class 0 but compose
    // with the preceding jamo.
    if canonical_combining_class(ch) != 0 || ('\u{1160}'..='\u{11FF}').contains(&ch) {
        return true;
    }
    // Half-width voiced sound marks decompose to combining marks.
    let mut first = None;
    decompose_compatible(ch, |c| {
        first.get_or_insert(c);
    });
    first.is_some_and(|c| canonical_combining_class(c) != 0)
}

/// Control and format characters, excluding tab, newline and carriage return.
pub fn is_control(ch: char) -> bool {
    if matches!(ch, '\t' | '\n' | '\r') {
        return false;
    }
    if ch.is_control() {
        return true;
    }
    matches!(
        ch as u32,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xE000..=0xF8FF
    )
}

/// CJK Unified Ideographs and their extension and compatibility blocks.
pub fn is_cjk_ideograph(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}
