//! Special-token registry and the splitter that isolates special tokens in
//! raw input before normalization.

use std::ops::Range;

use aho_corasick::{AhoCorasick, MatchKind};
use rustc_hash::FxHashMap;

use super::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialToken {
    pub content: String,
    pub id: u32,
    /// Absorb whitespace immediately to the left of a match.
    pub lstrip: bool,
    /// Absorb whitespace immediately to the right of a match.
    pub rstrip: bool,
}

impl SpecialToken {
    pub fn new(content: impl Into<String>, id: u32) -> Self {
        Self {
            content: content.into(),
            id,
            lstrip: false,
            rstrip: false,
        }
    }

    pub fn with_lstrip(mut self, lstrip: bool) -> Self {
        self.lstrip = lstrip;
        self
    }
}

/// A piece of raw input: ordinary text or one special-token occurrence.
/// Ranges are byte offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(Range<usize>),
    Special { id: u32, range: Range<usize> },
}

/// Ordered set of special tokens with O(1) lookup by id and by content.
#[derive(Debug, Clone, Default)]
pub struct SpecialTokens {
    tokens: Vec<SpecialToken>,
    by_id: FxHashMap<u32, usize>,
    by_content: FxHashMap<String, usize>,
    /// Automaton pattern index to token index.
    patterns: Vec<usize>,
    matcher: Option<AhoCorasick>,
}

impl SpecialTokens {
    /// Build the registry. Later duplicates of an already registered content
    /// or id are ignored.
    pub fn new(tokens: impl IntoIterator<Item = SpecialToken>) -> Result<Self> {
        let mut registry = Self::default();
        for token in tokens {
            if registry.by_content.contains_key(&token.content)
                || registry.by_id.contains_key(&token.id)
            {
                continue;
            }
            let index = registry.tokens.len();
            registry.by_id.insert(token.id, index);
            registry.by_content.insert(token.content.clone(), index);
            if !token.content.is_empty() {
                registry.patterns.push(index);
            }
            registry.tokens.push(token);
        }

        if !registry.patterns.is_empty() {
            let contents: Vec<&str> = registry
                .patterns
                .iter()
                .map(|&i| registry.tokens[i].content.as_str())
                .collect();
            // Longest match wins when candidates start at the same position.
            let matcher = AhoCorasick::builder()
                .match_kind(MatchKind::LeftmostLongest)
                .build(&contents)?;
            registry.matcher = Some(matcher);
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[inline]
    pub fn contains_id(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn id(&self, content: &str) -> Option<u32> {
        self.by_content.get(content).map(|&i| self.tokens[i].id)
    }

    pub fn content(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(|&i| self.tokens[i].content.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpecialToken> {
        self.tokens.iter()
    }

    /// Split raw input into text fragments and special-token occurrences.
    ///
    /// Matching is leftmost-longest. Whitespace absorbed through
    /// `lstrip`/`rstrip` belongs to neither neighbour.
    pub fn split(&self, text: &str) -> Vec<Fragment> {
        let Some(matcher) = &self.matcher else {
            return whole(text);
        };

        let mut fragments = Vec::new();
        let mut last = 0;
        for m in matcher.find_iter(text) {
            if m.start() < last {
                // swallowed by the previous token's rstrip
                continue;
            }
            let token = &self.tokens[self.patterns[m.pattern().as_usize()]];
            let start = if token.lstrip {
                last + text[last..m.start()].trim_end().len()
            } else {
                m.start()
            };
            let end = if token.rstrip {
                let rest = &text[m.end()..];
                m.end() + (rest.len() - rest.trim_start().len())
            } else {
                m.end()
            };

            if start > last {
                fragments.push(Fragment::Text(last..start));
            }
            fragments.push(Fragment::Special {
                id: token.id,
                range: m.start()..m.end(),
            });
            last = end;
        }
        if last < text.len() {
            fragments.push(Fragment::Text(last..text.len()));
        }
        fragments
    }
}

/// The no-split path: the whole input is one text fragment.
pub fn whole(text: &str) -> Vec<Fragment> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![Fragment::Text(0..text.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SpecialTokens {
        SpecialTokens::new([
            SpecialToken::new("<s>", 0),
            SpecialToken::new("</s>", 2),
            SpecialToken::new("<|end|>", 10),
            SpecialToken::new("<|endoftext|>", 11),
            SpecialToken::new("<mask>", 50).with_lstrip(true),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let specials = registry();
        assert_eq!(specials.len(), 5);
        assert!(specials.contains_id(50));
        assert_eq!(specials.id("</s>"), Some(2));
        assert_eq!(specials.content(11), Some("<|endoftext|>"));
        assert_eq!(specials.content(3), None);
    }

    #[test]
    fn test_split_prefers_longest() {
        let specials = registry();
        let fragments = specials.split("a<|endoftext|>b");
        assert_eq!(
            fragments,
            vec![
                Fragment::Text(0..1),
                Fragment::Special { id: 11, range: 1..14 },
                Fragment::Text(14..15),
            ]
        );
    }

    #[test]
    fn test_split_adjacent_and_edges() {
        let specials = registry();
        let fragments = specials.split("<s></s>");
        assert_eq!(
            fragments,
            vec![
                Fragment::Special { id: 0, range: 0..3 },
                Fragment::Special { id: 2, range: 3..7 },
            ]
        );
        assert!(specials.split("").is_empty());
        assert_eq!(specials.split("plain"), vec![Fragment::Text(0..5)]);
    }

    #[test]
    fn test_lstrip_absorbs_whitespace() {
        let specials = registry();
        let fragments = specials.split("a <mask> b");
        assert_eq!(
            fragments,
            vec![
                Fragment::Text(0..1),
                Fragment::Special { id: 50, range: 2..8 },
                Fragment::Text(8..10),
            ]
        );
    }

    #[test]
    fn test_duplicates_ignored() {
        let specials =
            SpecialTokens::new([SpecialToken::new("<x>", 1), SpecialToken::new("<x>", 2)])
                .unwrap();
        assert_eq!(specials.len(), 1);
        assert_eq!(specials.id("<x>"), Some(1));
    }
}
