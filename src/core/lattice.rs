//! Minimum-cost word segmentation over a MeCab dictionary.
//!
//! Nodes live in one arena and refer to their best predecessor by index. Every
//! start position gets dictionary matches plus unknown-word candidates: a
//! single character always, and for katakana, Latin letters and digits the
//! whole run of that class. This keeps the lattice connected for any input.

use std::ops::Range;

use tracing::trace;

use super::dictionary::Dictionary;
use super::normalizer::is_cjk_ideograph;

/// Character classes used for unknown-word candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Space,
    Hiragana,
    Katakana,
    Kanji,
    Alpha,
    Numeric,
    Symbol,
    Other,
}

impl CharClass {
    pub fn of(ch: char) -> Self {
        match ch {
            _ if ch.is_whitespace() => CharClass::Space,
            '\u{3041}'..='\u{309F}' => CharClass::Hiragana,
            '\u{30A0}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' | '\u{FF66}'..='\u{FF9F}' => {
                CharClass::Katakana
            }
            '\u{3005}' | '\u{3007}' => CharClass::Kanji,
            _ if is_cjk_ideograph(ch) => CharClass::Kanji,
            _ if ch.is_numeric() => CharClass::Numeric,
            _ if ch.is_alphabetic() => CharClass::Alpha,
            _ if ch.is_ascii_punctuation() || (!ch.is_alphanumeric() && !ch.is_control()) => {
                CharClass::Symbol
            }
            _ => CharClass::Other,
        }
    }

    /// Runs of this class are offered as one unknown word.
    fn groups(self) -> bool {
        matches!(
            self,
            CharClass::Katakana | CharClass::Alpha | CharClass::Numeric
        )
    }

    /// Word cost of an unknown candidate of this class.
    fn unknown_cost(self) -> i32 {
        match self {
            CharClass::Alpha | CharClass::Numeric => 1500,
            CharClass::Symbol | CharClass::Space => 2000,
            CharClass::Katakana => 2500,
            CharClass::Hiragana => 4000,
            CharClass::Kanji => 5000,
            CharClass::Other => 6000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    start: usize,
    right_id: u16,
    total: i64,
    prev: usize,
}

const BOS: usize = 0;

/// Split `chars` into words, returned as char ranges covering the input.
pub fn segment(dictionary: &Dictionary, chars: &[char]) -> Vec<Range<usize>> {
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }

    let mut nodes = vec![Node {
        start: 0,
        right_id: 0,
        total: 0,
        prev: BOS,
    }];
    // ends_at[i] lists the nodes whose word ends at char i
    let mut ends_at: Vec<Vec<usize>> = vec![Vec::new(); n + 1];
    ends_at[0].push(BOS);

    let mut candidates: Vec<(usize, u16, u16, i32)> = Vec::new();
    for start in 0..n {
        if ends_at[start].is_empty() {
            continue;
        }
        candidates.clear();
        for (len, entries) in dictionary.lookup(&chars[start..]) {
            for entry in entries {
                candidates.push((len, entry.left_id, entry.right_id, entry.cost as i32));
            }
        }
        let class = CharClass::of(chars[start]);
        candidates.push((1, 0, 0, class.unknown_cost()));
        if class.groups() {
            let run = chars[start..]
                .iter()
                .take_while(|&&c| CharClass::of(c) == class)
                .count();
            if run > 1 {
                candidates.push((run, 0, 0, class.unknown_cost()));
            }
        }

        for &(len, left_id, right_id, cost) in &candidates {
            let Some((prev, total)) = best_predecessor(dictionary, &nodes, &ends_at[start], left_id)
            else {
                continue;
            };
            nodes.push(Node {
                start,
                right_id,
                total: total + cost as i64,
                prev,
            });
            ends_at[start + len].push(nodes.len() - 1);
        }
    }

    // close the path with the end-of-sentence context
    let Some((mut current, _)) = best_predecessor(dictionary, &nodes, &ends_at[n], 0) else {
        return vec![0..n];
    };
    let mut words = Vec::new();
    let mut end = n;
    while current != BOS {
        let node = nodes[current];
        words.push(node.start..end);
        end = node.start;
        current = node.prev;
    }
    words.reverse();
    trace!(chars = n, nodes = nodes.len(), words = words.len(), "lattice segmented");
    words
}

/// Cheapest node in `ending` to precede a node with `left_id`, with the path
/// cost including the connection. Ties keep the earliest node.
fn best_predecessor(
    dictionary: &Dictionary,
    nodes: &[Node],
    ending: &[usize],
    left_id: u16,
) -> Option<(usize, i64)> {
    let mut best: Option<(usize, i64)> = None;
    for &index in ending {
        let node = &nodes[index];
        let total = node.total + dictionary.connection_cost(node.right_id, left_id) as i64;
        if best.is_none_or(|(_, current)| total < current) {
            best = Some((index, total));
        }
    }
    best
}
