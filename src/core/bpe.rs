//! Byte-pair merging.
//!
//! [`merge_symbols`] is the shared merge loop: symbols form a doubly linked
//! list, candidate pairs sit in a binary heap keyed by priority and position,
//! and stale heap entries are discarded when popped. Each merge is
//! O(log n), avoiding the O(n²) rescans of the naive algorithm on long
//! segments.
//!
//! [`ByteLevelBpe`] drives the loop with GPT-2 merge ranks over the byte-level
//! alphabet. SentencePiece BPE reuses the same loop with piece scores as
//! priority (see `unigram.rs`).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::byte_level::{alphabet, byte_level_char, byte_level_decode_into, byte_level_encode};
use super::error::{Result, TokenizerError};
use super::model::Piece;
use super::vocab::Vocabulary;

/// Default number of cached segment encodings.
pub const DEFAULT_CACHE_SIZE: usize = 4096;

/// A symbol of the merge list. `start..end` is its byte range in the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Symbol {
    pub text: String,
    pub id: Option<u32>,
    pub start: usize,
    pub end: usize,
}

struct Node {
    symbol: Symbol,
    prev: Option<usize>,
    next: Option<usize>,
    alive: bool,
}

/// Piece score ordered with `f32::total_cmp`, for max-score-first merging.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Score(pub f32);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// (priority, left, right, left_len, right_len, merged_id). The lengths
/// detect entries made stale by an earlier merge.
type Candidate<R> = Reverse<(R, usize, usize, usize, usize, u32)>;

/// Repeatedly merge the adjacent pair with the lowest priority value.
///
/// `priority(left, right)` returns the priority and the id of the merged
/// symbol, or `None` if the pair does not merge. Ties go to the leftmost pair.
pub(crate) fn merge_symbols<R, F>(symbols: Vec<Symbol>, priority: F) -> Vec<Symbol>
where
    R: Ord + Copy,
    F: Fn(&Symbol, &Symbol) -> Option<(R, u32)>,
{
    if symbols.len() < 2 {
        return symbols;
    }

    let count = symbols.len();
    let mut nodes: Vec<Node> = symbols
        .into_iter()
        .enumerate()
        .map(|(i, symbol)| Node {
            symbol,
            prev: i.checked_sub(1),
            next: (i + 1 < count).then_some(i + 1),
            alive: true,
        })
        .collect();

    let mut heap: BinaryHeap<Candidate<R>> = BinaryHeap::new();
    let push = |heap: &mut BinaryHeap<Candidate<R>>, nodes: &[Node], left: usize, right: usize| {
        let (a, b) = (&nodes[left].symbol, &nodes[right].symbol);
        if let Some((rank, id)) = priority(a, b) {
            heap.push(Reverse((rank, left, right, a.text.len(), b.text.len(), id)));
        }
    };

    for i in 0..count - 1 {
        push(&mut heap, &nodes, i, i + 1);
    }

    while let Some(Reverse((_, left, right, left_len, right_len, id))) = heap.pop() {
        let valid = nodes[left].alive
            && nodes[right].alive
            && nodes[left].next == Some(right)
            && nodes[left].symbol.text.len() == left_len
            && nodes[right].symbol.text.len() == right_len;
        if !valid {
            continue;
        }

        let right_node = std::mem::replace(
            &mut nodes[right],
            Node {
                symbol: Symbol {
                    text: String::new(),
                    id: None,
                    start: 0,
                    end: 0,
                },
                prev: None,
                next: None,
                alive: false,
            },
        );
        let merged = &mut nodes[left].symbol;
        merged.text.push_str(&right_node.symbol.text);
        merged.id = Some(id);
        merged.end = right_node.symbol.end;
        nodes[left].next = right_node.next;
        if let Some(next) = right_node.next {
            nodes[next].prev = Some(left);
            push(&mut heap, &nodes, left, next);
        }
        if let Some(prev) = nodes[left].prev {
            push(&mut heap, &nodes, prev, left);
        }
    }

    nodes
        .into_iter()
        .filter(|n| n.alive)
        .map(|n| n.symbol)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteLevelBpeOptions {
    /// Suffix appended to the last symbol of every segment (`</w>` for CLIP).
    pub end_of_word_suffix: Option<String>,
    pub unk_id: Option<u32>,
    /// Group pieces that end inside a multi-byte character.
    pub utf8_safe: bool,
    pub cache_size: usize,
}

/// GPT-2 style BPE over the byte-level alphabet.
#[derive(Debug)]
pub struct ByteLevelBpe {
    /// (left id, right id) to (rank, merged id).
    merges: FxHashMap<(u32, u32), (u32, u32)>,
    options: ByteLevelBpeOptions,
    cache: Mutex<LruCache<String, Vec<Piece>>>,
}

impl ByteLevelBpe {
    /// Validate `merges` against `vocab` and build the rank table.
    ///
    /// Every merge operand and result must be a vocabulary piece. When any
    /// merge is present the whole byte alphabet must be too, otherwise some
    /// inputs could produce pieces with no id.
    pub fn new(
        vocab: &Vocabulary,
        merges: &[(String, String)],
        options: ByteLevelBpeOptions,
    ) -> Result<Self> {
        let mut table = FxHashMap::default();
        table.reserve(merges.len());
        for (rank, (a, b)) in merges.iter().enumerate() {
            let lookup = |piece: &str| {
                vocab.id(piece).ok_or_else(|| {
                    TokenizerError::Inconsistent(format!(
                        "merge {} `{a} {b}` refers to {piece:?}, which is not in the vocabulary",
                        rank + 1
                    ))
                })
            };
            let left = lookup(a.as_str())?;
            let right = lookup(b.as_str())?;
            let merged = lookup(&format!("{a}{b}"))?;
            table.entry((left, right)).or_insert((rank as u32, merged));
        }

        if !merges.is_empty() {
            let suffix = options.end_of_word_suffix.as_deref().unwrap_or("");
            for ch in alphabet() {
                let plain = ch.to_string();
                if !vocab.contains(&plain) && !vocab.contains(&format!("{plain}{suffix}")) {
                    return Err(TokenizerError::Inconsistent(format!(
                        "byte-level symbol {ch:?} is missing from the vocabulary"
                    )));
                }
            }
        }

        debug!(
            merges = table.len(),
            vocab_size = vocab.len(),
            suffix = ?options.end_of_word_suffix,
            "byte-level BPE initialized"
        );

        let capacity = NonZeroUsize::new(options.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            merges: table,
            options,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn end_of_word_suffix(&self) -> Option<&str> {
        self.options.end_of_word_suffix.as_deref()
    }

    /// Encode one pre-tokenized segment. Piece offsets are bytes of `segment`.
    ///
    /// A symbol left without a vocabulary id after merging becomes the unknown
    /// token. Without one it is dropped with a `warn!`, so the pieces may
    /// cover less than `segment` and decoding will not restore it. A
    /// vocabulary holding the full byte alphabet never hits this.
    pub fn encode_segment(&self, segment: &str, vocab: &Vocabulary) -> Vec<Piece> {
        if segment.is_empty() {
            return Vec::new();
        }

        // Fast path: the whole segment is a vocabulary piece
        let mut whole = byte_level_encode(segment.as_bytes());
        if let Some(suffix) = &self.options.end_of_word_suffix {
            whole.push_str(suffix);
        }
        if let Some(id) = vocab.id(&whole) {
            return vec![Piece::new(id, 0, segment.len())];
        }

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(segment) {
                return cached.clone();
            }
        }

        let pieces = self.merge_segment(segment, vocab);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(segment.to_string(), pieces.clone());
        }
        pieces
    }

    /// Merge the byte symbols of `segment`. Symbols with no id and no unknown
    /// token to fall back on are dropped from the result.
    fn merge_segment(&self, segment: &str, vocab: &Vocabulary) -> Vec<Piece> {
        let bytes = segment.as_bytes();
        let last = bytes.len() - 1;
        let symbols = bytes
            .iter()
            .enumerate()
            .map(|(i, &b)| {
                let mut text = byte_level_char(b).to_string();
                if i == last {
                    if let Some(suffix) = &self.options.end_of_word_suffix {
                        text.push_str(suffix);
                    }
                }
                let id = vocab.id(&text);
                Symbol {
                    text,
                    id,
                    start: i,
                    end: i + 1,
                }
            })
            .collect();

        let merged = merge_symbols(symbols, |a, b| {
            self.merges.get(&(a.id?, b.id?)).copied()
        });

        let mut pieces = Vec::with_capacity(merged.len());
        for symbol in merged {
            match symbol.id.or(self.options.unk_id) {
                Some(id) => pieces.push(Piece::new(id, symbol.start, symbol.end)),
                None => warn!(symbol = %symbol.text, "dropping symbol with no vocabulary id"),
            }
        }

        if self.options.utf8_safe {
            group_partial_chars(segment, pieces, vocab, self.end_of_word_suffix())
        } else {
            pieces
        }
    }

    /// Append the raw bytes of `piece` to `out`. An end-of-word suffix turns
    /// into a single space.
    pub fn render_piece(&self, piece: &str, out: &mut Vec<u8>) {
        match self
            .options
            .end_of_word_suffix
            .as_deref()
            .and_then(|suffix| piece.strip_suffix(suffix))
        {
            Some(stem) => {
                byte_level_decode_into(stem, out);
                out.push(b' ');
            }
            None => byte_level_decode_into(piece, out),
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Merge runs of pieces that end inside a multi-byte character.
///
/// A run is replaced by one token when its bytes form a vocabulary piece;
/// otherwise the members are kept and their byte ranges, rounded out to
/// character boundaries by the caller, cover the whole character.
fn group_partial_chars(
    segment: &str,
    pieces: Vec<Piece>,
    vocab: &Vocabulary,
    suffix: Option<&str>,
) -> Vec<Piece> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(pieces.len());
    let mut i = 0;
    while i < pieces.len() {
        let mut j = i;
        while j + 1 < pieces.len() && !segment.is_char_boundary(pieces[j].end) {
            j += 1;
        }
        if j == i {
            out.push(pieces[i]);
            i += 1;
            continue;
        }
        let (start, end) = (pieces[i].start, pieces[j].end);
        let mut joined = byte_level_encode(&bytes[start..end]);
        if end == bytes.len() {
            if let Some(suffix) = suffix {
                joined.push_str(suffix);
            }
        }
        match vocab.id(&joined) {
            Some(id) => out.push(Piece::new(id, start, end)),
            None => out.extend_from_slice(&pieces[i..=j]),
        }
        i = j + 1;
    }
    out
}
