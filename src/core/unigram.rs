//! SentencePiece encoding: unigram Viterbi search and score-ordered BPE.
//!
//! Both algorithms run on the whole normalized input (no pre-tokenization);
//! word boundaries are carried by the `▁` marker the normalizer inserts in
//! place of spaces. The piece table lives in SentencePiece order; output ids
//! are translated through the session vocabulary so that layouts which shift
//! or extend the table (fairseq offsets, T5 extra ids, Marian vocab.json) all
//! share this code.

use std::cmp::Reverse;

use tracing::debug;

use super::bpe::{merge_symbols, Score, Symbol};
use super::error::{Result, TokenizerError};
use super::model::Piece;
use super::normalizer::{NormalizationForm, NormalizedText};
use super::pretokenizer::char_byte_offsets;
use super::spm_model::{NormalizerSpec, PieceType, SentencePieceModel, SpmAlgorithm};
use super::trie::PrefixTrie;
use super::vocab::Vocabulary;

/// Word boundary marker (U+2581).
pub const SPACE_MARKER: char = '\u{2581}';

/// Score penalty applied below the lowest piece score for unknown characters.
const UNK_PENALTY: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct SentencePiece {
    algorithm: SpmAlgorithm,
    normalizer: NormalizerSpec,
    /// Matchable pieces (normal and user defined) to their table index.
    trie: PrefixTrie<u32>,
    scores: Vec<f32>,
    /// Table index to vocabulary id.
    to_vocab: Vec<u32>,
    unk_id: u32,
    unk_score: f32,
    /// Vocabulary ids of the `<0x00>`..`<0xFF>` pieces.
    byte_ids: Option<Box<[u32; 256]>>,
}

impl SentencePiece {
    pub fn new(model: &SentencePieceModel, vocab: &Vocabulary) -> Result<Self> {
        let unk_piece = model
            .unk_id
            .map(|i| model.pieces[i as usize].piece.as_str())
            .unwrap_or("<unk>");
        let unk_id = vocab.id(unk_piece).ok_or_else(|| {
            TokenizerError::Inconsistent(format!(
                "unknown piece {unk_piece:?} is not in the vocabulary"
            ))
        })?;

        let mut trie = PrefixTrie::new();
        let mut scores = Vec::with_capacity(model.pieces.len());
        let mut to_vocab = Vec::with_capacity(model.pieces.len());
        let mut min_score = f32::MAX;
        for (index, piece) in model.pieces.iter().enumerate() {
            let score = match piece.kind {
                PieceType::Normal => {
                    min_score = min_score.min(piece.score);
                    piece.score
                }
                // user defined pieces always win against their parts
                PieceType::UserDefined => 0.0,
                _ => piece.score,
            };
            if matches!(piece.kind, PieceType::Normal | PieceType::UserDefined) {
                trie.entry(&piece.piece).get_or_insert(index as u32);
            }
            scores.push(score);
            to_vocab.push(vocab.id(&piece.piece).unwrap_or(unk_id));
        }
        if min_score == f32::MAX {
            min_score = 0.0;
        }

        let byte_ids = if model.byte_fallback {
            let mut ids = Box::new([unk_id; 256]);
            for (b, slot) in ids.iter_mut().enumerate() {
                let piece = format!("<0x{b:02X}>");
                *slot = vocab.id(&piece).ok_or_else(|| {
                    TokenizerError::Inconsistent(format!(
                        "byte fallback piece {piece} is not in the vocabulary"
                    ))
                })?;
            }
            Some(ids)
        } else {
            None
        };

        debug!(
            pieces = model.pieces.len(),
            algorithm = ?model.algorithm,
            byte_fallback = model.byte_fallback,
            min_score,
            "SentencePiece model initialized"
        );

        Ok(Self {
            algorithm: model.algorithm,
            normalizer: model.normalizer.clone(),
            trie,
            scores,
            to_vocab,
            unk_id,
            unk_score: min_score - UNK_PENALTY,
            byte_ids,
        })
    }

    pub fn algorithm(&self) -> SpmAlgorithm {
        self.algorithm
    }

    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    /// Apply the model's normalization rule, whitespace handling, dummy
    /// prefix and space escaping.
    pub fn normalize(&self, text: &mut NormalizedText) {
        let rule = self.normalizer.name.as_str();
        if rule != "identity" {
            if rule.starts_with("nmt_") {
                text.clean_controls();
            }
            text.normalize(NormalizationForm::Nfkc);
            if rule.ends_with("_cf") {
                text.lowercase();
            }
        }
        if self.normalizer.remove_extra_whitespaces {
            text.collapse_whitespace();
        }
        if text.is_empty() {
            return;
        }
        if self.normalizer.add_dummy_prefix {
            text.prepend(' ');
        }
        if self.normalizer.escape_whitespaces {
            text.replace_char(' ', SPACE_MARKER);
        }
    }

    /// Encode the normalized text. Piece offsets are bytes of `text`.
    pub fn encode_segment(&self, text: &str) -> Vec<Piece> {
        if text.is_empty() {
            return Vec::new();
        }
        let spans = match self.algorithm {
            SpmAlgorithm::Unigram => self.viterbi(text),
            SpmAlgorithm::Bpe => self.bpe(text),
        };
        self.finish(text, spans)
    }

    /// Best segmentation as (byte start, byte end, table index or unknown).
    fn viterbi(&self, text: &str) -> Vec<(usize, usize, Option<u32>)> {
        let chars: Vec<char> = text.chars().collect();
        let offsets = char_byte_offsets(text);
        let n = chars.len();

        // best[i] = (score, start of last piece, piece) for the prefix of length i
        let mut best: Vec<Option<(f32, usize, Option<u32>)>> = vec![None; n + 1];
        best[0] = Some((0.0, 0, None));
        for start in 0..n {
            let Some((base, _, _)) = best[start] else {
                continue;
            };
            let mut relax = |end: usize, score: f32, piece: Option<u32>| {
                let candidate = base + score;
                if best[end].is_none_or(|(current, _, _)| candidate > current) {
                    best[end] = Some((candidate, start, piece));
                }
            };
            let mut has_single = false;
            for (len, &index) in self.trie.common_prefixes(&chars[start..]) {
                has_single |= len == 1;
                relax(start + len, self.scores[index as usize], Some(index));
            }
            if !has_single {
                relax(start + 1, self.unk_score, None);
            }
        }

        let mut spans = Vec::new();
        let mut end = n;
        while end > 0 {
            let Some((_, start, piece)) = best[end] else {
                break;
            };
            spans.push((offsets[start], offsets[end], piece));
            end = start;
        }
        spans.reverse();
        spans
    }

    fn bpe(&self, text: &str) -> Vec<(usize, usize, Option<u32>)> {
        let symbols = text
            .char_indices()
            .map(|(i, ch)| {
                let piece = ch.to_string();
                let id = self.trie.get(&piece).copied();
                Symbol {
                    text: piece,
                    id,
                    start: i,
                    end: i + ch.len_utf8(),
                }
            })
            .collect();

        let merged = merge_symbols(symbols, |a, b| {
            let mut joined = String::with_capacity(a.text.len() + b.text.len());
            joined.push_str(&a.text);
            joined.push_str(&b.text);
            let index = *self.trie.get(&joined)?;
            Some((Reverse(Score(self.scores[index as usize])), index))
        });
        merged
            .into_iter()
            .map(|s| (s.start, s.end, s.id))
            .collect()
    }

    /// Translate table indices to vocabulary ids, fusing runs of unknown
    /// characters or spelling them out as bytes.
    fn finish(&self, text: &str, spans: Vec<(usize, usize, Option<u32>)>) -> Vec<Piece> {
        let mut pieces: Vec<Piece> = Vec::with_capacity(spans.len());
        let mut previous_unknown = false;
        for (start, end, index) in spans {
            match (index, &self.byte_ids) {
                (Some(index), _) => {
                    pieces.push(Piece::new(self.to_vocab[index as usize], start, end));
                    previous_unknown = false;
                }
                (None, Some(byte_ids)) => {
                    for (i, &b) in text.as_bytes()[start..end].iter().enumerate() {
                        pieces.push(Piece::new(byte_ids[b as usize], start + i, start + i + 1));
                    }
                    previous_unknown = false;
                }
                (None, None) => {
                    match pieces.last_mut() {
                        Some(last) if previous_unknown => last.end = end,
                        _ => pieces.push(Piece::new(self.unk_id, start, end)),
                    }
                    previous_unknown = true;
                }
            }
        }
        pieces
    }

    /// Append the text of `piece`: byte pieces become raw bytes, the marker
    /// becomes a space, and the dummy prefix space is dropped at the start.
    pub fn render_piece(&self, piece: &str, first: bool, out: &mut Vec<u8>) {
        if self.byte_ids.is_some() {
            if let Some(b) = parse_byte_piece(piece) {
                out.push(b);
                return;
            }
        }
        let text = piece.replace(SPACE_MARKER, " ");
        let text = match text.strip_prefix(' ') {
            Some(rest) if first && self.normalizer.add_dummy_prefix => rest,
            _ => text.as_str(),
        };
        out.extend_from_slice(text.as_bytes());
    }
}

/// `<0xNN>` to the byte `NN`.
fn parse_byte_piece(piece: &str) -> Option<u8> {
    let hex = piece.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spm_model::tests::model_bytes;

    fn unigram_model() -> SentencePieceModel {
        SentencePieceModel::parse(&model_bytes(
            &[
                ("<unk>", 0.0, 2),
                ("<s>", 0.0, 3),
                ("</s>", 0.0, 3),
                ("▁", -2.0, 1),
                ("▁hello", -3.0, 1),
                ("▁he", -2.0, 1),
                ("llo", -2.0, 1),
                ("▁world", -3.5, 1),
                ("h", -4.0, 1),
                ("e", -4.0, 1),
                ("l", -4.0, 1),
                ("o", -4.0, 1),
            ],
            1,
            "nmt_nfkc",
        ))
        .unwrap()
    }

    fn vocab_of(model: &SentencePieceModel) -> Vocabulary {
        Vocabulary::from_pieces(model.pieces.iter().map(|p| p.piece.clone()).collect()).unwrap()
    }

    fn normalized(spm: &SentencePiece, text: &str) -> NormalizedText {
        let mut norm = NormalizedText::new(text, 0);
        spm.normalize(&mut norm);
        norm
    }

    #[test]
    fn test_normalize_inserts_markers() {
        let model = unigram_model();
        let spm = SentencePiece::new(&model, &vocab_of(&model)).unwrap();
        let norm = normalized(&spm, "  Ｈello   world ");
        assert_eq!(norm.as_string(), "▁Hello▁world");
        // the dummy marker has an empty span at the first kept character
        assert_eq!(norm.span(0..1), (2, 2));
        assert!(normalized(&spm, "   ").is_empty());
    }

    #[test]
    fn test_viterbi_prefers_higher_total_score() {
        let model = unigram_model();
        let vocab = vocab_of(&model);
        let spm = SentencePiece::new(&model, &vocab).unwrap();
        let text = normalized(&spm, "hello world").as_string();
        let pieces = spm.encode_segment(&text);
        let ids: Vec<u32> = pieces.iter().map(|p| p.id).collect();
        // ▁hello (-3.0) beats ▁he + llo (-4.0)
        assert_eq!(ids, vec![4, 7]);
        assert_eq!((pieces[1].start, pieces[1].end), (8, 16));
    }

    #[test]
    fn test_unknown_run_is_fused() {
        let model = unigram_model();
        let vocab = vocab_of(&model);
        let spm = SentencePiece::new(&model, &vocab).unwrap();
        let text = normalized(&spm, "hello 日本").as_string();
        let pieces = spm.encode_segment(&text);
        let ids: Vec<u32> = pieces.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 3, 0]);
        assert_eq!(&text[pieces[2].start..pieces[2].end], "日本");
    }

    #[test]
    fn test_bpe_merges_by_score() {
        let model = SentencePieceModel::parse(&model_bytes(
            &[
                ("<unk>", 0.0, 2),
                ("<s>", 0.0, 3),
                ("</s>", 0.0, 3),
                ("▁t", -1.0, 1),
                ("he", -2.0, 1),
                ("▁the", -3.0, 1),
                ("▁", -4.0, 1),
                ("t", -5.0, 1),
                ("h", -6.0, 1),
                ("e", -7.0, 1),
            ],
            2,
            "identity",
        ))
        .unwrap();
        let vocab = vocab_of(&model);
        let spm = SentencePiece::new(&model, &vocab).unwrap();
        assert_eq!(spm.algorithm(), SpmAlgorithm::Bpe);
        let text = normalized(&spm, "the").as_string();
        let ids: Vec<u32> = spm.encode_segment(&text).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn test_render_strips_dummy_prefix_once() {
        let model = unigram_model();
        let spm = SentencePiece::new(&model, &vocab_of(&model)).unwrap();
        let mut out = Vec::new();
        spm.render_piece("▁hello", true, &mut out);
        spm.render_piece("▁world", false, &mut out);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_byte_piece_parsing() {
        assert_eq!(parse_byte_piece("<0x0A>"), Some(b'\n'));
        assert_eq!(parse_byte_piece("<0xE3>"), Some(0xE3));
        assert_eq!(parse_byte_piece("<0x1>"), None);
        assert_eq!(parse_byte_piece("<s>"), None);
    }
}
