//! WordPiece subword model for BERT-family vocabularies.
//!
//! Each pre-tokenized word is split greedily: take the longest vocabulary
//! prefix, then continue on the remainder with the `##` continuation prefix.
//! If any remainder has no match the whole word becomes `[UNK]`, as in the
//! reference BERT tokenizer.

use tracing::debug;

use super::error::{Result, TokenizerError};
use super::model::Piece;
use super::pretokenizer::char_byte_offsets;
use super::vocab::Vocabulary;

/// The continuation prefix for WordPiece subwords.
pub const CONTINUATION_PREFIX: &str = "##";

/// Words longer than this many characters map straight to `[UNK]`.
pub const MAX_INPUT_CHARS_PER_WORD: usize = 100;

#[derive(Debug, Clone)]
pub struct WordPiece {
    unk_id: u32,
    /// One piece per character instead of greedy prefixes.
    character_level: bool,
}

impl WordPiece {
    pub fn new(vocab: &Vocabulary, unk_token: &str, character_level: bool) -> Result<Self> {
        let unk_id = vocab.id(unk_token).ok_or_else(|| {
            TokenizerError::Inconsistent(format!(
                "unknown token {unk_token:?} is not in the vocabulary"
            ))
        })?;
        debug!(
            vocab_size = vocab.len(),
            unk_id, character_level, "WordPiece model initialized"
        );
        Ok(Self {
            unk_id,
            character_level,
        })
    }

    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    /// Encode one word. Piece offsets are bytes of `word`.
    pub fn encode_segment(&self, word: &str, vocab: &Vocabulary) -> Vec<Piece> {
        if word.is_empty() {
            return Vec::new();
        }
        if self.character_level {
            return word
                .char_indices()
                .map(|(i, ch)| {
                    let end = i + ch.len_utf8();
                    let id = vocab.id(&word[i..end]).unwrap_or(self.unk_id);
                    Piece::new(id, i, end)
                })
                .collect();
        }

        if let Some(id) = vocab.id(word) {
            return vec![Piece::new(id, 0, word.len())];
        }

        let offsets = char_byte_offsets(word);
        let n = offsets.len() - 1;
        if n > MAX_INPUT_CHARS_PER_WORD {
            return vec![Piece::new(self.unk_id, 0, word.len())];
        }

        let mut pieces = Vec::new();
        let mut candidate = String::with_capacity(word.len() + CONTINUATION_PREFIX.len());
        let mut start = 0;
        while start < n {
            let mut found = None;
            for end in (start + 1..=n).rev() {
                candidate.clear();
                if start > 0 {
                    candidate.push_str(CONTINUATION_PREFIX);
                }
                candidate.push_str(&word[offsets[start]..offsets[end]]);
                if let Some(id) = vocab.id(&candidate) {
                    found = Some((id, end));
                    break;
                }
            }
            let Some((id, end)) = found else {
                return vec![Piece::new(self.unk_id, 0, word.len())];
            };
            pieces.push(Piece::new(id, offsets[start], offsets[end]));
            start = end;
        }
        pieces
    }

    /// Append `piece` to `out`: continuations attach to the previous word,
    /// everything else is separated by one space.
    pub fn render_piece(&self, piece: &str, first: bool, out: &mut Vec<u8>) {
        match piece.strip_prefix(CONTINUATION_PREFIX) {
            Some(stem) if !first => out.extend_from_slice(stem.as_bytes()),
            _ => {
                if !first {
                    out.push(b' ');
                }
                out.extend_from_slice(piece.as_bytes());
            }
        }
    }
}

/// Undo the spaces WordPiece decoding leaves before punctuation and
/// English contractions.
pub fn clean_up_tokenization(text: &str) -> String {
    text.replace(" .", ".")
        .replace(" ?", "?")
        .replace(" !", "!")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        let pieces = [
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "un", "##aff", "##able", "hello", "runn",
            "##ing", "日", "本",
        ];
        Vocabulary::from_pieces(pieces.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn ids(pieces: &[Piece]) -> Vec<u32> {
        pieces.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_greedy_longest_match() {
        let vocab = vocab();
        let model = WordPiece::new(&vocab, "[UNK]", false).unwrap();
        let pieces = model.encode_segment("unaffable", &vocab);
        assert_eq!(ids(&pieces), vec![4, 5, 6]);
        assert_eq!((pieces[1].start, pieces[1].end), (2, 5));
        assert_eq!(ids(&model.encode_segment("running", &vocab)), vec![8, 9]);
        assert_eq!(ids(&model.encode_segment("hello", &vocab)), vec![7]);
    }

    #[test]
    fn test_unmatched_word_is_single_unk() {
        let vocab = vocab();
        let model = WordPiece::new(&vocab, "[UNK]", false).unwrap();
        let pieces = model.encode_segment("unxyz", &vocab);
        assert_eq!(ids(&pieces), vec![1]);
        assert_eq!((pieces[0].start, pieces[0].end), (0, 5));
        let long = "a".repeat(MAX_INPUT_CHARS_PER_WORD + 1);
        assert_eq!(ids(&model.encode_segment(&long, &vocab)), vec![1]);
    }

    #[test]
    fn test_character_level() {
        let vocab = vocab();
        let model = WordPiece::new(&vocab, "[UNK]", true).unwrap();
        let pieces = model.encode_segment("日本語", &vocab);
        assert_eq!(ids(&pieces), vec![10, 11, 1]);
        assert_eq!((pieces[2].start, pieces[2].end), (6, 9));
    }

    #[test]
    fn test_missing_unk_is_rejected() {
        let vocab = Vocabulary::from_pieces(vec!["a".into()]).unwrap();
        assert!(WordPiece::new(&vocab, "[UNK]", false).is_err());
    }

    #[test]
    fn test_render_and_cleanup() {
        let vocab = vocab();
        let model = WordPiece::new(&vocab, "[UNK]", false).unwrap();
        let mut out = Vec::new();
        for (i, piece) in ["un", "##aff", "##able", "hello", "!"].iter().enumerate() {
            model.render_piece(piece, i == 0, &mut out);
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "unaffable hello !");
        assert_eq!(clean_up_tokenization(&text), "unaffable hello!");
        assert_eq!(clean_up_tokenization("it ' s do n't"), "it's don't");
    }
}
