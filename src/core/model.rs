//! The closed set of tokenization pipelines behind one dispatch.
//!
//! A [`Model`] owns everything one family needs between the special-token
//! splitter and the vocabulary: its normalization, its segmentation of the
//! normalized text, the subword algorithm run on each segment, and the rules
//! for turning pieces back into text.

use std::ops::Range;
use std::sync::Arc;

use super::bpe::ByteLevelBpe;
use super::dictionary::Dictionary;
use super::error::Result;
use super::lattice;
use super::normalizer::{NormalizationForm, NormalizedText};
use super::pretokenizer::{BasicTokenizer, RegexSplitter};
use super::unigram::SentencePiece;
use super::vocab::Vocabulary;
use super::wordpiece::WordPiece;

/// One subword token of a segment. `start..end` are byte offsets into the
/// segment text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub id: u32,
    pub start: usize,
    pub end: usize,
}

impl Piece {
    #[inline]
    pub fn new(id: u32, start: usize, end: usize) -> Self {
        Self { id, start, end }
    }
}

#[derive(Debug)]
pub enum Model {
    /// GPT-2 style byte-level BPE (Whisper, RoBERTa) or CLIP's variant with
    /// lower-casing and `</w>` word ends.
    ByteLevel {
        bpe: ByteLevelBpe,
        splitter: RegexSplitter,
        add_prefix_space: bool,
        clip: bool,
    },
    /// BERT: basic tokenizer then WordPiece.
    WordPiece {
        basic: BasicTokenizer,
        wordpiece: WordPiece,
    },
    /// SentencePiece unigram or BPE over the whole text.
    SentencePiece(SentencePiece),
    /// Japanese BERT: MeCab lattice words, then WordPiece or single characters.
    Morphological {
        dictionary: Arc<Dictionary>,
        wordpiece: WordPiece,
        lowercase: bool,
    },
}

impl Model {
    /// Normalize one fragment of input in place. `at_start` is set for a
    /// fragment that begins the input.
    ///
    /// With `add_prefix_space` the space goes in front of the input only,
    /// never after a special token, and even when the input already starts
    /// with whitespace. Decoding removes exactly that one space again.
    pub fn normalize(&self, text: &mut NormalizedText, at_start: bool) {
        match self {
            Model::ByteLevel {
                add_prefix_space,
                clip,
                ..
            } => {
                if *clip {
                    text.normalize(NormalizationForm::Nfc);
                    text.collapse_whitespace();
                    text.lowercase();
                } else if *add_prefix_space && at_start && !text.is_empty() {
                    text.prepend(' ');
                }
            }
            Model::WordPiece { basic, .. } => basic.normalize(text),
            Model::SentencePiece(spm) => spm.normalize(text),
            Model::Morphological { lowercase, .. } => {
                text.clean_controls();
                text.normalize(NormalizationForm::Nfkc);
                text.collapse_whitespace();
                if *lowercase {
                    text.lowercase();
                }
            }
        }
    }

    /// Split normalized text into segments, as char ranges. Each segment is
    /// encoded on its own and counts as one word.
    pub fn segment(&self, text: &NormalizedText) -> Result<Vec<Range<usize>>> {
        match self {
            Model::ByteLevel { splitter, .. } => splitter.split(text),
            Model::WordPiece { basic, .. } => Ok(basic.split(text)),
            Model::SentencePiece(_) => Ok(if text.is_empty() {
                Vec::new()
            } else {
                vec![0..text.len()]
            }),
            Model::Morphological { dictionary, .. } => {
                let chars = text.chars();
                let mut words = Vec::new();
                for run in text.split_whitespace() {
                    let offset = run.start;
                    words.extend(
                        lattice::segment(dictionary, &chars[run])
                            .into_iter()
                            .map(|w| w.start + offset..w.end + offset),
                    );
                }
                Ok(words)
            }
        }
    }

    pub fn encode_segment(&self, segment: &str, vocab: &Vocabulary) -> Vec<Piece> {
        match self {
            Model::ByteLevel { bpe, .. } => bpe.encode_segment(segment, vocab),
            Model::WordPiece { wordpiece, .. } | Model::Morphological { wordpiece, .. } => {
                wordpiece.encode_segment(segment, vocab)
            }
            Model::SentencePiece(spm) => spm.encode_segment(segment),
        }
    }

    /// Append the text of a vocabulary piece. `first` is set while nothing
    /// has been written yet.
    pub fn render_piece(&self, piece: &str, first: bool, out: &mut Vec<u8>) {
        match self {
            Model::ByteLevel { bpe, .. } => bpe.render_piece(piece, out),
            Model::WordPiece { wordpiece, .. } | Model::Morphological { wordpiece, .. } => {
                wordpiece.render_piece(piece, first, out)
            }
            Model::SentencePiece(spm) => spm.render_piece(piece, first, out),
        }
    }

    /// Append the literal of a special token.
    pub fn render_special(&self, content: &str, first: bool, out: &mut Vec<u8>) {
        match self {
            // specials are words of their own in WordPiece output
            Model::WordPiece { wordpiece, .. } | Model::Morphological { wordpiece, .. } => {
                wordpiece.render_piece(content, first, out)
            }
            _ => out.extend_from_slice(content.as_bytes()),
        }
    }

    /// Final byte-level touches after all pieces are rendered.
    pub fn finish(&self, out: &mut Vec<u8>) {
        if let Model::ByteLevel { clip: true, .. } = self {
            if out.last() == Some(&b' ') {
                out.pop();
            }
        }
    }

    /// Drop the space `normalize` put in front of the input. `at` is where
    /// the rendering of the piece that carries it begins.
    pub fn strip_prefix_space(&self, out: &mut Vec<u8>, at: usize) {
        if let Model::ByteLevel {
            add_prefix_space: true,
            clip: false,
            ..
        } = self
        {
            if out.get(at) == Some(&b' ') {
                out.remove(at);
            }
        }
    }

    /// Offsets of byte-level tokens leave out the space they carry.
    pub fn trims_offsets(&self) -> bool {
        matches!(self, Model::ByteLevel { clip: false, .. })
    }

    pub fn clear_cache(&self) {
        if let Model::ByteLevel { bpe, .. } = self {
            bpe.clear_cache();
        }
    }

    pub fn cache_len(&self) -> usize {
        match self {
            Model::ByteLevel { bpe, .. } => bpe.cache_len(),
            _ => 0,
        }
    }
}
