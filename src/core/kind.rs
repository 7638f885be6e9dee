//! Tokenizer kinds, construction flags and the per-kind file requirements.

use std::fmt;
use std::str::FromStr;

use super::error::{Result, TokenizerError};

/// The supported tokenizer configurations.
///
/// The integer codes are stable and match the constants exposed to bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerKind {
    Whisper,
    Clip,
    XlmRoberta,
    Marian,
    BertJapaneseWordPiece,
    BertJapaneseCharacter,
    T5,
    Roberta,
    BertUncased,
    BertCased,
}

/// Subword algorithm family of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    ByteLevelBpe,
    SentencePiece,
    WordPiece,
    Morphological,
}

/// Files a session can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Model,
    Dictionary,
    Vocab,
    Merges,
    AddedTokens,
    Config,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Model => "model",
            FileKind::Dictionary => "dictionary",
            FileKind::Vocab => "vocab",
            FileKind::Merges => "merges",
            FileKind::AddedTokens => "added tokens",
            FileKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// Special tokens wrapped around every encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    None,
    /// Classifier/start token before, separator/end token after.
    Wrap,
    /// End-of-sequence token after.
    Eos,
}

impl TokenizerKind {
    pub const ALL: [TokenizerKind; 10] = [
        TokenizerKind::Whisper,
        TokenizerKind::Clip,
        TokenizerKind::XlmRoberta,
        TokenizerKind::Marian,
        TokenizerKind::BertJapaneseWordPiece,
        TokenizerKind::BertJapaneseCharacter,
        TokenizerKind::T5,
        TokenizerKind::Roberta,
        TokenizerKind::BertUncased,
        TokenizerKind::BertCased,
    ];

    pub fn code(self) -> i32 {
        match self {
            TokenizerKind::Whisper => 0,
            TokenizerKind::Clip => 1,
            TokenizerKind::XlmRoberta => 2,
            TokenizerKind::Marian => 3,
            TokenizerKind::BertJapaneseWordPiece => 4,
            TokenizerKind::BertJapaneseCharacter => 5,
            TokenizerKind::T5 => 6,
            TokenizerKind::Roberta => 7,
            TokenizerKind::BertUncased => 8,
            TokenizerKind::BertCased => 9,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| TokenizerError::InvalidArgument(format!("unknown tokenizer type {code}")))
    }

    pub fn name(self) -> &'static str {
        match self {
            TokenizerKind::Whisper => "whisper",
            TokenizerKind::Clip => "clip",
            TokenizerKind::XlmRoberta => "xlm_roberta",
            TokenizerKind::Marian => "marian",
            TokenizerKind::BertJapaneseWordPiece => "bert_japanese_wordpiece",
            TokenizerKind::BertJapaneseCharacter => "bert_japanese_character",
            TokenizerKind::T5 => "t5",
            TokenizerKind::Roberta => "roberta",
            TokenizerKind::BertUncased => "bert_uncased",
            TokenizerKind::BertCased => "bert_cased",
        }
    }

    pub fn family(self) -> Family {
        match self {
            TokenizerKind::Whisper | TokenizerKind::Clip | TokenizerKind::Roberta => {
                Family::ByteLevelBpe
            }
            TokenizerKind::XlmRoberta | TokenizerKind::Marian | TokenizerKind::T5 => {
                Family::SentencePiece
            }
            TokenizerKind::BertUncased | TokenizerKind::BertCased => Family::WordPiece,
            TokenizerKind::BertJapaneseWordPiece | TokenizerKind::BertJapaneseCharacter => {
                Family::Morphological
            }
        }
    }

    /// Files that must be loaded before the kind can encode or decode.
    pub fn required_files(self) -> &'static [FileKind] {
        match self.family() {
            Family::ByteLevelBpe => &[FileKind::Vocab, FileKind::Merges],
            Family::SentencePiece => &[FileKind::Model],
            Family::WordPiece => &[FileKind::Vocab],
            Family::Morphological => &[FileKind::Dictionary, FileKind::Vocab],
        }
    }

    /// Whether a file of this kind means anything for this tokenizer.
    pub fn accepts(self, file: FileKind) -> bool {
        match file {
            FileKind::AddedTokens | FileKind::Config => true,
            // Marian may replace the model's id order with vocab.json
            FileKind::Vocab if self == TokenizerKind::Marian => true,
            _ => self.required_files().contains(&file),
        }
    }

    /// Vocab files are JSON maps for the byte-level kinds and Marian, and one
    /// piece per line for the BERT kinds.
    pub fn vocab_is_json(self) -> bool {
        matches!(
            self.family(),
            Family::ByteLevelBpe | Family::SentencePiece
        )
    }

    /// Word ids and character spans are reported for these kinds.
    pub fn supports_offsets(self) -> bool {
        matches!(
            self,
            TokenizerKind::BertCased
                | TokenizerKind::BertUncased
                | TokenizerKind::BertJapaneseWordPiece
                | TokenizerKind::BertJapaneseCharacter
                | TokenizerKind::Roberta
        )
    }

    /// Kinds that accept extra special tokens after loading.
    pub fn supports_added_special_tokens(self) -> bool {
        self.family() == Family::ByteLevelBpe
    }

    pub fn template(self) -> Template {
        match self {
            TokenizerKind::Whisper => Template::None,
            TokenizerKind::Marian | TokenizerKind::T5 => Template::Eos,
            _ => Template::Wrap,
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TokenizerKind {
    type Err = TokenizerError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| TokenizerError::InvalidArgument(format!("unknown tokenizer type {s:?}")))
    }
}

/// Construction flags, combined with `|`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TokenizerFlags(u32);

impl TokenizerFlags {
    pub const NONE: TokenizerFlags = TokenizerFlags(0);
    /// Only emit valid UTF-8 text, grouping tokens that split a character.
    pub const UTF8_SAFE: TokenizerFlags = TokenizerFlags(1);

    const KNOWN: u32 = Self::UTF8_SAFE.0;

    /// Reject unknown bits.
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::KNOWN != 0 {
            return Err(TokenizerError::InvalidArgument(format!(
                "unknown tokenizer flags {bits:#x}"
            )));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: TokenizerFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn utf8_safe(self) -> bool {
        self.contains(Self::UTF8_SAFE)
    }
}

impl std::ops::BitOr for TokenizerFlags {
    type Output = TokenizerFlags;

    fn bitor(self, rhs: Self) -> Self {
        TokenizerFlags(self.0 | rhs.0)
    }
}
