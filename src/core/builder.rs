//! Assembles a [`Tokenizer`] from the files loaded for a kind.
//!
//! The builder keeps every loaded source behind an `Arc`, so cloning it to
//! try a new file or a new special token and rebuilding is cheap. A build that
//! fails leaves the builder it was cloned from untouched.

use std::sync::Arc;

use tracing::debug;

use super::bpe::{ByteLevelBpe, ByteLevelBpeOptions, DEFAULT_CACHE_SIZE};
use super::config::{NamedToken, Settings, TokenizerConfig};
use super::dictionary::Dictionary;
use super::error::{Result, TokenizerError};
use super::kind::{Family, FileKind, Template, TokenizerFlags, TokenizerKind};
use super::model::Model;
use super::pretokenizer::{BasicTokenizer, RegexSplitter, CLIP_PATTERN, GPT2_PATTERN};
use super::special::{SpecialToken, SpecialTokens};
use super::spm_model::{PieceType, SentencePieceModel};
use super::tokenizer::Tokenizer;
use super::unigram::SentencePiece;
use super::vocab::{AddedTokens, Vocabulary};
use super::wordpiece::WordPiece;

/// Number of `<extra_id_N>` sentinels T5 appends after the model pieces.
pub const T5_EXTRA_IDS: usize = 100;

/// fairseq reserves these ids ahead of the SentencePiece pieces.
const FAIRSEQ_PREFIX: [&str; 4] = ["<s>", "<pad>", "</s>", "<unk>"];

#[derive(Debug, Clone)]
pub struct TokenizerBuilder {
    kind: TokenizerKind,
    flags: TokenizerFlags,
    model: Option<Arc<SentencePieceModel>>,
    dictionary: Option<Arc<Dictionary>>,
    vocab: Option<Arc<Vocabulary>>,
    merges: Option<Arc<Vec<(String, String)>>>,
    added_tokens: Option<AddedTokens>,
    config: Option<TokenizerConfig>,
    extra_special_tokens: Vec<String>,
    cache_size: usize,
}

impl TokenizerBuilder {
    pub fn new(kind: TokenizerKind, flags: TokenizerFlags) -> Self {
        Self {
            kind,
            flags,
            model: None,
            dictionary: None,
            vocab: None,
            merges: None,
            added_tokens: None,
            config: None,
            extra_special_tokens: Vec::new(),
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }

    pub fn kind(&self) -> TokenizerKind {
        self.kind
    }

    pub fn flags(&self) -> TokenizerFlags {
        self.flags
    }

    pub fn model(mut self, model: SentencePieceModel) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(Arc::new(dictionary));
        self
    }

    pub fn vocab(mut self, vocab: Vocabulary) -> Self {
        self.vocab = Some(Arc::new(vocab));
        self
    }

    pub fn merges(mut self, merges: Vec<(String, String)>) -> Self {
        self.merges = Some(Arc::new(merges));
        self
    }

    pub fn added_tokens(mut self, tokens: AddedTokens) -> Self {
        self.added_tokens = Some(tokens);
        self
    }

    pub fn config(mut self, config: TokenizerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register extra special tokens; pieces not in the vocabulary get
    /// fresh ids.
    pub fn special_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_special_tokens
            .extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Capacity of the segment cache used by byte-level kinds.
    pub fn cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Required files that have not been supplied yet.
    pub fn missing(&self) -> Vec<FileKind> {
        self.kind
            .required_files()
            .iter()
            .copied()
            .filter(|file| match file {
                FileKind::Model => self.model.is_none(),
                FileKind::Dictionary => self.dictionary.is_none(),
                FileKind::Vocab => self.vocab.is_none(),
                FileKind::Merges => self.merges.is_none(),
                FileKind::AddedTokens | FileKind::Config => false,
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn build(&self) -> Result<Tokenizer> {
        let missing = self.missing();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
            return Err(TokenizerError::InvalidState(format!(
                "{} tokenizer needs its {} file(s) loaded first",
                self.kind,
                names.join(", ")
            )));
        }

        let settings = Settings::resolve(self.kind, self.config.as_ref());
        let (mut vocab, mut specials) = match self.kind.family() {
            Family::SentencePiece => self.spm_vocab()?,
            _ => (self.loaded_vocab()?.as_ref().clone(), Vec::new()),
        };

        if let Some(added) = &self.added_tokens {
            for id in added.apply(&mut vocab)? {
                if let Some(piece) = vocab.piece(id) {
                    specials.push(SpecialToken::new(piece, id));
                }
            }
        }
        for content in &self.extra_special_tokens {
            let id = vocab.get_or_push(content);
            specials.push(SpecialToken::new(content.as_str(), id));
        }
        // named tokens first so that their strip flags win over duplicates
        let mut registry: Vec<SpecialToken> = settings
            .special_tokens()
            .into_iter()
            .filter_map(|token| named_special(token, &vocab))
            .collect();
        registry.append(&mut specials);
        let special_tokens = SpecialTokens::new(registry)?;

        let model = self.build_model(&settings, &vocab)?;
        let (prefix, suffix) = template_ids(self.kind.template(), &settings, &vocab);

        debug!(
            kind = %self.kind,
            vocab_size = vocab.len(),
            special_tokens = special_tokens.len(),
            prefix = ?prefix,
            suffix = ?suffix,
            "tokenizer built"
        );

        Ok(Tokenizer::from_parts(
            self.clone(),
            vocab,
            model,
            special_tokens,
            prefix,
            suffix,
            settings.clean_up_spaces,
        ))
    }

    fn loaded_vocab(&self) -> Result<&Arc<Vocabulary>> {
        self.vocab.as_ref().ok_or_else(|| {
            TokenizerError::InvalidState(format!("{} tokenizer has no vocabulary", self.kind))
        })
    }

    fn loaded_model(&self) -> Result<&Arc<SentencePieceModel>> {
        self.model.as_ref().ok_or_else(|| {
            TokenizerError::InvalidState(format!("{} tokenizer has no model", self.kind))
        })
    }

    /// Vocabulary of a SentencePiece kind in its id layout, plus the
    /// sentinel tokens that layout adds.
    fn spm_vocab(&self) -> Result<(Vocabulary, Vec<SpecialToken>)> {
        let model = self.loaded_model()?;
        let model_pieces = || model.pieces.iter().map(|p| p.piece.clone());
        let mut specials = Vec::new();
        let vocab = match self.kind {
            TokenizerKind::XlmRoberta => {
                // fairseq ids: four reserved tokens, the model pieces after its
                // own three control pieces shifted by one, then <mask>
                let mut pieces: Vec<String> = FAIRSEQ_PREFIX.iter().map(|s| s.to_string()).collect();
                pieces.extend(model_pieces().skip(3));
                let mut vocab = Vocabulary::from_pieces(pieces)?;
                vocab.get_or_push("<mask>");
                vocab
            }
            TokenizerKind::T5 => {
                let mut vocab = Vocabulary::from_pieces(model_pieces().collect())?;
                for i in (0..T5_EXTRA_IDS).rev() {
                    let piece = format!("<extra_id_{i}>");
                    let id = vocab.get_or_push(&piece);
                    specials.push(SpecialToken::new(piece, id));
                }
                vocab
            }
            _ => match &self.vocab {
                Some(vocab) => vocab.as_ref().clone(),
                None => Vocabulary::from_pieces(model_pieces().collect())?,
            },
        };
        // control pieces such as <s> and </s> behave as special tokens
        for piece in model.pieces.iter().filter(|p| p.kind == PieceType::Control) {
            if let Some(id) = vocab.id(&piece.piece) {
                specials.push(SpecialToken::new(piece.piece.as_str(), id));
            }
        }
        Ok((vocab, specials))
    }

    fn build_model(&self, settings: &Settings, vocab: &Vocabulary) -> Result<Model> {
        match self.kind.family() {
            Family::ByteLevelBpe => {
                let clip = self.kind == TokenizerKind::Clip;
                let merges = self.merges.as_deref().map(Vec::as_slice).unwrap_or(&[]);
                let options = ByteLevelBpeOptions {
                    end_of_word_suffix: clip.then(|| "</w>".to_string()),
                    unk_id: vocab.id(&settings.unk.content),
                    utf8_safe: self.flags.utf8_safe(),
                    cache_size: self.cache_size,
                };
                let pattern = if clip { CLIP_PATTERN } else { GPT2_PATTERN };
                Ok(Model::ByteLevel {
                    bpe: ByteLevelBpe::new(vocab, merges, options)?,
                    splitter: RegexSplitter::new(pattern)?,
                    add_prefix_space: settings.add_prefix_space,
                    clip,
                })
            }
            Family::WordPiece => Ok(Model::WordPiece {
                basic: BasicTokenizer {
                    lowercase: settings.lowercase,
                    strip_accents: settings.strip_accents,
                    tokenize_chinese_chars: settings.tokenize_chinese_chars,
                },
                wordpiece: WordPiece::new(vocab, &settings.unk.content, false)?,
            }),
            Family::Morphological => {
                let dictionary = self.dictionary.clone().ok_or_else(|| {
                    TokenizerError::InvalidState(format!("{} tokenizer has no dictionary", self.kind))
                })?;
                Ok(Model::Morphological {
                    dictionary,
                    wordpiece: WordPiece::new(
                        vocab,
                        &settings.unk.content,
                        self.kind == TokenizerKind::BertJapaneseCharacter,
                    )?,
                    lowercase: settings.lowercase,
                })
            }
            Family::SentencePiece => Ok(Model::SentencePiece(SentencePiece::new(
                self.loaded_model()?,
                vocab,
            )?)),
        }
    }
}

fn named_special(token: &NamedToken, vocab: &Vocabulary) -> Option<SpecialToken> {
    let id = vocab.id(&token.content)?;
    Some(SpecialToken {
        content: token.content.clone(),
        id,
        lstrip: token.lstrip,
        rstrip: token.rstrip,
    })
}

/// Template ids, applied only when every template token is in the vocabulary.
fn template_ids(template: Template, settings: &Settings, vocab: &Vocabulary) -> (Vec<u32>, Vec<u32>) {
    let lookup = |token: Option<&NamedToken>| token.and_then(|t| vocab.id(&t.content));
    match template {
        Template::None => (Vec::new(), Vec::new()),
        Template::Wrap => {
            let start = lookup(settings.cls.as_ref().or(settings.bos.as_ref()));
            let end = lookup(settings.sep.as_ref().or(settings.eos.as_ref()));
            match (start, end) {
                (Some(start), Some(end)) => (vec![start], vec![end]),
                _ => (Vec::new(), Vec::new()),
            }
        }
        Template::Eos => match lookup(settings.eos.as_ref()) {
            Some(eos) => (Vec::new(), vec![eos]),
            None => (Vec::new(), Vec::new()),
        },
    }
}
