//! `tokenizer_config.json` overrides and the per-kind defaults they refine.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::error::{Result, TokenizerError};
use super::kind::{Family, TokenizerKind};
use super::vocab::read_text;

/// A special token entry: either a bare string or an object with `content`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TokenContent {
    Plain(String),
    Object {
        content: String,
        #[serde(default)]
        lstrip: bool,
        #[serde(default)]
        rstrip: bool,
    },
}

impl TokenContent {
    pub fn content(&self) -> &str {
        match self {
            TokenContent::Plain(s) => s,
            TokenContent::Object { content, .. } => content,
        }
    }
}

/// The subset of a Hugging Face style tokenizer config this crate honors.
/// Every field is optional; absent fields keep the kind's default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub do_lower_case: Option<bool>,
    pub strip_accents: Option<bool>,
    pub tokenize_chinese_chars: Option<bool>,
    pub add_prefix_space: Option<bool>,
    pub clean_up_tokenization_spaces: Option<bool>,
    pub unk_token: Option<TokenContent>,
    pub bos_token: Option<TokenContent>,
    pub eos_token: Option<TokenContent>,
    pub pad_token: Option<TokenContent>,
    pub cls_token: Option<TokenContent>,
    pub sep_token: Option<TokenContent>,
    pub mask_token: Option<TokenContent>,
    #[serde(flatten)]
    pub ignored: BTreeMap<String, Value>,
}

impl TokenizerConfig {
    pub fn parse(data: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| TokenizerError::resource(path, e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::parse(&read_text(path)?, path)?;
        debug!(
            path = %path.display(),
            ignored = ?config.ignored.keys().collect::<Vec<_>>(),
            "loaded tokenizer config"
        );
        Ok(config)
    }
}

/// A named special token with its matching behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedToken {
    pub content: String,
    pub lstrip: bool,
    pub rstrip: bool,
}

impl NamedToken {
    fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            lstrip: false,
            rstrip: false,
        }
    }

    fn lstrip(mut self) -> Self {
        self.lstrip = true;
        self
    }
}

impl From<&TokenContent> for NamedToken {
    fn from(token: &TokenContent) -> Self {
        match token {
            TokenContent::Plain(content) => NamedToken::new(content),
            TokenContent::Object {
                content,
                lstrip,
                rstrip,
            } => NamedToken {
                content: content.clone(),
                lstrip: *lstrip,
                rstrip: *rstrip,
            },
        }
    }
}

/// Effective options for one tokenizer: kind defaults with config overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub lowercase: bool,
    pub strip_accents: bool,
    pub tokenize_chinese_chars: bool,
    pub add_prefix_space: bool,
    pub clean_up_spaces: bool,
    pub unk: NamedToken,
    pub bos: Option<NamedToken>,
    pub eos: Option<NamedToken>,
    pub pad: Option<NamedToken>,
    pub cls: Option<NamedToken>,
    pub sep: Option<NamedToken>,
    pub mask: Option<NamedToken>,
}

impl Settings {
    /// Defaults of `kind`.
    pub fn preset(kind: TokenizerKind) -> Self {
        let named = |s: &str| Some(NamedToken::new(s));
        let base = Settings {
            lowercase: false,
            strip_accents: false,
            tokenize_chinese_chars: false,
            add_prefix_space: false,
            clean_up_spaces: false,
            unk: NamedToken::new("<unk>"),
            bos: None,
            eos: None,
            pad: None,
            cls: None,
            sep: None,
            mask: None,
        };
        match kind {
            TokenizerKind::Whisper => Settings {
                unk: NamedToken::new("<|endoftext|>"),
                bos: named("<|endoftext|>"),
                eos: named("<|endoftext|>"),
                ..base
            },
            TokenizerKind::Clip => Settings {
                lowercase: true,
                unk: NamedToken::new("<|endoftext|>"),
                bos: named("<|startoftext|>"),
                eos: named("<|endoftext|>"),
                pad: named("<|endoftext|>"),
                ..base
            },
            TokenizerKind::Roberta | TokenizerKind::XlmRoberta => Settings {
                bos: named("<s>"),
                eos: named("</s>"),
                pad: named("<pad>"),
                cls: named("<s>"),
                sep: named("</s>"),
                mask: Some(NamedToken::new("<mask>").lstrip()),
                ..base
            },
            TokenizerKind::Marian | TokenizerKind::T5 => Settings {
                eos: named("</s>"),
                pad: named("<pad>"),
                ..base
            },
            TokenizerKind::BertUncased
            | TokenizerKind::BertCased
            | TokenizerKind::BertJapaneseWordPiece
            | TokenizerKind::BertJapaneseCharacter => Settings {
                lowercase: kind == TokenizerKind::BertUncased,
                strip_accents: kind == TokenizerKind::BertUncased,
                tokenize_chinese_chars: kind.family() == Family::WordPiece,
                clean_up_spaces: true,
                unk: NamedToken::new("[UNK]"),
                pad: named("[PAD]"),
                cls: named("[CLS]"),
                sep: named("[SEP]"),
                mask: named("[MASK]"),
                ..base
            },
        }
    }

    /// Defaults of `kind` refined by `config`.
    pub fn resolve(kind: TokenizerKind, config: Option<&TokenizerConfig>) -> Self {
        let mut settings = Self::preset(kind);
        let Some(config) = config else {
            return settings;
        };
        if let Some(lower) = config.do_lower_case {
            settings.lowercase = lower;
            // BERT strips accents whenever it lower-cases unless told otherwise
            if kind.family() == Family::WordPiece {
                settings.strip_accents = lower;
            }
        }
        if let Some(strip) = config.strip_accents {
            settings.strip_accents = strip;
        }
        if let Some(chinese) = config.tokenize_chinese_chars {
            settings.tokenize_chinese_chars = chinese;
        }
        if let Some(prefix) = config.add_prefix_space {
            settings.add_prefix_space = prefix;
        }
        if let Some(clean) = config.clean_up_tokenization_spaces {
            settings.clean_up_spaces = clean;
        }
        if let Some(unk) = &config.unk_token {
            settings.unk = unk.into();
        }
        let overrides = [
            (&mut settings.bos, &config.bos_token),
            (&mut settings.eos, &config.eos_token),
            (&mut settings.pad, &config.pad_token),
            (&mut settings.cls, &config.cls_token),
            (&mut settings.sep, &config.sep_token),
            (&mut settings.mask, &config.mask_token),
        ];
        for (slot, value) in overrides {
            if let Some(token) = value {
                *slot = Some(token.into());
            }
        }
        settings
    }

    /// Every named special token, deduplicated, in a stable order.
    pub fn special_tokens(&self) -> Vec<&NamedToken> {
        let mut tokens: Vec<&NamedToken> = Vec::new();
        let named = [
            Some(&self.unk),
            self.bos.as_ref(),
            self.eos.as_ref(),
            self.pad.as_ref(),
            self.cls.as_ref(),
            self.sep.as_ref(),
            self.mask.as_ref(),
        ];
        for token in named.into_iter().flatten() {
            if !tokens.iter().any(|t| t.content == token.content) {
                tokens.push(token);
            }
        }
        tokens
    }
}
