//! Stateful front end: load files, encode or decode, then read the results.
//!
//! A [`Session`] owns one encode result and one decode result. Each is
//! replaced wholesale by its producing call and left untouched when that
//! call fails. The engine itself is an immutable [`Tokenizer`] behind an
//! `Arc`, so several sessions (one per thread) can share it.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::builder::TokenizerBuilder;
use super::config::TokenizerConfig;
use super::dictionary::Dictionary;
use super::error::{Result, TokenizerError};
use super::kind::{FileKind, TokenizerFlags, TokenizerKind};
use super::spm_model::SentencePieceModel;
use super::tokenizer::{Encoding, Tokenizer};
use super::vocab::{load_added_tokens, load_merges, load_vocab_json, load_vocab_text};

#[derive(Debug)]
pub struct Session {
    builder: TokenizerBuilder,
    tokenizer: Option<Arc<Tokenizer>>,
    encoding: Option<Encoding>,
    text: Option<String>,
}

impl Session {
    /// Create an unconfigured session.
    pub fn new(kind: TokenizerKind, flags: TokenizerFlags) -> Self {
        Self {
            builder: TokenizerBuilder::new(kind, flags),
            tokenizer: None,
            encoding: None,
            text: None,
        }
    }

    /// Create a configured session over an engine built elsewhere.
    pub fn with_tokenizer(tokenizer: Arc<Tokenizer>) -> Self {
        Self {
            builder: tokenizer.to_builder(),
            tokenizer: Some(tokenizer),
            encoding: None,
            text: None,
        }
    }

    pub fn kind(&self) -> TokenizerKind {
        self.builder.kind()
    }

    pub fn flags(&self) -> TokenizerFlags {
        self.builder.flags()
    }

    /// True once every required file is loaded.
    pub fn is_configured(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// The engine, once configured.
    pub fn tokenizer(&self) -> Option<&Arc<Tokenizer>> {
        self.tokenizer.as_ref()
    }

    /// Load a SentencePiece `.model` file.
    pub fn load_model_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.check_accepts(FileKind::Model)?;
        let model = SentencePieceModel::load(path)?;
        self.configure(self.builder.clone().model(model))
    }

    /// Load a MeCab lexicon CSV or a dictionary directory.
    pub fn load_dictionary_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.check_accepts(FileKind::Dictionary)?;
        let dictionary = Dictionary::load(path)?;
        self.configure(self.builder.clone().dictionary(dictionary))
    }

    /// Load a vocabulary: a JSON map for byte-level kinds and Marian, one
    /// piece per line otherwise.
    pub fn load_vocab_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.check_accepts(FileKind::Vocab)?;
        let vocab = if self.kind().vocab_is_json() {
            load_vocab_json(path)?
        } else {
            load_vocab_text(path)?
        };
        self.configure(self.builder.clone().vocab(vocab))
    }

    pub fn load_merges_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.check_accepts(FileKind::Merges)?;
        let merges = load_merges(path)?;
        self.configure(self.builder.clone().merges(merges))
    }

    pub fn load_added_tokens_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.check_accepts(FileKind::AddedTokens)?;
        let tokens = load_added_tokens(path)?;
        self.configure(self.builder.clone().added_tokens(tokens))
    }

    pub fn load_config_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.check_accepts(FileKind::Config)?;
        let config = TokenizerConfig::load(path)?;
        self.configure(self.builder.clone().config(config))
    }

    /// Register extra special tokens. Pieces not yet in the vocabulary get
    /// the next free ids.
    pub fn add_special_tokens<I, S>(&mut self, tokens: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.kind().supports_added_special_tokens() {
            return Err(TokenizerError::UnsupportedOperation(format!(
                "{} tokenizer does not accept added special tokens",
                self.kind()
            )));
        }
        self.configure(self.builder.clone().special_tokens(tokens))
    }

    /// Encode `text` with special tokens treated as ordinary text.
    pub fn encode(&mut self, text: &str) -> Result<()> {
        self.run_encode(text, false)
    }

    /// Encode `text`, emitting registered special tokens as single ids.
    pub fn encode_with_special_tokens(&mut self, text: &str) -> Result<()> {
        self.run_encode(text, true)
    }

    /// Encode raw UTF-8 input, rejecting malformed sequences.
    pub fn encode_bytes(&mut self, text: &[u8], split_special_tokens: bool) -> Result<()> {
        let text = std::str::from_utf8(text).map_err(|e| TokenizerError::InvalidEncoding {
            offset: e.valid_up_to(),
        })?;
        self.run_encode(text, split_special_tokens)
    }

    pub fn token_count(&self) -> Result<usize> {
        Ok(self.encoding()?.len())
    }

    pub fn tokens(&self) -> Result<&[u32]> {
        Ok(&self.encoding()?.ids)
    }

    /// Copy the ids of the last encoding into `buffer`.
    pub fn get_tokens(&self, buffer: &mut [u32]) -> Result<usize> {
        copy_into(self.tokens()?, buffer)
    }

    /// Word index of every token, `-1` for template and special tokens.
    pub fn word_ids(&self) -> Result<Vec<i32>> {
        let encoding = self.offset_encoding("word ids")?;
        Ok(encoding
            .word_ids
            .iter()
            .map(|word| word.map_or(-1, |w| w as i32))
            .collect())
    }

    pub fn get_word_ids(&self, buffer: &mut [i32]) -> Result<usize> {
        copy_into(&self.word_ids()?, buffer)
    }

    /// UTF-32 start offset of every token in the encoded text.
    pub fn char_starts(&self) -> Result<&[u32]> {
        Ok(&self.offset_encoding("character offsets")?.char_starts)
    }

    pub fn get_char_starts(&self, buffer: &mut [u32]) -> Result<usize> {
        copy_into(self.char_starts()?, buffer)
    }

    /// UTF-32 end offset (exclusive) of every token in the encoded text.
    pub fn char_ends(&self) -> Result<&[u32]> {
        Ok(&self.offset_encoding("character offsets")?.char_ends)
    }

    pub fn get_char_ends(&self, buffer: &mut [u32]) -> Result<usize> {
        copy_into(self.char_ends()?, buffer)
    }

    /// Decode `ids`, dropping special tokens.
    pub fn decode(&mut self, ids: &[u32]) -> Result<()> {
        self.run_decode(ids, true)
    }

    /// Decode `ids`, rendering special tokens literally.
    pub fn decode_with_special_tokens(&mut self, ids: &[u32]) -> Result<()> {
        self.run_decode(ids, false)
    }

    /// Byte length of the decoded text including the NUL terminator.
    pub fn text_length(&self) -> Result<usize> {
        Ok(self.text()?.len() + 1)
    }

    pub fn text(&self) -> Result<&str> {
        self.text
            .as_deref()
            .ok_or_else(|| TokenizerError::InvalidState("decode has not been called".into()))
    }

    /// Copy the decoded text and a NUL terminator into `buffer`.
    pub fn get_text(&self, buffer: &mut [u8]) -> Result<usize> {
        let text = self.text()?.as_bytes();
        if buffer.len() <= text.len() {
            return Err(TokenizerError::InvalidArgument(format!(
                "buffer of {} bytes cannot hold {} bytes of text and a terminator",
                buffer.len(),
                text.len()
            )));
        }
        buffer[..text.len()].copy_from_slice(text);
        buffer[text.len()] = 0;
        Ok(text.len() + 1)
    }

    pub fn vocab_size(&self) -> Result<usize> {
        Ok(self.engine()?.vocab_size())
    }

    /// Piece string of `id`.
    pub fn get_vocab(&self, id: u32) -> Result<&str> {
        self.engine()?.id_to_piece(id)
    }

    fn check_accepts(&self, file: FileKind) -> Result<()> {
        if self.kind().accepts(file) {
            Ok(())
        } else {
            Err(TokenizerError::UnsupportedOperation(format!(
                "{} tokenizer does not use a {file} file",
                self.kind()
            )))
        }
    }

    /// Adopt `builder`, rebuilding the engine when it has every required
    /// file. Nothing changes if the build fails.
    fn configure(&mut self, builder: TokenizerBuilder) -> Result<()> {
        if builder.is_complete() {
            let tokenizer = builder.build()?;
            self.tokenizer = Some(Arc::new(tokenizer));
        } else {
            debug!(kind = %builder.kind(), missing = ?builder.missing(), "waiting for files");
        }
        self.builder = builder;
        Ok(())
    }

    fn engine(&self) -> Result<&Tokenizer> {
        self.tokenizer.as_deref().ok_or_else(|| {
            let missing: Vec<String> = self.builder.missing().iter().map(ToString::to_string).collect();
            TokenizerError::InvalidState(format!(
                "{} tokenizer is not configured, load its {} file(s) first",
                self.kind(),
                missing.join(", ")
            ))
        })
    }

    fn run_encode(&mut self, text: &str, split_special_tokens: bool) -> Result<()> {
        let encoding = self.engine()?.encode(text, split_special_tokens)?;
        self.encoding = Some(encoding);
        Ok(())
    }

    fn run_decode(&mut self, ids: &[u32], skip_special_tokens: bool) -> Result<()> {
        let text = self.engine()?.decode(ids, skip_special_tokens)?;
        self.text = Some(text);
        Ok(())
    }

    fn encoding(&self) -> Result<&Encoding> {
        self.encoding
            .as_ref()
            .ok_or_else(|| TokenizerError::InvalidState("encode has not been called".into()))
    }

    fn offset_encoding(&self, what: &str) -> Result<&Encoding> {
        if !self.kind().supports_offsets() {
            return Err(TokenizerError::UnsupportedOperation(format!(
                "{} tokenizer does not report {what}",
                self.kind()
            )));
        }
        self.encoding()
    }
}

fn copy_into<T: Copy>(values: &[T], buffer: &mut [T]) -> Result<usize> {
    if buffer.len() < values.len() {
        return Err(TokenizerError::InvalidArgument(format!(
            "buffer holds {} values, {} needed",
            buffer.len(),
            values.len()
        )));
    }
    buffer[..values.len()].copy_from_slice(values);
    Ok(values.len())
}
