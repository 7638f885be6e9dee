//! Core tokenization engine for shardtok.
//!
//! One [`Tokenizer`] type covers four subword families behind a closed
//! model dispatch:
//!
//! - byte-level BPE (Whisper, CLIP, RoBERTa) with an LRU segment cache
//! - WordPiece after BERT's basic tokenizer (BERT cased and uncased)
//! - SentencePiece unigram and BPE read from `.model` files (XLM-R, Marian, T5)
//! - MeCab lattice segmentation followed by WordPiece (Japanese BERT)
//!
//! # Architecture
//!
//! - [`TokenizerBuilder`]: collects loaded files and assembles an engine
//! - [`Tokenizer`]: immutable engine with encode/decode and rayon batch calls
//! - [`Session`]: load-then-query front end that owns the last results
//! - [`StreamingDecoder`]: UTF-8 safe token-by-token decoding
//! - [`utf`]: strict UTF-8 / UTF-32 code point codec
//!
//! Offsets are UTF-32 indices into the caller's text. Normalization keeps a
//! per-character map back to the original so they survive lower-casing,
//! accent stripping and whitespace collapsing.

mod bpe;
mod builder;
pub mod byte_level;
mod config;
mod dictionary;
mod error;
mod kind;
mod lattice;
mod model;
mod normalizer;
mod pretokenizer;
mod session;
mod special;
mod spm_model;
mod streaming;
mod tokenizer;
mod trie;
mod unigram;
pub mod utf;
mod vocab;
mod wordpiece;

pub use builder::{TokenizerBuilder, T5_EXTRA_IDS};
pub use config::{NamedToken, Settings, TokenContent, TokenizerConfig};
pub use dictionary::{ConnectionMatrix, Dictionary, Morpheme};
pub use error::{ErrorKind, Result, TokenizerError};
pub use kind::{Family, FileKind, Template, TokenizerFlags, TokenizerKind};
pub use normalizer::{NormalizationForm, NormalizedText};
pub use session::Session;
pub use special::{Fragment, SpecialToken, SpecialTokens};
pub use spm_model::{NormalizerSpec, PieceType, SentencePieceModel, SpmAlgorithm, SpmPiece};
pub use streaming::StreamingDecoder;
pub use tokenizer::{Encoding, Tokenizer};
pub use utf::{
    complete_prefix_len, sanitize, utf32_len, utf32_to_utf8, utf8_to_utf32, MAX_CODEPOINT,
};
pub use vocab::{
    load_added_tokens, load_merges, load_vocab_json, load_vocab_text, parse_added_tokens,
    parse_merges, parse_vocab_json, parse_vocab_text, AddedTokens, Vocabulary,
};
pub use wordpiece::clean_up_tokenization;
