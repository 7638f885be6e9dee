use rayon::prelude::*;
use tracing::trace;

use super::builder::TokenizerBuilder;
use super::error::{Result, TokenizerError};
use super::kind::{TokenizerFlags, TokenizerKind};
use super::model::Model;
use super::normalizer::NormalizedText;
use super::pretokenizer::{char_byte_offsets, char_index_at, char_index_end};
use super::special::{whole, Fragment, SpecialTokens};
use super::utf::sanitize;
use super::vocab::Vocabulary;
use super::wordpiece::clean_up_tokenization;

/// Result of one encode call, stored as parallel arrays.
///
/// Spans are UTF-32 offsets into the text given to [`Tokenizer::encode`].
/// Template and special tokens have no word id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    pub ids: Vec<u32>,
    pub word_ids: Vec<Option<u32>>,
    pub char_starts: Vec<u32>,
    pub char_ends: Vec<u32>,
}

impl Encoding {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            word_ids: Vec::with_capacity(capacity),
            char_starts: Vec::with_capacity(capacity),
            char_ends: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, id: u32, (start, end): (u32, u32), word: Option<u32>) {
        self.ids.push(id);
        self.word_ids.push(word);
        self.char_starts.push(start);
        self.char_ends.push(end);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// An immutable, fully configured tokenizer.
///
/// Built through [`TokenizerBuilder`] once the files its kind requires are
/// available. It holds no per-call state apart from the byte-level segment
/// cache, so one instance can be shared behind an `Arc` and used from many
/// threads; [`encode_batch`](Self::encode_batch) does exactly that with rayon.
///
/// # Pipeline
///
/// 1. special tokens are cut out of the raw text (optional per call)
/// 2. each remaining fragment is normalized with its original offsets tracked
/// 3. the model splits it into segments and encodes every segment
/// 4. template tokens are added around the result
#[derive(Debug)]
pub struct Tokenizer {
    builder: TokenizerBuilder,
    vocab: Vocabulary,
    model: Model,
    special_tokens: SpecialTokens,
    prefix: Vec<u32>,
    suffix: Vec<u32>,
    clean_up_spaces: bool,
}

impl Tokenizer {
    pub(crate) fn from_parts(
        builder: TokenizerBuilder,
        vocab: Vocabulary,
        model: Model,
        special_tokens: SpecialTokens,
        prefix: Vec<u32>,
        suffix: Vec<u32>,
        clean_up_spaces: bool,
    ) -> Self {
        Self {
            builder,
            vocab,
            model,
            special_tokens,
            prefix,
            suffix,
            clean_up_spaces,
        }
    }

    /// Start configuring a tokenizer of `kind`.
    pub fn builder(kind: TokenizerKind, flags: TokenizerFlags) -> TokenizerBuilder {
        TokenizerBuilder::new(kind, flags)
    }

    /// The sources this tokenizer was built from, for rebuilding with more
    /// special tokens or another config.
    pub fn to_builder(&self) -> TokenizerBuilder {
        self.builder.clone()
    }

    pub fn kind(&self) -> TokenizerKind {
        self.builder.kind()
    }

    pub fn flags(&self) -> TokenizerFlags {
        self.builder.flags()
    }

    /// Encode `text`.
    ///
    /// # Arguments
    /// * `text` - Input text
    /// * `split_special_tokens` - Match registered special tokens in the text
    ///   and emit them as single ids; otherwise they are ordinary text
    pub fn encode(&self, text: &str, split_special_tokens: bool) -> Result<Encoding> {
        let fragments = if split_special_tokens {
            self.special_tokens.split(text)
        } else {
            whole(text)
        };
        let offsets = char_byte_offsets(text);
        let trim = self.model.trims_offsets();

        let mut encoding = Encoding::with_capacity(text.len() / 3 + 2);
        for &id in &self.prefix {
            encoding.push(id, (0, 0), None);
        }

        let mut word = 0u32;
        for (index, fragment) in fragments.into_iter().enumerate() {
            match fragment {
                Fragment::Special { id, range } => {
                    let start = char_index_at(&offsets, range.start) as u32;
                    let end = char_index_end(&offsets, range.end) as u32;
                    encoding.push(id, (start, end), None);
                }
                Fragment::Text(range) => {
                    let base = char_index_at(&offsets, range.start) as u32;
                    let mut normalized = NormalizedText::new(&text[range], base);
                    self.model.normalize(&mut normalized, index == 0);
                    for segment in self.model.segment(&normalized)? {
                        let segment_text = normalized.slice(segment.clone());
                        let pieces = self.model.encode_segment(&segment_text, &self.vocab);
                        if pieces.is_empty() {
                            continue;
                        }
                        let segment_offsets = char_byte_offsets(&segment_text);
                        for piece in pieces {
                            let start = segment.start + char_index_at(&segment_offsets, piece.start);
                            let end = segment.start + char_index_end(&segment_offsets, piece.end);
                            let span = if trim {
                                normalized.trimmed_span(start..end)
                            } else {
                                normalized.span(start..end)
                            };
                            encoding.push(piece.id, span, Some(word));
                        }
                        word += 1;
                    }
                }
            }
        }

        for &id in &self.suffix {
            encoding.push(id, (0, 0), None);
        }
        trace!(bytes = text.len(), tokens = encoding.len(), "encoded");
        Ok(encoding)
    }

    /// Encode several texts in parallel.
    pub fn encode_batch<S>(&self, texts: &[S], split_special_tokens: bool) -> Result<Vec<Encoding>>
    where
        S: AsRef<str> + Sync,
    {
        texts
            .par_iter()
            .map(|text| self.encode(text.as_ref(), split_special_tokens))
            .collect()
    }

    /// Decode ids to raw bytes, before UTF-8 validation.
    ///
    /// Every id is checked before anything is rendered.
    pub fn decode_bytes(&self, ids: &[u32], skip_special_tokens: bool) -> Result<Vec<u8>> {
        if let Some(&id) = ids.iter().find(|&&id| self.vocab.piece(id).is_none()) {
            return Err(TokenizerError::InvalidToken {
                id,
                vocab_size: self.vocab.len(),
            });
        }
        let mut out = Vec::with_capacity(ids.len() * 4);
        let mut leading = LeadingSpace::default();
        for &id in ids {
            let first = out.is_empty();
            let at = out.len();
            self.render_id(id, first, skip_special_tokens, &mut out)?;
            if leading.carried_by(self, id) {
                self.model.strip_prefix_space(&mut out, at);
            }
        }
        self.model.finish(&mut out);
        Ok(out)
    }

    /// Append the bytes of one id. `first` is set while no text has been
    /// produced yet.
    pub(crate) fn render_id(
        &self,
        id: u32,
        first: bool,
        skip_special_tokens: bool,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let piece = self.id_to_piece(id)?;
        if self.special_tokens.contains_id(id) {
            if !skip_special_tokens {
                self.model.render_special(piece, first, out);
            }
        } else {
            self.model.render_piece(piece, first, out);
        }
        Ok(())
    }

    pub(crate) fn model(&self) -> &Model {
        &self.model
    }

    /// Decode ids to text.
    ///
    /// With [`TokenizerFlags::UTF8_SAFE`] incomplete or invalid byte sequences
    /// are dropped; otherwise they become U+FFFD.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let bytes = self.decode_bytes(ids, skip_special_tokens)?;
        let text = if self.flags().utf8_safe() {
            sanitize(&bytes)
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        let text = if self.clean_up_spaces {
            clean_up_tokenization(&text)
        } else {
            text
        };
        trace!(tokens = ids.len(), bytes = text.len(), "decoded");
        Ok(text)
    }

    /// Decode several id lists in parallel.
    pub fn decode_batch(
        &self,
        id_lists: &[Vec<u32>],
        skip_special_tokens: bool,
    ) -> Result<Vec<String>> {
        id_lists
            .par_iter()
            .map(|ids| self.decode(ids, skip_special_tokens))
            .collect()
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Number of ids, special tokens included.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn id_to_piece(&self, id: u32) -> Result<&str> {
        self.vocab.piece(id).ok_or(TokenizerError::InvalidToken {
            id,
            vocab_size: self.vocab.len(),
        })
    }

    pub fn piece_to_id(&self, piece: &str) -> Option<u32> {
        self.vocab.id(piece)
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    /// Ids added before and after every encoding.
    pub fn template(&self) -> (&[u32], &[u32]) {
        (&self.prefix, &self.suffix)
    }

    /// Clear the segment cache.
    pub fn clear_cache(&self) {
        self.model.clear_cache();
    }

    /// Number of cached segments.
    pub fn cache_len(&self) -> usize {
        self.model.cache_len()
    }
}

/// Finds the id that carries the space `add_prefix_space` inserts: the
/// first one after the template prefix, when it is an ordinary piece. An
/// input that opens with a special token never got that space.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LeadingSpace {
    template: usize,
    settled: bool,
}

impl LeadingSpace {
    /// Feed the next decoded id; true if it carries the inserted space.
    pub(crate) fn carried_by(&mut self, tokenizer: &Tokenizer, id: u32) -> bool {
        if self.settled {
            return false;
        }
        if tokenizer.prefix.get(self.template) == Some(&id) {
            self.template += 1;
            return false;
        }
        self.settled = true;
        !tokenizer.special_tokens.contains_id(id)
    }
}
