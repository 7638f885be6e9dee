//! UTF-8 safe streaming decoder for token-by-token model output.
//!
//! Byte-level and byte-fallback vocabularies can split one character over
//! several ids. The decoder buffers the bytes of an unfinished character and
//! only emits text once it is complete.

use std::ops::Deref;

use super::error::Result;
use super::tokenizer::{LeadingSpace, Tokenizer};
use super::utf::{complete_prefix_len, sanitize};

/// A streaming decoder that holds back incomplete UTF-8 sequences across
/// token boundaries.
///
/// `T` is anything that derefs to a [`Tokenizer`]: a plain reference, or an
/// `Arc` when the decoder has to own its engine.
///
/// # Example
///
/// ```ignore
/// let mut decoder = StreamingDecoder::new(&tokenizer, true);
/// for id in ids {
///     if let Some(text) = decoder.add_token(id)? {
///         print!("{text}");
///     }
/// }
/// print!("{}", decoder.flush());
/// ```
pub struct StreamingDecoder<T: Deref<Target = Tokenizer>> {
    tokenizer: T,
    skip_special_tokens: bool,
    buffer: Vec<u8>,
    started: bool,
    leading: LeadingSpace,
}

impl<T: Deref<Target = Tokenizer>> StreamingDecoder<T> {
    /// Create a new streaming decoder for the given tokenizer.
    pub fn new(tokenizer: T, skip_special_tokens: bool) -> Self {
        Self {
            tokenizer,
            skip_special_tokens,
            buffer: Vec::with_capacity(16),
            started: false,
            leading: LeadingSpace::default(),
        }
    }

    /// Add a token and return any complete characters.
    ///
    /// Returns `Ok(None)` while the buffered bytes are still incomplete.
    pub fn add_token(&mut self, id: u32) -> Result<Option<String>> {
        self.push(id)?;
        Ok(self.extract_complete())
    }

    /// Add several tokens at once. Nothing is buffered if any id is invalid.
    pub fn add_tokens(&mut self, ids: &[u32]) -> Result<Option<String>> {
        for &id in ids {
            self.tokenizer.id_to_piece(id)?;
        }
        for &id in ids {
            self.push(id)?;
        }
        Ok(self.extract_complete())
    }

    /// Emit whatever is buffered.
    ///
    /// Incomplete sequences become U+FFFD, or are dropped when the tokenizer
    /// was built with [`TokenizerFlags::UTF8_SAFE`](super::kind::TokenizerFlags::UTF8_SAFE).
    pub fn flush(&mut self) -> String {
        if self.buffer.is_empty() {
            return String::new();
        }
        let text = self.to_text(&self.buffer);
        self.buffer.clear();
        text
    }

    /// Reset the decoder state, discarding any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.started = false;
        self.leading = LeadingSpace::default();
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn push(&mut self, id: u32) -> Result<()> {
        let first = !self.started;
        let at = self.buffer.len();
        self.tokenizer
            .render_id(id, first, self.skip_special_tokens, &mut self.buffer)?;
        if self.leading.carried_by(&self.tokenizer, id) {
            self.tokenizer
                .model()
                .strip_prefix_space(&mut self.buffer, at);
        }
        if self.buffer.len() > at {
            self.started = true;
        }
        Ok(())
    }

    fn extract_complete(&mut self) -> Option<String> {
        let len = complete_prefix_len(&self.buffer);
        if len == 0 {
            return None;
        }
        let bytes: Vec<u8> = self.buffer.drain(..len).collect();
        Some(self.to_text(&bytes))
    }

    fn to_text(&self, bytes: &[u8]) -> String {
        if self.tokenizer.flags().utf8_safe() {
            sanitize(bytes)
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
