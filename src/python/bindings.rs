//! Python bindings for shardtok.
//!
//! The `Session` class mirrors the load-then-query API of
//! [`crate::core::Session`]; `Tokenizer` exposes the shared engine for batch
//! work, which runs on rayon with the GIL released.
//!
//! # Example
//!
//! ```python
//! from shardtok import Session, BERT_UNCASED
//!
//! session = Session(BERT_UNCASED)
//! session.load_vocab_file("vocab.txt")
//! session.encode("Hello world")
//! ids = session.tokens()
//! session.decode(ids)
//! print(session.text())
//! ```

use std::sync::Arc;

use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::core::{
    sanitize, utf32_to_utf8, utf8_to_utf32, ErrorKind, Session, StreamingDecoder, Tokenizer,
    TokenizerError, TokenizerFlags, TokenizerKind,
};

fn to_py_err(err: TokenizerError) -> PyErr {
    match err.kind() {
        ErrorKind::ResourceError => PyIOError::new_err(err.to_string()),
        ErrorKind::InvalidState | ErrorKind::UnsupportedOperation => {
            PyRuntimeError::new_err(err.to_string())
        }
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn parse_kind(kind: i32) -> PyResult<TokenizerKind> {
    TokenizerKind::from_code(kind).map_err(to_py_err)
}

/// Python wrapper for a tokenizer session.
#[pyclass(name = "Session")]
pub struct PySession {
    inner: Session,
}

#[pymethods]
impl PySession {
    /// Create an unconfigured session.
    ///
    /// Args:
    ///     kind: Tokenizer type code (WHISPER, CLIP, ..., BERT_CASED)
    ///     flags: Bitwise OR of FLAG_* constants
    #[new]
    #[pyo3(signature = (kind, flags=0))]
    fn new(kind: i32, flags: u32) -> PyResult<Self> {
        let kind = parse_kind(kind)?;
        let flags = TokenizerFlags::from_bits(flags).map_err(to_py_err)?;
        Ok(Self {
            inner: Session::new(kind, flags),
        })
    }

    /// Tokenizer type name, e.g. "bert_uncased".
    #[getter]
    fn kind(&self) -> &'static str {
        self.inner.kind().name()
    }

    #[getter]
    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    fn load_model_file(&mut self, path: &str) -> PyResult<()> {
        self.inner.load_model_file(path).map_err(to_py_err)
    }

    fn load_dictionary_file(&mut self, path: &str) -> PyResult<()> {
        self.inner.load_dictionary_file(path).map_err(to_py_err)
    }

    fn load_vocab_file(&mut self, path: &str) -> PyResult<()> {
        self.inner.load_vocab_file(path).map_err(to_py_err)
    }

    fn load_merges_file(&mut self, path: &str) -> PyResult<()> {
        self.inner.load_merges_file(path).map_err(to_py_err)
    }

    fn load_added_tokens_file(&mut self, path: &str) -> PyResult<()> {
        self.inner.load_added_tokens_file(path).map_err(to_py_err)
    }

    fn load_config_file(&mut self, path: &str) -> PyResult<()> {
        self.inner.load_config_file(path).map_err(to_py_err)
    }

    /// Register extra special tokens (byte-level kinds only).
    fn add_special_tokens(&mut self, tokens: Vec<String>) -> PyResult<()> {
        self.inner.add_special_tokens(tokens).map_err(to_py_err)
    }

    /// Encode text. Special tokens are matched only when
    /// `split_special_tokens` is true.
    #[pyo3(signature = (text, split_special_tokens=false))]
    fn encode(&mut self, text: &str, split_special_tokens: bool) -> PyResult<()> {
        if split_special_tokens {
            self.inner.encode_with_special_tokens(text)
        } else {
            self.inner.encode(text)
        }
        .map_err(to_py_err)
    }

    fn token_count(&self) -> PyResult<usize> {
        self.inner.token_count().map_err(to_py_err)
    }

    fn tokens(&self) -> PyResult<Vec<u32>> {
        self.inner.tokens().map(<[u32]>::to_vec).map_err(to_py_err)
    }

    /// Word index per token, -1 for template and special tokens.
    fn word_ids(&self) -> PyResult<Vec<i32>> {
        self.inner.word_ids().map_err(to_py_err)
    }

    fn char_starts(&self) -> PyResult<Vec<u32>> {
        self.inner.char_starts().map(<[u32]>::to_vec).map_err(to_py_err)
    }

    fn char_ends(&self) -> PyResult<Vec<u32>> {
        self.inner.char_ends().map(<[u32]>::to_vec).map_err(to_py_err)
    }

    /// Decode ids. Special tokens are dropped unless `skip_special_tokens`
    /// is false.
    #[pyo3(signature = (ids, skip_special_tokens=true))]
    fn decode(&mut self, ids: Vec<u32>, skip_special_tokens: bool) -> PyResult<()> {
        if skip_special_tokens {
            self.inner.decode(&ids)
        } else {
            self.inner.decode_with_special_tokens(&ids)
        }
        .map_err(to_py_err)
    }

    /// Byte length of the decoded text including the terminator.
    fn text_length(&self) -> PyResult<usize> {
        self.inner.text_length().map_err(to_py_err)
    }

    fn text(&self) -> PyResult<String> {
        self.inner.text().map(str::to_string).map_err(to_py_err)
    }

    fn vocab_size(&self) -> PyResult<usize> {
        self.inner.vocab_size().map_err(to_py_err)
    }

    fn get_vocab(&self, id: u32) -> PyResult<String> {
        self.inner.get_vocab(id).map(str::to_string).map_err(to_py_err)
    }

    /// The shared engine of a configured session.
    fn tokenizer(&self) -> PyResult<PyTokenizer> {
        let inner = self.inner.tokenizer().cloned().ok_or_else(|| {
            PyRuntimeError::new_err("session is not configured, load its files first")
        })?;
        Ok(PyTokenizer { inner })
    }

    fn __repr__(&self) -> String {
        format!(
            "Session(kind={}, configured={})",
            self.inner.kind(),
            self.inner.is_configured()
        )
    }
}

/// Immutable engine shared between sessions, for batch calls.
#[pyclass(name = "Tokenizer")]
pub struct PyTokenizer {
    inner: Arc<Tokenizer>,
}

#[pymethods]
impl PyTokenizer {
    #[pyo3(signature = (text, split_special_tokens=false))]
    fn encode(&self, text: &str, split_special_tokens: bool) -> PyResult<Vec<u32>> {
        self.inner
            .encode(text, split_special_tokens)
            .map(|encoding| encoding.ids)
            .map_err(to_py_err)
    }

    /// Batch encode multiple texts in parallel.
    ///
    /// Uses Rayon to parallelize encoding across texts.
    #[pyo3(signature = (texts, split_special_tokens=false))]
    fn encode_batch(
        &self,
        py: Python<'_>,
        texts: Vec<String>,
        split_special_tokens: bool,
    ) -> PyResult<Vec<Vec<u32>>> {
        let encodings = py
            .detach(|| self.inner.encode_batch(&texts, split_special_tokens))
            .map_err(to_py_err)?;
        Ok(encodings.into_iter().map(|encoding| encoding.ids).collect())
    }

    #[pyo3(signature = (ids, skip_special_tokens=true))]
    fn decode(&self, ids: Vec<u32>, skip_special_tokens: bool) -> PyResult<String> {
        self.inner
            .decode(&ids, skip_special_tokens)
            .map_err(to_py_err)
    }

    /// Batch decode multiple id lists in parallel.
    #[pyo3(signature = (id_lists, skip_special_tokens=true))]
    fn decode_batch(
        &self,
        py: Python<'_>,
        id_lists: Vec<Vec<u32>>,
        skip_special_tokens: bool,
    ) -> PyResult<Vec<String>> {
        py.detach(|| self.inner.decode_batch(&id_lists, skip_special_tokens))
            .map_err(to_py_err)
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    /// Create a streaming decoder for token-by-token output.
    #[pyo3(signature = (skip_special_tokens=true))]
    fn streaming_decoder(&self, skip_special_tokens: bool) -> PyStreamingDecoder {
        PyStreamingDecoder {
            inner: StreamingDecoder::new(Arc::clone(&self.inner), skip_special_tokens),
        }
    }

    /// Clear the segment cache.
    fn clear_cache(&self) {
        self.inner.clear_cache();
    }

    #[getter]
    fn cache_len(&self) -> usize {
        self.inner.cache_len()
    }
}

/// Streaming decoder that only emits complete UTF-8 characters.
#[pyclass(name = "StreamingDecoder")]
pub struct PyStreamingDecoder {
    inner: StreamingDecoder<Arc<Tokenizer>>,
}

#[pymethods]
impl PyStreamingDecoder {
    /// Add a token and return any complete characters, or None while
    /// buffering.
    fn add_token(&mut self, token_id: u32) -> PyResult<Option<String>> {
        self.inner.add_token(token_id).map_err(to_py_err)
    }

    fn add_tokens(&mut self, token_ids: Vec<u32>) -> PyResult<Option<String>> {
        self.inner.add_tokens(&token_ids).map_err(to_py_err)
    }

    fn flush(&mut self) -> String {
        self.inner.flush()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    #[getter]
    fn has_pending(&self) -> bool {
        self.inner.has_pending()
    }

    #[getter]
    fn pending_bytes(&self) -> usize {
        self.inner.pending_bytes()
    }
}

/// Decode the first code point of UTF-8 `data`.
///
/// Returns:
///     (code point, bytes consumed)
#[pyfunction]
pub fn decode_utf8(data: &[u8]) -> PyResult<(u32, usize)> {
    utf8_to_utf32(data).map_err(to_py_err)
}

/// Encode one code point as UTF-8.
#[pyfunction]
pub fn encode_utf8(code_point: u32) -> PyResult<Vec<u8>> {
    let mut buf = [0u8; 4];
    let len = utf32_to_utf8(code_point, &mut buf).map_err(to_py_err)?;
    Ok(buf[..len].to_vec())
}

/// Drop invalid and incomplete UTF-8 sequences.
#[pyfunction]
pub fn sanitize_utf8(data: &[u8]) -> String {
    sanitize(data)
}
