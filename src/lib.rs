pub mod core;
#[cfg(feature = "python")]
mod python;

pub use core::{
    complete_prefix_len, sanitize, utf32_len, utf32_to_utf8, utf8_to_utf32, Encoding, ErrorKind,
    Result, Session, StreamingDecoder, Tokenizer, TokenizerBuilder, TokenizerError, TokenizerFlags,
    TokenizerKind,
};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// shardtok - subword tokenizers for Whisper, CLIP, RoBERTa, XLM-R, Marian,
/// T5 and BERT (including Japanese BERT over a MeCab dictionary)
///
/// - `Session`: load files, encode or decode, read results
/// - `Tokenizer`: shared engine with rayon batch calls
/// - `StreamingDecoder`: UTF-8 safe token-by-token decoding
/// - UTF-8 / UTF-32 code point helpers
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PySession>()?;
    m.add_class::<python::PyTokenizer>()?;
    m.add_class::<python::PyStreamingDecoder>()?;
    m.add_function(wrap_pyfunction!(python::decode_utf8, m)?)?;
    m.add_function(wrap_pyfunction!(python::encode_utf8, m)?)?;
    m.add_function(wrap_pyfunction!(python::sanitize_utf8, m)?)?;
    for kind in TokenizerKind::ALL {
        m.add(kind.name().to_ascii_uppercase(), kind.code())?;
    }
    m.add("FLAG_NONE", TokenizerFlags::NONE.bits())?;
    m.add("FLAG_UTF8_SAFE", TokenizerFlags::UTF8_SAFE.bits())?;
    Ok(())
}
