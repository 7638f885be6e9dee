mod bindings;

pub use bindings::{
    decode_utf8, encode_utf8, sanitize_utf8, PySession, PyStreamingDecoder, PyTokenizer,
};
