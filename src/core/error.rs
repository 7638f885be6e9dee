use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse error category shared by every failing operation.
///
/// Callers that only need to branch on the class of failure (for example the
/// Python bindings, which map each kind onto one exception type) use this
/// instead of matching individual [`TokenizerError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    InvalidEncoding,
    InvalidToken,
    UnsupportedOperation,
    ResourceError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::InvalidEncoding => "invalid encoding",
            ErrorKind::InvalidToken => "invalid token",
            ErrorKind::UnsupportedOperation => "unsupported operation",
            ErrorKind::ResourceError => "resource error",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid UTF-8 sequence at byte {offset}")]
    InvalidEncoding { offset: usize },
    #[error("invalid code point U+{0:04X}")]
    InvalidCodepoint(u32),
    #[error("token id {id} is outside the vocabulary (size {vocab_size})")]
    InvalidToken { id: u32, vocab_size: usize },
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed resource {}: {reason}", path.display())]
    Resource { path: PathBuf, reason: String },
    #[error("inconsistent tokenizer data: {0}")]
    Inconsistent(String),
    #[error("regex compilation error: {0}")]
    Regex(#[from] Box<fancy_regex::Error>),
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasick(#[from] aho_corasick::BuildError),
}

impl TokenizerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenizerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            TokenizerError::InvalidState(_) => ErrorKind::InvalidState,
            TokenizerError::InvalidEncoding { .. } | TokenizerError::InvalidCodepoint(_) => {
                ErrorKind::InvalidEncoding
            }
            TokenizerError::InvalidToken { .. } => ErrorKind::InvalidToken,
            TokenizerError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            TokenizerError::Io { .. }
            | TokenizerError::Resource { .. }
            | TokenizerError::Inconsistent(_)
            | TokenizerError::Regex(_)
            | TokenizerError::AhoCorasick(_) => ErrorKind::ResourceError,
        }
    }

    pub(crate) fn resource(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TokenizerError::Resource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TokenizerError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<fancy_regex::Error> for TokenizerError {
    fn from(err: fancy_regex::Error) -> Self {
        TokenizerError::Regex(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
