//! Vocabulary storage and loaders for the on-disk formats tokenizers ship with.
//!
//! - `vocab.json`: JSON object mapping piece to id (byte-level BPE, Marian)
//! - `vocab.txt`: one piece per line, id = line number (WordPiece)
//! - `merges.txt`: one `left right` pair per line, optional `#version` header
//! - `added_tokens.json`: JSON array of strings or object mapping piece to id

use std::path::Path;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use super::error::{Result, TokenizerError};

/// Dense bijection between pieces and ids `0..len`.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pieces: Vec<String>,
    ids: FxHashMap<String, u32>,
}

impl Vocabulary {
    /// Build from pieces indexed by id. Duplicate pieces are rejected.
    pub fn from_pieces(pieces: Vec<String>) -> Result<Self> {
        let mut ids = FxHashMap::default();
        ids.reserve(pieces.len());
        for (id, piece) in pieces.iter().enumerate() {
            if ids.insert(piece.clone(), id as u32).is_some() {
                return Err(TokenizerError::Inconsistent(format!(
                    "piece {piece:?} appears more than once"
                )));
            }
        }
        Ok(Self { pieces, ids })
    }

    /// Build from a piece to id map whose ids must cover `0..len` exactly.
    pub fn from_map(map: FxHashMap<String, u32>) -> Result<Self> {
        let mut slots: Vec<Option<String>> = vec![None; map.len()];
        for (piece, id) in map {
            let Some(slot) = slots.get_mut(id as usize) else {
                return Err(TokenizerError::Inconsistent(format!(
                    "id {id} of {piece:?} leaves a gap in the vocabulary"
                )));
            };
            if let Some(other) = slot {
                return Err(TokenizerError::Inconsistent(format!(
                    "id {id} is assigned to both {other:?} and {piece:?}"
                )));
            }
            *slot = Some(piece);
        }
        // every slot is filled: ids are distinct and all below len
        let pieces = slots.into_iter().flatten().collect();
        Self::from_pieces(pieces)
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    #[inline]
    pub fn id(&self, piece: &str) -> Option<u32> {
        self.ids.get(piece).copied()
    }

    #[inline]
    pub fn piece(&self, id: u32) -> Option<&str> {
        self.pieces.get(id as usize).map(String::as_str)
    }

    #[inline]
    pub fn contains(&self, piece: &str) -> bool {
        self.ids.contains_key(piece)
    }

    /// Id of `piece`, appending it if it is not present yet.
    pub fn get_or_push(&mut self, piece: &str) -> u32 {
        if let Some(id) = self.id(piece) {
            return id;
        }
        let id = self.pieces.len() as u32;
        self.pieces.push(piece.to_string());
        self.ids.insert(piece.to_string(), id);
        id
    }

    pub fn pieces(&self) -> &[String] {
        &self.pieces
    }
}

/// Tokens listed in an `added_tokens.json` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddedTokens {
    /// Pieces that receive fresh ids in file order.
    Fresh(Vec<String>),
    /// Pieces with explicit ids, sorted by id.
    Explicit(Vec<(String, u32)>),
}

impl AddedTokens {
    /// Register the tokens into `vocab`, returning their ids.
    ///
    /// Explicit ids must either name the existing id of the same piece or be
    /// exactly the next free id, so the vocabulary stays dense.
    pub fn apply(&self, vocab: &mut Vocabulary) -> Result<Vec<u32>> {
        match self {
            AddedTokens::Fresh(pieces) => {
                Ok(pieces.iter().map(|p| vocab.get_or_push(p)).collect())
            }
            AddedTokens::Explicit(entries) => {
                let mut ids = Vec::with_capacity(entries.len());
                for (piece, id) in entries {
                    match vocab.id(piece) {
                        Some(existing) if existing == *id => {}
                        Some(existing) => {
                            return Err(TokenizerError::Inconsistent(format!(
                                "added token {piece:?} has id {id} but the vocabulary maps it to {existing}"
                            )))
                        }
                        None if *id as usize == vocab.len() => {
                            vocab.get_or_push(piece);
                        }
                        None => {
                            return Err(TokenizerError::Inconsistent(format!(
                                "added token {piece:?} has id {id}, expected {}",
                                vocab.len()
                            )))
                        }
                    }
                    ids.push(*id);
                }
                Ok(ids)
            }
        }
    }
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| TokenizerError::io(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        TokenizerError::resource(
            path,
            format!("not valid UTF-8 at byte {}", e.utf8_error().valid_up_to()),
        )
    })
}

/// Parse a `vocab.json` document.
pub fn parse_vocab_json(data: &str, path: &Path) -> Result<Vocabulary> {
    let map: FxHashMap<String, u32> =
        serde_json::from_str(data).map_err(|e| TokenizerError::resource(path, e.to_string()))?;
    Vocabulary::from_map(map).map_err(|e| TokenizerError::resource(path, e.to_string()))
}

/// Parse a newline separated vocabulary where the line number is the id.
pub fn parse_vocab_text(data: &str, path: &Path) -> Result<Vocabulary> {
    let pieces = data
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect();
    Vocabulary::from_pieces(pieces).map_err(|e| TokenizerError::resource(path, e.to_string()))
}

/// Parse a `merges.txt` file into ordered pairs, highest priority first.
pub fn parse_merges(data: &str, path: &Path) -> Result<Vec<(String, String)>> {
    let mut merges = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || (lineno == 0 && line.starts_with("#version")) {
            continue;
        }
        let mut parts = line.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => {
                merges.push((a.to_string(), b.to_string()))
            }
            _ => {
                return Err(TokenizerError::resource(
                    path,
                    format!("line {} is not a `left right` pair", lineno + 1),
                ))
            }
        }
    }
    Ok(merges)
}

/// Parse an `added_tokens.json` document.
pub fn parse_added_tokens(data: &str, path: &Path) -> Result<AddedTokens> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| TokenizerError::resource(path, e.to_string()))?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Object(mut obj) => match obj.remove("content") {
                    Some(Value::String(s)) => Ok(s),
                    _ => Err(TokenizerError::resource(path, "token object without content")),
                },
                other => Err(TokenizerError::resource(
                    path,
                    format!("unexpected added token entry {other}"),
                )),
            })
            .collect::<Result<Vec<_>>>()
            .map(AddedTokens::Fresh),
        Value::Object(obj) => {
            let mut entries = obj
                .into_iter()
                .map(|(piece, id)| match id.as_u64() {
                    Some(id) if id <= u32::MAX as u64 => Ok((piece, id as u32)),
                    _ => Err(TokenizerError::resource(
                        path,
                        format!("added token {piece:?} has a non-integer id"),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            entries.sort_by_key(|(_, id)| *id);
            Ok(AddedTokens::Explicit(entries))
        }
        _ => Err(TokenizerError::resource(
            path,
            "expected a JSON array or object",
        )),
    }
}

pub fn load_vocab_json(path: impl AsRef<Path>) -> Result<Vocabulary> {
    let path = path.as_ref();
    let vocab = parse_vocab_json(&read_text(path)?, path)?;
    debug!(path = %path.display(), size = vocab.len(), "loaded JSON vocabulary");
    Ok(vocab)
}

pub fn load_vocab_text(path: impl AsRef<Path>) -> Result<Vocabulary> {
    let path = path.as_ref();
    let vocab = parse_vocab_text(&read_text(path)?, path)?;
    debug!(path = %path.display(), size = vocab.len(), "loaded text vocabulary");
    Ok(vocab)
}

pub fn load_merges(path: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let path = path.as_ref();
    let merges = parse_merges(&read_text(path)?, path)?;
    debug!(path = %path.display(), merges = merges.len(), "loaded merge rules");
    Ok(merges)
}

pub fn load_added_tokens(path: impl AsRef<Path>) -> Result<AddedTokens> {
    let path = path.as_ref();
    parse_added_tokens(&read_text(path)?, path)
}
