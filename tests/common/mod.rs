//! Fixture files for the integration tests, written to a temporary directory.
#![allow(dead_code)]

use std::path::PathBuf;

use serde_json::{Map, Value};
use shardtok::core::byte_level::alphabet;
use shardtok::Session;
use tempfile::TempDir;

pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// `vocab.json` text mapping each piece to its position.
pub fn vocab_json(pieces: &[&str]) -> String {
    let map: Map<String, Value> = pieces
        .iter()
        .enumerate()
        .map(|(id, piece)| (piece.to_string(), Value::from(id)))
        .collect();
    Value::Object(map).to_string()
}

/// Byte-level vocabulary: the 256 alphabet symbols (id = byte value), then
/// `extra` from id 256.
pub fn byte_level_pieces(extra: &[&str]) -> Vec<String> {
    alphabet()
        .map(String::from)
        .chain(extra.iter().map(|s| s.to_string()))
        .collect()
}

pub fn byte_level_vocab_json(extra: &[&str]) -> String {
    let pieces = byte_level_pieces(extra);
    let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
    vocab_json(&refs)
}

/// Piece strings of the tokens of the last encoding.
pub fn pieces(session: &Session) -> Vec<String> {
    session
        .tokens()
        .expect("tokens")
        .iter()
        .map(|&id| session.get_vocab(id).expect("piece").to_string())
        .collect()
}

#[derive(Default)]
struct Proto(Vec<u8>);

impl Proto {
    fn varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.0.push(byte);
                return;
            }
            self.0.push(byte | 0x80);
        }
    }

    fn uint(&mut self, field: u64, value: u64) -> &mut Self {
        self.varint(field << 3);
        self.varint(value);
        self
    }

    fn float(&mut self, field: u64, value: f32) -> &mut Self {
        self.varint((field << 3) | 5);
        self.0.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn bytes(&mut self, field: u64, value: &[u8]) -> &mut Self {
        self.varint((field << 3) | 2);
        self.varint(value.len() as u64);
        self.0.extend_from_slice(value);
        self
    }
}

pub const NORMAL: u64 = 1;
pub const UNKNOWN: u64 = 2;
pub const CONTROL: u64 = 3;
pub const BYTE: u64 = 6;

pub const UNIGRAM: u64 = 1;
pub const BPE: u64 = 2;

/// Serialized SentencePiece `ModelProto` with the `nmt_nfkc` normalizer.
pub fn spm_model(pieces: &[(&str, f32, u64)], model_type: u64, byte_fallback: bool) -> Vec<u8> {
    let mut model = Proto::default();
    for (text, score, kind) in pieces {
        let mut piece = Proto::default();
        piece.bytes(1, text.as_bytes()).float(2, *score).uint(3, *kind);
        model.bytes(1, &piece.0);
    }
    let unk = pieces
        .iter()
        .position(|(_, _, kind)| *kind == UNKNOWN)
        .expect("model needs an unknown piece");
    let mut trainer = Proto::default();
    trainer
        .uint(3, model_type)
        .uint(35, byte_fallback as u64)
        .uint(40, unk as u64);
    model.bytes(2, &trainer.0);
    let mut normalizer = Proto::default();
    normalizer.bytes(1, b"nmt_nfkc").uint(3, 1);
    model.bytes(3, &normalizer.0);
    model.0
}

/// The 256 `<0xNN>` byte pieces.
pub fn byte_pieces() -> Vec<String> {
    (0..=255u8).map(|b| format!("<0x{b:02X}>")).collect()
}
