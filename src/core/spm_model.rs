//! Reader for SentencePiece `.model` files.
//!
//! The file is a serialized `ModelProto` protobuf. Only the fields the
//! encoder needs are decoded; everything else is skipped by wire type:
//!
//! | message          | field | meaning                             |
//! |------------------|-------|-------------------------------------|
//! | `ModelProto`     | 1     | repeated `SentencePiece`            |
//! |                  | 2     | `TrainerSpec`                       |
//! |                  | 3     | `NormalizerSpec`                    |
//! | `SentencePiece`  | 1/2/3 | piece, score (float), type (enum)   |
//! | `TrainerSpec`    | 3     | model type (1 unigram, 2 BPE)       |
//! |                  | 35    | byte fallback                       |
//! |                  | 40-43 | unk, bos, eos, pad ids              |
//! | `NormalizerSpec` | 1     | rule name                           |
//! |                  | 3/4/5 | dummy prefix, collapse ws, escape ws |

use std::path::Path;

use tracing::debug;

use super::error::{Result, TokenizerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceType {
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl PieceType {
    fn from_wire(value: u64) -> std::result::Result<Self, String> {
        Ok(match value {
            1 => PieceType::Normal,
            2 => PieceType::Unknown,
            3 => PieceType::Control,
            4 => PieceType::UserDefined,
            5 => PieceType::Unused,
            6 => PieceType::Byte,
            other => return Err(format!("unknown piece type {other}")),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpmPiece {
    pub piece: String,
    pub score: f32,
    pub kind: PieceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpmAlgorithm {
    Unigram,
    Bpe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerSpec {
    pub name: String,
    pub add_dummy_prefix: bool,
    pub remove_extra_whitespaces: bool,
    pub escape_whitespaces: bool,
}

impl Default for NormalizerSpec {
    fn default() -> Self {
        Self {
            name: "nmt_nfkc".to_string(),
            add_dummy_prefix: true,
            remove_extra_whitespaces: true,
            escape_whitespaces: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentencePieceModel {
    pub pieces: Vec<SpmPiece>,
    pub algorithm: SpmAlgorithm,
    pub byte_fallback: bool,
    pub unk_id: Option<u32>,
    pub bos_id: Option<u32>,
    pub eos_id: Option<u32>,
    pub pad_id: Option<u32>,
    pub normalizer: NormalizerSpec,
}

impl SentencePieceModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| TokenizerError::io(path, e))?;
        let model = Self::parse(&bytes).map_err(|reason| TokenizerError::resource(path, reason))?;
        debug!(
            path = %path.display(),
            pieces = model.pieces.len(),
            algorithm = ?model.algorithm,
            normalizer = %model.normalizer.name,
            "loaded SentencePiece model"
        );
        Ok(model)
    }

    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut pieces = Vec::new();
        let mut trainer = TrainerFields::default();
        let mut normalizer = NormalizerSpec::default();

        let mut reader = WireReader::new(bytes);
        while let Some((field, wire)) = reader.key()? {
            match (field, wire) {
                (1, WireType::Len) => pieces.push(parse_piece(reader.bytes()?)?),
                (2, WireType::Len) => trainer = parse_trainer(reader.bytes()?)?,
                (3, WireType::Len) => normalizer = parse_normalizer(reader.bytes()?)?,
                _ => reader.skip(wire)?,
            }
        }

        if pieces.is_empty() {
            return Err("model has no pieces".to_string());
        }
        // negative or out-of-table ids mean the token is disabled
        let id = |value: i64| {
            usize::try_from(value)
                .ok()
                .filter(|&v| v < pieces.len())
                .map(|v| v as u32)
        };

        Ok(Self {
            algorithm: trainer.algorithm,
            byte_fallback: trainer.byte_fallback,
            unk_id: id(trainer.unk_id),
            bos_id: id(trainer.bos_id),
            eos_id: id(trainer.eos_id),
            pad_id: id(trainer.pad_id),
            pieces,
            normalizer,
        })
    }
}

struct TrainerFields {
    algorithm: SpmAlgorithm,
    byte_fallback: bool,
    unk_id: i64,
    bos_id: i64,
    eos_id: i64,
    pad_id: i64,
}

impl Default for TrainerFields {
    fn default() -> Self {
        Self {
            algorithm: SpmAlgorithm::Unigram,
            byte_fallback: false,
            unk_id: 0,
            bos_id: 1,
            eos_id: 2,
            pad_id: -1,
        }
    }
}

fn parse_piece(bytes: &[u8]) -> std::result::Result<SpmPiece, String> {
    let mut piece = SpmPiece {
        piece: String::new(),
        score: 0.0,
        kind: PieceType::Normal,
    };
    let mut reader = WireReader::new(bytes);
    while let Some((field, wire)) = reader.key()? {
        match (field, wire) {
            (1, WireType::Len) => {
                piece.piece = String::from_utf8(reader.bytes()?.to_vec())
                    .map_err(|_| "piece is not valid UTF-8".to_string())?
            }
            (2, WireType::Fixed32) => piece.score = f32::from_bits(reader.fixed32()?),
            (3, WireType::Varint) => piece.kind = PieceType::from_wire(reader.varint()?)?,
            _ => reader.skip(wire)?,
        }
    }
    Ok(piece)
}

fn parse_trainer(bytes: &[u8]) -> std::result::Result<TrainerFields, String> {
    let mut fields = TrainerFields::default();
    let mut reader = WireReader::new(bytes);
    while let Some((field, wire)) = reader.key()? {
        match (field, wire) {
            (3, WireType::Varint) => {
                fields.algorithm = match reader.varint()? {
                    1 => SpmAlgorithm::Unigram,
                    2 => SpmAlgorithm::Bpe,
                    other => return Err(format!("unsupported model type {other}")),
                }
            }
            (35, WireType::Varint) => fields.byte_fallback = reader.varint()? != 0,
            // int32 fields: negative values arrive sign-extended to 64 bits
            (40, WireType::Varint) => fields.unk_id = reader.varint()? as i64,
            (41, WireType::Varint) => fields.bos_id = reader.varint()? as i64,
            (42, WireType::Varint) => fields.eos_id = reader.varint()? as i64,
            (43, WireType::Varint) => fields.pad_id = reader.varint()? as i64,
            _ => reader.skip(wire)?,
        }
    }
    Ok(fields)
}

fn parse_normalizer(bytes: &[u8]) -> std::result::Result<NormalizerSpec, String> {
    let mut spec = NormalizerSpec::default();
    let mut reader = WireReader::new(bytes);
    while let Some((field, wire)) = reader.key()? {
        match (field, wire) {
            (1, WireType::Len) => {
                spec.name = String::from_utf8_lossy(reader.bytes()?).into_owned();
            }
            (3, WireType::Varint) => spec.add_dummy_prefix = reader.varint()? != 0,
            (4, WireType::Varint) => spec.remove_extra_whitespaces = reader.varint()? != 0,
            (5, WireType::Varint) => spec.escape_whitespaces = reader.varint()? != 0,
            _ => reader.skip(wire)?,
        }
    }
    Ok(spec)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireType {
    Varint,
    Fixed64,
    Len,
    Fixed32,
}

struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn key(&mut self) -> std::result::Result<Option<(u64, WireType)>, String> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let key = self.varint()?;
        let wire = match key & 7 {
            0 => WireType::Varint,
            1 => WireType::Fixed64,
            2 => WireType::Len,
            5 => WireType::Fixed32,
            other => return Err(format!("unsupported wire type {other}")),
        };
        Ok(Some((key >> 3, wire)))
    }

    fn varint(&mut self) -> std::result::Result<u64, String> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| "truncated varint".to_string())?;
            self.pos += 1;
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err("varint is too long".to_string())
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| "truncated field".to_string())?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn bytes(&mut self) -> std::result::Result<&'a [u8], String> {
        let len = self.varint()?;
        let len = usize::try_from(len).map_err(|_| "field length overflow".to_string())?;
        self.take(len)
    }

    fn fixed32(&mut self) -> std::result::Result<u32, String> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn skip(&mut self, wire: WireType) -> std::result::Result<(), String> {
        match wire {
            WireType::Varint => self.varint().map(|_| ()),
            WireType::Fixed64 => self.take(8).map(|_| ()),
            WireType::Len => self.bytes().map(|_| ()),
            WireType::Fixed32 => self.take(4).map(|_| ()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal protobuf writer for building model fixtures.
    #[derive(Default)]
    pub(crate) struct ProtoWriter(pub Vec<u8>);

    impl ProtoWriter {
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

        pub fn uint(&mut self, field: u64, value: u64) -> &mut Self {
            self.varint(field << 3);
            self.varint(value);
            self
        }

        pub fn float(&mut self, field: u64, value: f32) -> &mut Self {
            self.varint((field << 3) | 5);
            self.0.extend_from_slice(&value.to_bits().to_le_bytes());
            self
        }

        pub fn bytes(&mut self, field: u64, value: &[u8]) -> &mut Self {
            self.varint((field << 3) | 2);
            self.varint(value.len() as u64);
            self.0.extend_from_slice(value);
            self
        }
    }

    /// Serialize a model: pieces as (text, score, type), trainer model type
    /// and normalizer rule name.
    pub(crate) fn model_bytes(pieces: &[(&str, f32, u64)], model_type: u64, rule: &str) -> Vec<u8> {
        let mut model = ProtoWriter::default();
        for (text, score, kind) in pieces {
            let mut piece = ProtoWriter::default();
            piece.bytes(1, text.as_bytes()).float(2, *score).uint(3, *kind);
            model.bytes(1, &piece.0);
        }
        let mut trainer = ProtoWriter::default();
        trainer
            .uint(3, model_type)
            .uint(40, 0)
            .uint(41, 1)
            .uint(42, 2)
            .uint(43, u64::MAX);
        model.bytes(2, &trainer.0);
        let mut normalizer = ProtoWriter::default();
        normalizer.bytes(1, rule.as_bytes()).uint(3, 1);
        model.bytes(3, &normalizer.0);
        model.0
    }

    #[test]
    fn test_parse_model() {
        let bytes = model_bytes(
            &[
                ("<unk>", 0.0, 2),
                ("<s>", 0.0, 3),
                ("</s>", 0.0, 3),
                ("▁hello", -1.5, 1),
            ],
            1,
            "nmt_nfkc",
        );
        let model = SentencePieceModel::parse(&bytes).unwrap();
        assert_eq!(model.pieces.len(), 4);
        assert_eq!(model.pieces[3].piece, "▁hello");
        assert_eq!(model.pieces[3].score, -1.5);
        assert_eq!(model.pieces[1].kind, PieceType::Control);
        assert_eq!(model.algorithm, SpmAlgorithm::Unigram);
        assert_eq!(model.unk_id, Some(0));
        assert_eq!(model.eos_id, Some(2));
        assert_eq!(model.pad_id, None);
        assert!(model.normalizer.add_dummy_prefix);
        assert_eq!(model.normalizer.name, "nmt_nfkc");
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut piece = ProtoWriter::default();
        piece.bytes(1, b"a").float(2, -1.0).uint(3, 1).uint(9, 5);
        let mut model = ProtoWriter::default();
        model.bytes(1, &piece.0).bytes(7, b"opaque").uint(8, 3);
        let parsed = SentencePieceModel::parse(&model.0).unwrap();
        assert_eq!(parsed.pieces.len(), 1);
        assert_eq!(parsed.algorithm, SpmAlgorithm::Unigram);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(SentencePieceModel::parse(b"").is_err());
        assert!(SentencePieceModel::parse(&[0x0A, 0x10, 0x01]).is_err());
        assert!(SentencePieceModel::parse(&[0x0B]).is_err());
        let bytes = model_bytes(&[("a", 0.0, 1)], 7, "identity");
        assert!(SentencePieceModel::parse(&bytes).is_err());
    }
}
