use std::sync::OnceLock;

use proptest::prelude::*;
use shardtok::core::byte_level::alphabet;
use shardtok::core::{TokenizerConfig, Vocabulary};
use shardtok::{
    sanitize, utf32_to_utf8, utf8_to_utf32, StreamingDecoder, Tokenizer, TokenizerFlags,
    TokenizerKind,
};

fn whisper() -> &'static Tokenizer {
    static TOKENIZER: OnceLock<Tokenizer> = OnceLock::new();
    TOKENIZER.get_or_init(|| {
        let mut pieces: Vec<String> = alphabet().map(String::from).collect();
        pieces.push("<|endoftext|>".to_string());
        Tokenizer::builder(TokenizerKind::Whisper, TokenizerFlags::NONE)
            .vocab(Vocabulary::from_pieces(pieces).unwrap())
            .merges(Vec::new())
            .build()
            .unwrap()
    })
}

fn bert() -> &'static Tokenizer {
    static TOKENIZER: OnceLock<Tokenizer> = OnceLock::new();
    TOKENIZER.get_or_init(|| {
        let mut pieces: Vec<String> = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        pieces.extend(('a'..='z').map(String::from));
        pieces.extend(('a'..='z').map(|c| format!("##{c}")));
        Tokenizer::builder(TokenizerKind::BertUncased, TokenizerFlags::NONE)
            .vocab(Vocabulary::from_pieces(pieces).unwrap())
            .build()
            .unwrap()
    })
}

/// Byte-level engines with extra specials, without and with `add_prefix_space`.
fn byte_level_with_specials() -> &'static [(Tokenizer, &'static [&'static str])] {
    static TOKENIZERS: OnceLock<Vec<(Tokenizer, &'static [&'static str])>> = OnceLock::new();
    TOKENIZERS.get_or_init(|| {
        const WHISPER_NAMED: &[&str] = &["<|endoftext|>"];
        const WHISPER_SPECIALS: &[&str] = &["<x>", "<|y|>", "<|endoftext|>"];
        const ROBERTA_NAMED: &[&str] = &["<s>", "<pad>", "</s>", "<unk>", "<mask>"];
        const ROBERTA_SPECIALS: &[&str] = &["<x>", "<|y|>", "<mask>"];
        let kinds = [
            (TokenizerKind::Whisper, WHISPER_NAMED, WHISPER_SPECIALS),
            (TokenizerKind::Roberta, ROBERTA_NAMED, ROBERTA_SPECIALS),
        ];
        let mut tokenizers = Vec::new();
        for (kind, named, specials) in kinds {
            for add_prefix_space in [false, true] {
                let mut pieces: Vec<String> = alphabet().map(String::from).collect();
                pieces.extend(named.iter().map(|s| s.to_string()));
                let tokenizer = Tokenizer::builder(kind, TokenizerFlags::NONE)
                    .vocab(Vocabulary::from_pieces(pieces).unwrap())
                    .merges(Vec::new())
                    .special_tokens(["<x>", "<|y|>"])
                    .config(TokenizerConfig {
                        add_prefix_space: Some(add_prefix_space),
                        ..Default::default()
                    })
                    .build()
                    .unwrap();
                tokenizers.push((tokenizer, specials));
            }
        }
        tokenizers
    })
}

fn render(tokenizer: &Tokenizer, ids: &[u32]) -> String {
    ids.iter()
        .map(|&id| tokenizer.id_to_piece(id).unwrap())
        .collect()
}

fn assert_offsets_well_formed(tokenizer: &Tokenizer, text: &str) {
    let encoding = tokenizer.encode(text, true).unwrap();
    let len = text.chars().count() as u32;
    assert_eq!(encoding.ids.len(), encoding.word_ids.len());
    assert_eq!(encoding.ids.len(), encoding.char_starts.len());
    assert_eq!(encoding.ids.len(), encoding.char_ends.len());
    for (&start, &end) in encoding.char_starts.iter().zip(&encoding.char_ends) {
        assert!(start <= end && end <= len, "span {start}..{end} outside {len}");
    }
    let words: Vec<u32> = encoding.word_ids.iter().flatten().copied().collect();
    assert!(words.windows(2).all(|w| w[0] <= w[1]), "word ids {words:?}");
}

proptest! {
    #[test]
    fn test_byte_level_round_trip(text in "(?s).{0,48}") {
        let tokenizer = whisper();
        let ids = tokenizer.encode(&text, false).unwrap().ids;
        prop_assert_eq!(tokenizer.decode(&ids, true).unwrap(), text.clone());

        let mut decoder = StreamingDecoder::new(tokenizer, true);
        let mut streamed = String::new();
        for &id in &ids {
            if let Some(chunk) = decoder.add_token(id).unwrap() {
                streamed.push_str(&chunk);
            }
        }
        streamed.push_str(&decoder.flush());
        prop_assert_eq!(streamed, text);
    }

    #[test]
    fn test_special_tokens_round_trip(
        parts in prop::collection::vec(("[^<]{0,8}", 0usize..3), 0..5),
        tail in "[^<]{0,8}",
    ) {
        for (tokenizer, specials) in byte_level_with_specials() {
            let mut text = String::new();
            let mut expected = String::new();
            for (fragment, pick) in &parts {
                let special = specials[*pick];
                text.push_str(fragment);
                expected.push_str(fragment);
                // RoBERTa's <mask> swallows the whitespace in front of it
                if special == "<mask>" {
                    let kept = expected.trim_end().len();
                    expected.truncate(kept);
                }
                text.push_str(special);
                expected.push_str(special);
            }
            text.push_str(&tail);
            expected.push_str(&tail);

            let ids = tokenizer.encode(&text, true).unwrap().ids;
            let (prefix, suffix) = tokenizer.template();
            let body = &ids[prefix.len()..ids.len() - suffix.len()];
            prop_assert_eq!(tokenizer.decode(body, false).unwrap(), expected.clone());

            let full = format!(
                "{}{expected}{}",
                render(tokenizer, prefix),
                render(tokenizer, suffix)
            );
            prop_assert_eq!(tokenizer.decode(&ids, false).unwrap(), full.clone());

            let mut decoder = StreamingDecoder::new(tokenizer, false);
            let mut streamed = String::new();
            for &id in &ids {
                if let Some(chunk) = decoder.add_token(id).unwrap() {
                    streamed.push_str(&chunk);
                }
            }
            streamed.push_str(&decoder.flush());
            prop_assert_eq!(streamed, full);
        }
    }

    #[test]
    fn test_offsets_stay_in_bounds(text in "(?s).{0,48}") {
        assert_offsets_well_formed(bert(), &text);
        assert_offsets_well_formed(whisper(), &text);
    }

    #[test]
    fn test_encoding_is_deterministic(texts in prop::collection::vec("(?s).{0,24}", 0..6)) {
        let tokenizer = bert();
        let batch = tokenizer.encode_batch(&texts[..], false).unwrap();
        prop_assert_eq!(batch.len(), texts.len());
        for (text, encoding) in texts.iter().zip(&batch) {
            prop_assert_eq!(encoding, &tokenizer.encode(text, false).unwrap());
        }
    }

    #[test]
    fn test_code_point_codec(ch in any::<char>()) {
        let mut buf = [0u8; 4];
        let len = utf32_to_utf8(ch as u32, &mut buf).unwrap();
        let expected = ch.to_string();
        prop_assert_eq!(&buf[..len], expected.as_bytes());
        prop_assert_eq!(utf8_to_utf32(&buf[..len]).unwrap(), (ch as u32, len));
    }

    #[test]
    fn test_surrogates_are_rejected(cp in 0xD800u32..=0xDFFF) {
        let mut buf = [0u8; 4];
        prop_assert!(utf32_to_utf8(cp, &mut buf).is_err());
        let bytes = [0xE0 | (cp >> 12) as u8, 0x80 | ((cp >> 6) & 0x3F) as u8, 0x80 | (cp & 0x3F) as u8];
        prop_assert!(utf8_to_utf32(&bytes).is_err());
    }

    #[test]
    fn test_sanitize_keeps_valid_text(text in "(?s).{0,32}", garbage in prop::collection::vec(0x80u8..=0xBF, 0..4)) {
        prop_assert_eq!(sanitize(text.as_bytes()), text.clone());
        let mut bytes = garbage.clone();
        bytes.extend_from_slice(text.as_bytes());
        prop_assert_eq!(sanitize(&bytes), text);
    }
}
