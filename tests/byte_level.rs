mod common;

use common::{byte_level_vocab_json, pieces, vocab_json, Fixture};
use shardtok::core::byte_level::{byte_level_char, byte_level_encode};
use shardtok::{ErrorKind, Session, StreamingDecoder, TokenizerFlags, TokenizerKind};

const ROBERTA_EXTRA: &[&str] = &[
    "Ġh", "Ġhe", "ll", "lo", "Ġhell", "Ġhello", "<s>", "</s>", "<pad>", "<unk>", "<mask>",
];

const ROBERTA_MERGES: &str = "#version: 0.2\nĠ h\nĠh e\nl l\nl o\nĠhe ll\nĠhell o\n";

fn roberta(fixture: &Fixture) -> Session {
    let mut session = Session::new(TokenizerKind::Roberta, TokenizerFlags::NONE);
    session
        .load_vocab_file(fixture.write("vocab.json", byte_level_vocab_json(ROBERTA_EXTRA)))
        .unwrap();
    assert!(!session.is_configured());
    session
        .load_merges_file(fixture.write("merges.txt", ROBERTA_MERGES))
        .unwrap();
    assert!(session.is_configured());
    session
}

#[test]
fn test_roberta_prefix_space_example() {
    let fixture = Fixture::new();
    let mut session = Session::new(TokenizerKind::Roberta, TokenizerFlags::NONE);
    session
        .load_vocab_file(fixture.write("vocab.json", vocab_json(&["Ġhello", "Ġworld", "!"])))
        .unwrap();
    session
        .load_merges_file(fixture.write("merges.txt", "#version: 0.2\n"))
        .unwrap();
    session
        .load_config_file(fixture.write("tokenizer_config.json", r#"{"add_prefix_space": true}"#))
        .unwrap();

    session.encode("hello world!").unwrap();
    assert_eq!(session.tokens().unwrap(), &[0, 1, 2]);
    assert_eq!(session.char_starts().unwrap(), &[0, 6, 11]);
    assert_eq!(session.char_ends().unwrap(), &[5, 11, 12]);

    session.decode(&[0, 1, 2]).unwrap();
    assert_eq!(session.text().unwrap(), "hello world!");
}

fn roberta_with_prefix_space(fixture: &Fixture) -> Session {
    let mut session = roberta(fixture);
    session
        .load_config_file(fixture.write("tokenizer_config.json", r#"{"add_prefix_space": true}"#))
        .unwrap();
    session
}

#[test]
fn test_prefix_space_keeps_leading_whitespace() {
    let fixture = Fixture::new();
    let mut session = roberta_with_prefix_space(&fixture);
    session.encode(" hello").unwrap();
    assert_eq!(pieces(&session), vec!["<s>", "Ġ", "Ġhello", "</s>"]);
    assert_eq!(session.char_starts().unwrap(), &[0, 0, 1, 0]);
    assert_eq!(session.char_ends().unwrap(), &[0, 0, 6, 0]);

    let ids = session.tokens().unwrap().to_vec();
    session.decode(&ids).unwrap();
    assert_eq!(session.text().unwrap(), " hello");
    session.decode_with_special_tokens(&ids).unwrap();
    assert_eq!(session.text().unwrap(), "<s> hello</s>");

    let tokenizer = session.tokenizer().unwrap();
    let mut decoder = StreamingDecoder::new(&**tokenizer, true);
    let mut streamed = String::new();
    for &id in &ids {
        if let Some(chunk) = decoder.add_token(id).unwrap() {
            streamed.push_str(&chunk);
        }
    }
    assert_eq!(streamed, " hello");
}

#[test]
fn test_prefix_space_only_in_front_of_the_input() {
    let fixture = Fixture::new();
    let mut session = roberta_with_prefix_space(&fixture);
    session.add_special_tokens(["<x>"]).unwrap();

    session.encode_with_special_tokens("a<x>b").unwrap();
    assert_eq!(pieces(&session), vec!["<s>", "Ġ", "a", "<x>", "b", "</s>"]);
    let ids = session.tokens().unwrap().to_vec();
    session.decode_with_special_tokens(&ids).unwrap();
    assert_eq!(session.text().unwrap(), "<s>a<x>b</s>");
    session.decode_with_special_tokens(&ids[1..ids.len() - 1]).unwrap();
    assert_eq!(session.text().unwrap(), "a<x>b");

    // an input that opens with a special token gets no inserted space
    session.encode_with_special_tokens("<x> b").unwrap();
    assert_eq!(pieces(&session), vec!["<s>", "<x>", "Ġ", "b", "</s>"]);
    let ids = session.tokens().unwrap().to_vec();
    session.decode_with_special_tokens(&ids).unwrap();
    assert_eq!(session.text().unwrap(), "<s><x> b</s>");
    session.decode(&ids).unwrap();
    assert_eq!(session.text().unwrap(), " b");
}

#[test]
fn test_roberta_merges_and_template() {
    let fixture = Fixture::new();
    let mut session = roberta(&fixture);
    session.encode("Hello hellos").unwrap();
    assert_eq!(
        pieces(&session),
        vec!["<s>", "H", "e", "ll", "o", "Ġhello", "s", "</s>"]
    );
    assert_eq!(session.word_ids().unwrap(), vec![-1, 0, 0, 0, 0, 1, 1, -1]);
    assert_eq!(session.char_starts().unwrap(), &[0, 0, 1, 2, 4, 6, 11, 0]);
    assert_eq!(session.char_ends().unwrap(), &[0, 1, 2, 4, 5, 11, 12, 0]);

    let ids = session.tokens().unwrap().to_vec();
    session.decode(&ids).unwrap();
    assert_eq!(session.text().unwrap(), "Hello hellos");
    session.decode_with_special_tokens(&ids).unwrap();
    assert_eq!(session.text().unwrap(), "<s>Hello hellos</s>");
}

#[test]
fn test_mask_is_atomic_and_strips_left() {
    let fixture = Fixture::new();
    let mut session = roberta(&fixture);
    let mask = 256 + 10;

    session.encode_with_special_tokens("a <mask> b").unwrap();
    assert_eq!(pieces(&session), vec!["<s>", "a", "<mask>", "Ġ", "b", "</s>"]);
    assert_eq!(session.word_ids().unwrap(), vec![-1, 0, -1, 1, 1, -1]);
    assert_eq!(session.char_starts().unwrap(), &[0, 0, 2, 8, 9, 0]);
    assert_eq!(session.char_ends().unwrap(), &[0, 1, 8, 9, 10, 0]);

    session.encode("a <mask> b").unwrap();
    assert!(!session.tokens().unwrap().contains(&mask));
}

#[test]
fn test_added_special_tokens_get_fresh_ids() {
    let fixture = Fixture::new();
    let mut session = roberta(&fixture);
    assert_eq!(session.vocab_size().unwrap(), 267);
    session.add_special_tokens(["<|new|>", "<mask>"]).unwrap();
    assert_eq!(session.vocab_size().unwrap(), 268);
    assert_eq!(session.get_vocab(267).unwrap(), "<|new|>");

    session.encode_with_special_tokens("hello<|new|>").unwrap();
    assert_eq!(
        pieces(&session),
        vec!["<s>", "h", "e", "ll", "o", "<|new|>", "</s>"]
    );
}

#[test]
fn test_added_tokens_file() {
    let fixture = Fixture::new();
    let mut session = roberta(&fixture);
    session
        .load_added_tokens_file(fixture.write("added_tokens.json", r#"{"<extra>": 267}"#))
        .unwrap();
    session.encode_with_special_tokens("<extra>").unwrap();
    assert_eq!(session.tokens().unwrap(), &[262, 267, 263]);

    let err = session
        .load_added_tokens_file(fixture.write("bad_added.json", r#"{"<gap>": 300}"#))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceError);
    // the earlier tokens file is still in effect
    session.encode_with_special_tokens("<extra>").unwrap();
    assert_eq!(session.tokens().unwrap(), &[262, 267, 263]);
}

#[test]
fn test_inconsistent_merges_keep_previous_engine() {
    let fixture = Fixture::new();
    let mut session = roberta(&fixture);
    let err = session
        .load_merges_file(fixture.write("bad_merges.txt", "Ġ q\n"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceError);
    session.encode("hello").unwrap();
    assert_eq!(pieces(&session), vec!["<s>", "h", "e", "ll", "o", "</s>"]);

    let mut fresh = Session::new(TokenizerKind::Roberta, TokenizerFlags::NONE);
    fresh
        .load_vocab_file(fixture.path("vocab.json"))
        .unwrap();
    assert!(fresh.load_merges_file(fixture.path("bad_merges.txt")).is_err());
    assert!(!fresh.is_configured());
}

#[test]
fn test_missing_file_is_resource_error() {
    let fixture = Fixture::new();
    let mut session = Session::new(TokenizerKind::Whisper, TokenizerFlags::NONE);
    let err = session.load_vocab_file(fixture.path("nope.json")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceError);
    let err = session
        .load_vocab_file(fixture.write("broken.json", "{\"a\": 0, \"b\": 2}"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceError);
}

fn whisper(fixture: &Fixture, flags: TokenizerFlags) -> Session {
    // the emoji U+1F600 is F0 9F 98 80; merges only build its two halves
    let first = byte_level_encode(&[0xF0, 0x9F]);
    let second = byte_level_encode(&[0x98, 0x80]);
    let whole = format!("{first}{second}");
    let vocab = byte_level_vocab_json(&[&first, &second, &whole, "<|endoftext|>"]);
    let merges = format!(
        "#version: 0.2\n{} {}\n{} {}\n",
        byte_level_char(0xF0),
        byte_level_char(0x9F),
        byte_level_char(0x98),
        byte_level_char(0x80)
    );
    let mut session = Session::new(TokenizerKind::Whisper, flags);
    session
        .load_vocab_file(fixture.write("vocab.json", vocab))
        .unwrap();
    session
        .load_merges_file(fixture.write("merges.txt", merges))
        .unwrap();
    session
}

#[test]
fn test_whisper_split_emoji() {
    let fixture = Fixture::new();
    let mut session = whisper(&fixture, TokenizerFlags::NONE);
    session.encode("😀!").unwrap();
    assert_eq!(session.tokens().unwrap(), &[256, 257, 33]);
    // no template for Whisper and no offsets
    assert_eq!(
        session.word_ids().unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );

    let encoding = session.tokenizer().unwrap().encode("😀!", false).unwrap();
    assert_eq!(encoding.char_starts, vec![0, 0, 1]);
    assert_eq!(encoding.char_ends, vec![1, 1, 2]);

    session.decode(&[256]).unwrap();
    assert_eq!(session.text().unwrap(), "\u{FFFD}");
    session.decode(&[256, 257]).unwrap();
    assert_eq!(session.text().unwrap(), "😀");
}

#[test]
fn test_whisper_utf8_safe() {
    let fixture = Fixture::new();
    let mut session = whisper(&fixture, TokenizerFlags::UTF8_SAFE);
    session.encode("😀!").unwrap();
    assert_eq!(session.tokens().unwrap(), &[258, 33]);

    session.decode(&[256]).unwrap();
    assert_eq!(session.text().unwrap(), "");
    assert_eq!(session.text_length().unwrap(), 1);
    session.decode(&[33, 256, 257, 33]).unwrap();
    assert_eq!(session.text().unwrap(), "!😀!");
    session.decode(&[257, 33]).unwrap();
    assert_eq!(session.text().unwrap(), "!");
}

#[test]
fn test_clip_lowercases_and_marks_word_ends() {
    let fixture = Fixture::new();
    let mut session = Session::new(TokenizerKind::Clip, TokenizerFlags::NONE);
    session
        .load_vocab_file(fixture.write(
            "vocab.json",
            vocab_json(&["<|startoftext|>", "<|endoftext|>", "hello</w>", "world</w>"]),
        ))
        .unwrap();
    session
        .load_merges_file(fixture.write("merges.txt", "#version: 0.2\n"))
        .unwrap();

    session.encode("  Hello \n World ").unwrap();
    assert_eq!(session.tokens().unwrap(), &[0, 2, 3, 1]);
    session.decode(&[0, 2, 3, 1]).unwrap();
    assert_eq!(session.text().unwrap(), "hello world");
    assert_eq!(
        session.char_starts().unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );
}

#[test]
fn test_encode_batch_shares_engine() {
    let fixture = Fixture::new();
    let session = roberta(&fixture);
    let tokenizer = session.tokenizer().unwrap();
    let texts = ["hello", "Hello hellos", "", "a <mask> b"];
    let batch = tokenizer.encode_batch(&texts[..], true).unwrap();
    assert_eq!(batch.len(), 4);
    assert_eq!(batch[2].ids, vec![262, 263]);
    for (text, encoding) in texts.iter().zip(&batch) {
        assert_eq!(encoding, &tokenizer.encode(text, true).unwrap());
    }
    assert!(tokenizer.cache_len() > 0);
    tokenizer.clear_cache();
    assert_eq!(tokenizer.cache_len(), 0);
}
