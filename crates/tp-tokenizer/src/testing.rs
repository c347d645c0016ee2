//! `tokenizer.json` fixtures shared by the workspace's tests.

use serde_json::{json, Map, Value};

use crate::byte_level::byte_char;

/// WordPiece vocabulary of [`bert_tokenizer_json`], in id order.
pub const BERT_VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "hello", "world", "good", "bad", "the", "movie",
    "was", "great", "terrible", "film", "an", "awful", "un", "##believ", "##able", "cafe", ",",
    "!", ".", "'", "s", "i", "love", "it", "hate", "this", "a", "##s",
];

fn added(id: usize, content: &str) -> Value {
    json!({
        "id": id,
        "content": content,
        "single_word": false,
        "lstrip": false,
        "rstrip": false,
        "normalized": false,
        "special": true
    })
}

/// An uncased BERT tokenizer over [`BERT_VOCAB`].
pub fn bert_tokenizer_json() -> String {
    let vocab: Map<String, Value> = BERT_VOCAB
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), json!(i)))
        .collect();
    let added_tokens: Vec<Value> = BERT_VOCAB[..5]
        .iter()
        .enumerate()
        .map(|(i, t)| added(i, t))
        .collect();
    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": {"type": "BertPreTokenizer"},
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}},
                {"SpecialToken": {"id": "[SEP]", "type_id": 0}}
            ],
            "pair": [
                {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}},
                {"SpecialToken": {"id": "[SEP]", "type_id": 0}},
                {"Sequence": {"id": "B", "type_id": 1}},
                {"SpecialToken": {"id": "[SEP]", "type_id": 1}}
            ],
            "special_tokens": {
                "[CLS]": {"id": "[CLS]", "ids": [2], "tokens": ["[CLS]"]},
                "[SEP]": {"id": "[SEP]", "ids": [3], "tokens": ["[SEP]"]}
            }
        },
        "decoder": {"type": "WordPiece", "prefix": "##", "cleanup": true},
        "model": {
            "type": "WordPiece",
            "unk_token": "[UNK]",
            "continuing_subword_prefix": "##",
            "max_input_chars_per_word": 100,
            "vocab": vocab
        }
    })
    .to_string()
}

/// Merges of [`roberta_tokenizer_json`], in rank order.
pub const ROBERTA_MERGES: &[(&str, &str)] = &[
    ("h", "e"),
    ("l", "l"),
    ("Ġ", "w"),
    ("he", "ll"),
    ("hell", "o"),
    ("o", "r"),
    ("l", "d"),
    ("Ġw", "or"),
    ("Ġwor", "ld"),
    ("Ġ", "g"),
    ("o", "o"),
    ("Ġg", "oo"),
    ("Ġgoo", "d"),
    ("Ġ", "b"),
    ("Ġb", "a"),
    ("Ġba", "d"),
];

/// A byte-level BPE tokenizer in the RoBERTa layout: `<s>`, `<pad>`,
/// `</s>`, `<unk>`, the 256 byte symbols, then one token per merge.
pub fn roberta_tokenizer_json() -> String {
    let mut tokens: Vec<String> = ["<s>", "<pad>", "</s>", "<unk>"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    tokens.extend((0..=255u8).map(|b| byte_char(b).to_string()));
    tokens.extend(ROBERTA_MERGES.iter().map(|(a, b)| format!("{}{}", a, b)));

    let vocab: Map<String, Value> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| (t.clone(), json!(i)))
        .collect();
    let merges: Vec<String> = ROBERTA_MERGES
        .iter()
        .map(|(a, b)| format!("{} {}", a, b))
        .collect();
    let added_tokens: Vec<Value> = ["<s>", "<pad>", "</s>", "<unk>"]
        .iter()
        .enumerate()
        .map(|(i, t)| added(i, t))
        .collect();

    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": null,
        "pre_tokenizer": {
            "type": "ByteLevel",
            "add_prefix_space": false,
            "trim_offsets": true,
            "use_regex": true
        },
        "post_processor": {
            "type": "RobertaProcessing",
            "sep": ["</s>", 2],
            "cls": ["<s>", 0],
            "trim_offsets": true,
            "add_prefix_space": false
        },
        "decoder": {
            "type": "ByteLevel",
            "add_prefix_space": true,
            "trim_offsets": true,
            "use_regex": true
        },
        "model": {
            "type": "BPE",
            "dropout": null,
            "unk_token": null,
            "continuing_subword_prefix": "",
            "end_of_word_suffix": "",
            "fuse_unk": false,
            "byte_fallback": false,
            "vocab": vocab,
            "merges": merges
        }
    })
    .to_string()
}
