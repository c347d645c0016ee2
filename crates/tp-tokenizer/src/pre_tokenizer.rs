use std::ops::Range;

use serde::Deserialize;
use serde_json::Value;
use unicode_categories::UnicodeCategories;

use crate::byte_level::byte_char;
use crate::config::{component_body, component_type};
use crate::error::{Result, TokenizerError};
use crate::normalizer::{is_whitespace, Span};

/// A pre-token: normalized characters with their original byte spans.
pub type Piece = Vec<(char, Span)>;

#[derive(Debug, Clone, PartialEq)]
pub enum PreTokenizer {
    /// Whitespace split plus isolated punctuation.
    Bert,
    /// `\w+|[^\w\s]+`.
    Whitespace,
    WhitespaceSplit,
    ByteLevel {
        add_prefix_space: bool,
        use_regex: bool,
    },
    Sequence(Vec<PreTokenizer>),
}

#[derive(Deserialize)]
struct ByteLevelConfig {
    #[serde(default = "yes")]
    add_prefix_space: bool,
    #[serde(default = "yes")]
    use_regex: bool,
}

fn yes() -> bool {
    true
}

#[derive(Deserialize)]
struct SequenceConfig {
    pretokenizers: Vec<Value>,
}

impl PreTokenizer {
    pub fn from_config(value: &Value) -> Result<Self> {
        let kind = component_type(value, "pre-tokenizer")?;
        Ok(match kind {
            "BertPreTokenizer" => PreTokenizer::Bert,
            "Whitespace" => PreTokenizer::Whitespace,
            "WhitespaceSplit" => PreTokenizer::WhitespaceSplit,
            "ByteLevel" => {
                let c: ByteLevelConfig = component_body(value)?;
                PreTokenizer::ByteLevel {
                    add_prefix_space: c.add_prefix_space,
                    use_regex: c.use_regex,
                }
            }
            "Sequence" => {
                let c: SequenceConfig = component_body(value)?;
                PreTokenizer::Sequence(
                    c.pretokenizers
                        .iter()
                        .map(PreTokenizer::from_config)
                        .collect::<Result<_>>()?,
                )
            }
            other => {
                return Err(TokenizerError::UnsupportedComponent {
                    kind: "pre-tokenizer",
                    name: other.to_string(),
                })
            }
        })
    }

    pub fn pre_tokenize(&self, pieces: Vec<Piece>) -> Vec<Piece> {
        if let PreTokenizer::Sequence(items) = self {
            return items
                .iter()
                .fold(pieces, |acc, p| p.pre_tokenize(acc));
        }
        let mut out = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match self {
                PreTokenizer::Bert => split_bert(&piece, &mut out),
                PreTokenizer::Whitespace => split_word_classes(&piece, &mut out),
                PreTokenizer::WhitespaceSplit => split_whitespace(&piece, &mut out),
                PreTokenizer::ByteLevel {
                    add_prefix_space,
                    use_regex,
                } => split_byte_level(piece, *add_prefix_space, *use_regex, &mut out),
                PreTokenizer::Sequence(_) => unreachable!("handled above"),
            }
        }
        out
    }
}

fn flush(current: &mut Piece, out: &mut Vec<Piece>) {
    if !current.is_empty() {
        out.push(std::mem::take(current));
    }
}

fn is_bert_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || c.is_punctuation()
}

fn split_bert(piece: &[(char, Span)], out: &mut Vec<Piece>) {
    let mut current = Vec::new();
    for &(c, span) in piece {
        if is_whitespace(c) {
            flush(&mut current, out);
        } else if is_bert_punctuation(c) {
            flush(&mut current, out);
            out.push(vec![(c, span)]);
        } else {
            current.push((c, span));
        }
    }
    flush(&mut current, out);
}

fn split_whitespace(piece: &[(char, Span)], out: &mut Vec<Piece>) {
    let mut current = Vec::new();
    for &(c, span) in piece {
        if c.is_whitespace() {
            flush(&mut current, out);
        } else {
            current.push((c, span));
        }
    }
    flush(&mut current, out);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WordClass {
    Word,
    Space,
    Other,
}

fn word_class(c: char) -> WordClass {
    if c.is_alphanumeric() || c == '_' || c.is_mark() {
        WordClass::Word
    } else if c.is_whitespace() {
        WordClass::Space
    } else {
        WordClass::Other
    }
}

fn split_word_classes(piece: &[(char, Span)], out: &mut Vec<Piece>) {
    let mut current: Piece = Vec::new();
    let mut class = WordClass::Space;
    for &(c, span) in piece {
        let next = word_class(c);
        if next != class {
            flush(&mut current, out);
            class = next;
        }
        if next != WordClass::Space {
            current.push((c, span));
        }
    }
    flush(&mut current, out);
}

fn split_byte_level(
    mut piece: Piece,
    add_prefix_space: bool,
    use_regex: bool,
    out: &mut Vec<Piece>,
) {
    if piece.is_empty() {
        return;
    }
    if add_prefix_space && piece[0].0 != ' ' {
        let span = piece[0].1;
        piece.insert(0, (' ', span));
    }
    let ranges = if use_regex {
        gpt2_split(&piece)
    } else {
        vec![0..piece.len()]
    };
    for range in ranges {
        let mut mapped = Vec::with_capacity(range.len());
        for &(c, span) in &piece[range] {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                mapped.push((byte_char(b), span));
            }
        }
        out.push(mapped);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Gpt2Class {
    Letter,
    Number,
    Other,
}

fn gpt2_class(c: char) -> Gpt2Class {
    if c.is_letter() {
        Gpt2Class::Letter
    } else if c.is_number() {
        Gpt2Class::Number
    } else {
        Gpt2Class::Other
    }
}

fn contraction_len(rest: &[(char, Span)]) -> Option<usize> {
    let first = rest.first().map(|(c, _)| *c)?;
    let second = rest.get(1).map(|(c, _)| *c);
    match (first, second) {
        ('r', Some('e')) | ('v', Some('e')) | ('l', Some('l')) => Some(2),
        ('s' | 't' | 'm' | 'd', _) => Some(1),
        _ => None,
    }
}

/// Splits a piece the way the GPT-2 pattern does:
/// `'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+`
fn gpt2_split(chars: &[(char, Span)]) -> Vec<Range<usize>> {
    let n = chars.len();
    let mut out = Vec::new();
    let mut i = 0;
    while i < n {
        let c = chars[i].0;
        if c == '\'' {
            if let Some(len) = contraction_len(&chars[i + 1..]) {
                out.push(i..i + 1 + len);
                i += 1 + len;
                continue;
            }
        }

        let first = if c == ' ' && i + 1 < n && !chars[i + 1].0.is_whitespace() {
            i + 1
        } else {
            i
        };
        let fc = chars[first].0;
        if !fc.is_whitespace() {
            let class = gpt2_class(fc);
            let mut j = first + 1;
            while j < n && !chars[j].0.is_whitespace() && gpt2_class(chars[j].0) == class {
                j += 1;
            }
            out.push(i..j);
            i = j;
            continue;
        }

        let mut j = i;
        while j < n && chars[j].0.is_whitespace() {
            j += 1;
        }
        // A whitespace run followed by a word leaves its last char to prefix the word.
        if j < n && j - i > 1 {
            j -= 1;
        }
        out.push(i..j);
        i = j;
    }
    out
}
