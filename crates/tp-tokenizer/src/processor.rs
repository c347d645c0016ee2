use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::byte_level::space_char;
use crate::config::{component_body, component_type};
use crate::encoding::Encoding;
use crate::error::{Result, TokenizerError};

/// Adds boundary special tokens to a (possibly truncated) content encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum PostProcessor {
    /// `[CLS] A [SEP]`.
    Bert {
        cls: (String, u32),
        sep: (String, u32),
    },
    /// `<s> A </s>`, after optional offset trimming.
    Roberta {
        cls: (String, u32),
        sep: (String, u32),
        trim_offsets: bool,
        add_prefix_space: bool,
    },
    /// Single-sequence template.
    Template(Vec<TemplateItem>),
    /// Offset trimming only.
    ByteLevel {
        trim_offsets: bool,
        add_prefix_space: bool,
    },
    Sequence(Vec<PostProcessor>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateItem {
    Sequence { type_id: u32 },
    Special { ids: Vec<u32>, tokens: Vec<String>, type_id: u32 },
}

#[derive(Deserialize)]
struct BertConfig {
    sep: (String, u32),
    cls: (String, u32),
}

#[derive(Deserialize)]
struct RobertaConfig {
    sep: (String, u32),
    cls: (String, u32),
    #[serde(default = "yes")]
    trim_offsets: bool,
    #[serde(default = "yes")]
    add_prefix_space: bool,
}

#[derive(Deserialize)]
struct ByteLevelConfig {
    #[serde(default = "yes")]
    trim_offsets: bool,
    #[serde(default = "yes")]
    add_prefix_space: bool,
}

fn yes() -> bool {
    true
}

#[derive(Deserialize)]
enum Piece {
    Sequence { id: String, type_id: u32 },
    SpecialToken { id: String, type_id: u32 },
}

#[derive(Deserialize)]
struct SpecialTokenConfig {
    ids: Vec<u32>,
    tokens: Vec<String>,
}

#[derive(Deserialize)]
struct TemplateConfig {
    single: Vec<Piece>,
    #[serde(default)]
    special_tokens: HashMap<String, SpecialTokenConfig>,
}

#[derive(Deserialize)]
struct SequenceConfig {
    processors: Vec<Value>,
}

impl PostProcessor {
    pub fn from_config(value: &Value) -> Result<Self> {
        let kind = component_type(value, "post-processor")?;
        Ok(match kind {
            "BertProcessing" => {
                let c: BertConfig = component_body(value)?;
                PostProcessor::Bert {
                    cls: c.cls,
                    sep: c.sep,
                }
            }
            "RobertaProcessing" => {
                let c: RobertaConfig = component_body(value)?;
                PostProcessor::Roberta {
                    cls: c.cls,
                    sep: c.sep,
                    trim_offsets: c.trim_offsets,
                    add_prefix_space: c.add_prefix_space,
                }
            }
            "TemplateProcessing" => {
                let c: TemplateConfig = component_body(value)?;
                let mut items = Vec::with_capacity(c.single.len());
                for piece in c.single {
                    items.push(match piece {
                        Piece::Sequence { id, type_id } => {
                            if id != "A" {
                                return Err(TokenizerError::UnsupportedComponent {
                                    kind: "template sequence",
                                    name: id,
                                });
                            }
                            TemplateItem::Sequence { type_id }
                        }
                        Piece::SpecialToken { id, type_id } => {
                            let special = c.special_tokens.get(&id).ok_or_else(|| {
                                TokenizerError::Malformed(format!(
                                    "template uses undefined special token {:?}",
                                    id
                                ))
                            })?;
                            if special.ids.len() != special.tokens.len() {
                                return Err(TokenizerError::Malformed(format!(
                                    "special token {:?} has {} ids but {} tokens",
                                    id,
                                    special.ids.len(),
                                    special.tokens.len()
                                )));
                            }
                            TemplateItem::Special {
                                ids: special.ids.clone(),
                                tokens: special.tokens.clone(),
                                type_id,
                            }
                        }
                    });
                }
                PostProcessor::Template(items)
            }
            "ByteLevel" => {
                let c: ByteLevelConfig = component_body(value)?;
                PostProcessor::ByteLevel {
                    trim_offsets: c.trim_offsets,
                    add_prefix_space: c.add_prefix_space,
                }
            }
            "Sequence" => {
                let c: SequenceConfig = component_body(value)?;
                PostProcessor::Sequence(
                    c.processors
                        .iter()
                        .map(PostProcessor::from_config)
                        .collect::<Result<_>>()?,
                )
            }
            other => {
                return Err(TokenizerError::UnsupportedComponent {
                    kind: "special-token scheme",
                    name: other.to_string(),
                })
            }
        })
    }

    /// Number of special tokens added around a single sequence.
    pub fn added_tokens(&self) -> usize {
        match self {
            PostProcessor::Bert { .. } | PostProcessor::Roberta { .. } => 2,
            PostProcessor::Template(items) => items
                .iter()
                .map(|item| match item {
                    TemplateItem::Special { ids, .. } => ids.len(),
                    TemplateItem::Sequence { .. } => 0,
                })
                .sum(),
            PostProcessor::ByteLevel { .. } => 0,
            PostProcessor::Sequence(items) => items.iter().map(PostProcessor::added_tokens).sum(),
        }
    }

    pub fn process(&self, encoding: Encoding) -> Encoding {
        match self {
            PostProcessor::Bert { cls, sep } => wrap(cls, encoding, sep),
            PostProcessor::Roberta {
                cls,
                sep,
                trim_offsets,
                add_prefix_space,
            } => {
                let mut encoding = encoding;
                if *trim_offsets {
                    trim_offsets_in(&mut encoding, *add_prefix_space);
                }
                wrap(cls, encoding, sep)
            }
            PostProcessor::Template(items) => {
                let mut out = Encoding::default();
                let mut content = Some(encoding);
                for item in items {
                    match item {
                        TemplateItem::Sequence { type_id } => {
                            if let Some(mut c) = content.take() {
                                c.set_type_id(*type_id);
                                out.extend(c);
                            }
                        }
                        TemplateItem::Special {
                            ids,
                            tokens,
                            type_id,
                        } => {
                            for (id, token) in ids.iter().zip(tokens) {
                                out.push(*id, token.clone(), (0, 0), true);
                                if let Some(t) = out.type_ids.last_mut() {
                                    *t = *type_id;
                                }
                            }
                        }
                    }
                }
                out
            }
            PostProcessor::ByteLevel {
                trim_offsets,
                add_prefix_space,
            } => {
                let mut encoding = encoding;
                if *trim_offsets {
                    trim_offsets_in(&mut encoding, *add_prefix_space);
                }
                encoding
            }
            PostProcessor::Sequence(items) => items
                .iter()
                .fold(encoding, |enc, processor| processor.process(enc)),
        }
    }
}

fn wrap(cls: &(String, u32), content: Encoding, sep: &(String, u32)) -> Encoding {
    let mut out = Encoding::default();
    out.push(cls.1, cls.0.clone(), (0, 0), true);
    out.extend(content);
    out.push(sep.1, sep.0.clone(), (0, 0), true);
    out
}

/// Shrinks token offsets so they exclude the leading and trailing spaces a
/// byte-level token carries. A single leading space added as prefix space
/// is kept on the first token.
fn trim_offsets_in(encoding: &mut Encoding, add_prefix_space: bool) {
    let space = space_char();
    let is_space = |c: &char| *c == space || c.is_whitespace();
    for (i, (token, offsets)) in encoding
        .tokens
        .iter()
        .zip(encoding.offsets.iter_mut())
        .enumerate()
    {
        let mut leading = token.chars().take_while(is_space).count();
        let trailing = token.chars().rev().take_while(is_space).count();
        if leading > 0 {
            let is_first = i == 0 || offsets.0 == 0;
            if is_first && add_prefix_space && leading == 1 {
                leading = 0;
            }
            offsets.0 = (offsets.0 + leading).min(offsets.1);
        }
        if trailing > 0 && offsets.1 >= trailing {
            offsets.1 = (offsets.1 - trailing).max(offsets.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> Encoding {
        let mut e = Encoding::default();
        e.push(10, "hello".into(), (0, 5), false);
        e.push(11, "Ġworld".into(), (5, 11), false);
        e
    }

    #[test]
    fn test_bert_processing() {
        let p = PostProcessor::from_config(&serde_json::json!({
            "type": "BertProcessing", "sep": ["[SEP]", 102], "cls": ["[CLS]", 101]
        }))
        .unwrap();
        assert_eq!(p.added_tokens(), 2);
        let e = p.process(content());
        assert_eq!(e.ids, vec![101, 10, 11, 102]);
        assert_eq!(e.special_tokens_mask, vec![1, 0, 0, 1]);
        assert_eq!(e.offsets[0], (0, 0));
    }

    #[test]
    fn test_roberta_trims_offsets() {
        let p = PostProcessor::from_config(&serde_json::json!({
            "type": "RobertaProcessing", "sep": ["</s>", 2], "cls": ["<s>", 0],
            "trim_offsets": true, "add_prefix_space": false
        }))
        .unwrap();
        let e = p.process(content());
        assert_eq!(e.ids, vec![0, 10, 11, 2]);
        assert_eq!(e.offsets[2], (6, 11));
    }

    #[test]
    fn test_template_processing() {
        let p = PostProcessor::from_config(&serde_json::json!({
            "type": "TemplateProcessing",
            "single": [
                {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 1}},
                {"SpecialToken": {"id": "[SEP]", "type_id": 1}}
            ],
            "pair": [],
            "special_tokens": {
                "[CLS]": {"id": "[CLS]", "ids": [101], "tokens": ["[CLS]"]},
                "[SEP]": {"id": "[SEP]", "ids": [102], "tokens": ["[SEP]"]}
            }
        }))
        .unwrap();
        assert_eq!(p.added_tokens(), 2);
        let e = p.process(content());
        assert_eq!(e.ids, vec![101, 10, 11, 102]);
        assert_eq!(e.type_ids, vec![0, 1, 1, 1]);
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = PostProcessor::from_config(&serde_json::json!({"type": "Custom"})).unwrap_err();
        assert!(matches!(
            err,
            TokenizerError::UnsupportedComponent { kind: "special-token scheme", .. }
        ));
    }
}
