//! Serde view of a `tokenizer.json` file.
//!
//! Pipeline components (normalizer, pre-tokenizer, post-processor, decoder)
//! are kept as raw JSON values and interpreted by their own modules, so an
//! unsupported `type` is reported by name instead of as a generic parse error.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, TokenizerError};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenizerJson {
    #[serde(default)]
    pub added_tokens: Vec<AddedTokenConfig>,
    #[serde(default)]
    pub normalizer: Option<Value>,
    #[serde(default)]
    pub pre_tokenizer: Option<Value>,
    #[serde(default)]
    pub post_processor: Option<Value>,
    #[serde(default)]
    pub decoder: Option<Value>,
    pub model: Value,
    #[serde(default)]
    pub padding: Option<PaddingConfig>,
}

impl TokenizerJson {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Pad id from the `padding` block, else the id of a conventional pad
    /// token, else 0.
    pub fn pad_id(&self) -> u32 {
        if let Some(padding) = &self.padding {
            return padding.pad_id;
        }
        for name in ["[PAD]", "<pad>"] {
            if let Some(tok) = self.added_tokens.iter().find(|t| t.content == name) {
                return tok.id;
            }
            if let Some(id) = self
                .model
                .get("vocab")
                .and_then(|v| v.get(name))
                .and_then(Value::as_u64)
            {
                return id as u32;
            }
        }
        0
    }
}

/// An entry of the `added_tokens` list.
#[derive(Debug, Clone, Deserialize)]
pub struct AddedTokenConfig {
    pub id: u32,
    pub content: String,
    #[serde(default)]
    pub special: bool,
    #[serde(default)]
    pub normalized: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaddingConfig {
    #[serde(default)]
    pub pad_id: u32,
    #[serde(default)]
    pub pad_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordPieceConfig {
    pub vocab: HashMap<String, u32>,
    #[serde(default = "default_wordpiece_unk")]
    pub unk_token: String,
    #[serde(default = "default_wordpiece_prefix")]
    pub continuing_subword_prefix: String,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars_per_word: usize,
}

fn default_wordpiece_unk() -> String {
    "[UNK]".to_string()
}

fn default_wordpiece_prefix() -> String {
    "##".to_string()
}

fn default_max_input_chars() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct BpeConfig {
    pub vocab: HashMap<String, u32>,
    #[serde(default)]
    pub merges: Vec<MergeEntry>,
    #[serde(default)]
    pub unk_token: Option<String>,
    #[serde(default)]
    pub continuing_subword_prefix: Option<String>,
    #[serde(default)]
    pub end_of_word_suffix: Option<String>,
    #[serde(default)]
    pub fuse_unk: bool,
    #[serde(default)]
    pub byte_fallback: bool,
    #[serde(default)]
    pub ignore_merges: bool,
    #[serde(default)]
    pub dropout: Option<f32>,
}

/// A merge rule, serialized either as `"a b"` or as `["a", "b"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MergeEntry {
    Joined(String),
    Pair(String, String),
}

impl MergeEntry {
    pub fn pair(&self) -> Result<(String, String)> {
        match self {
            MergeEntry::Pair(a, b) => Ok((a.clone(), b.clone())),
            MergeEntry::Joined(s) => {
                let parts: Vec<&str> = s.splitn(2, ' ').collect();
                if parts.len() != 2 {
                    return Err(TokenizerError::Malformed(format!(
                        "invalid merge entry: {:?}",
                        s
                    )));
                }
                Ok((parts[0].to_string(), parts[1].to_string()))
            }
        }
    }
}

/// Reads the `type` tag of a component object.
pub(crate) fn component_type<'a>(value: &'a Value, kind: &'static str) -> Result<&'a str> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| TokenizerError::Malformed(format!("{} without a \"type\" field", kind)))
}

/// Deserializes a component body after its tag was matched.
pub(crate) fn component_body<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(T::deserialize(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_entry_forms() {
        let merges: Vec<MergeEntry> = serde_json::from_str(r#"["a b", ["c", "d"]]"#).unwrap();
        assert_eq!(merges[0].pair().unwrap(), ("a".into(), "b".into()));
        assert_eq!(merges[1].pair().unwrap(), ("c".into(), "d".into()));
        assert!(MergeEntry::Joined("ab".into()).pair().is_err());
    }

    #[test]
    fn test_pad_id_resolution() {
        let explicit: TokenizerJson = serde_json::from_str(
            r#"{"model": {"vocab": {"[PAD]": 3}}, "padding": {"pad_id": 7}}"#,
        )
        .unwrap();
        assert_eq!(explicit.pad_id(), 7);

        let from_vocab: TokenizerJson =
            serde_json::from_str(r#"{"model": {"vocab": {"a": 0, "<pad>": 1}}}"#).unwrap();
        assert_eq!(from_vocab.pad_id(), 1);

        let none: TokenizerJson = serde_json::from_str(r#"{"model": {"vocab": {}}}"#).unwrap();
        assert_eq!(none.pad_id(), 0);
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            TokenizerJson::from_bytes(b"{not json"),
            Err(TokenizerError::Malformed(_))
        ));
        assert!(matches!(
            TokenizerJson::from_bytes(b"{}"),
            Err(TokenizerError::Malformed(_))
        ));
    }
}
