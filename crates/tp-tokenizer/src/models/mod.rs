pub mod bpe;
pub mod vocab;
pub mod wordpiece;

use std::ops::Range;

use serde_json::Value;

use crate::config::{component_body, BpeConfig, WordPieceConfig};
use crate::error::{Result, TokenizerError};

pub use bpe::Bpe;
pub use vocab::Vocab;
pub use wordpiece::WordPiece;

/// A token produced by a subword model for one pre-token.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelToken {
    pub id: u32,
    pub value: String,
    /// Char range within the pre-token.
    pub range: Range<usize>,
}

#[derive(Debug, Clone)]
pub enum Model {
    WordPiece(WordPiece),
    Bpe(Bpe),
}

impl Model {
    /// Builds the model section. Files written by older library versions
    /// omit `type`; those are told apart by the presence of `merges`.
    pub fn from_config(value: &Value) -> Result<Self> {
        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind,
            None if value.get("merges").is_some() => "BPE",
            None => "WordPiece",
        };
        match kind {
            "WordPiece" => {
                let config: WordPieceConfig = component_body(value)?;
                Ok(Model::WordPiece(WordPiece::from_config(config)?))
            }
            "BPE" => {
                let config: BpeConfig = component_body(value)?;
                Ok(Model::Bpe(Bpe::from_config(config)?))
            }
            other => Err(TokenizerError::UnsupportedComponent {
                kind: "model",
                name: other.to_string(),
            }),
        }
    }

    pub fn tokenize(&self, word: &[char]) -> Vec<ModelToken> {
        match self {
            Model::WordPiece(m) => m.tokenize(word),
            Model::Bpe(m) => m.tokenize(word),
        }
    }

    pub fn vocab(&self) -> &Vocab {
        match self {
            Model::WordPiece(m) => &m.vocab,
            Model::Bpe(m) => &m.vocab,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_inference() {
        let wp = Model::from_config(&serde_json::json!({
            "vocab": {"[UNK]": 0, "a": 1}
        }))
        .unwrap();
        assert!(matches!(wp, Model::WordPiece(_)));

        let bpe = Model::from_config(&serde_json::json!({
            "vocab": {"a": 0}, "merges": []
        }))
        .unwrap();
        assert!(matches!(bpe, Model::Bpe(_)));

        let err = Model::from_config(&serde_json::json!({"type": "Unigram", "vocab": []}))
            .unwrap_err();
        assert!(matches!(err, TokenizerError::UnsupportedComponent { .. }));
    }
}
