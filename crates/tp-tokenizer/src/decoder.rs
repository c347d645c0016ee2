use serde::Deserialize;
use serde_json::Value;

use crate::byte_level::char_byte;
use crate::config::{component_body, component_type};
use crate::error::{Result, TokenizerError};

/// Turns token strings back into text.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoder {
    WordPiece { prefix: String, cleanup: bool },
    ByteLevel,
    /// Replaces the end-of-word suffix with a space.
    Bpe { suffix: String },
}

#[derive(Deserialize)]
struct WordPieceConfig {
    #[serde(default = "default_prefix")]
    prefix: String,
    #[serde(default = "yes")]
    cleanup: bool,
}

#[derive(Deserialize)]
struct BpeConfig {
    #[serde(default = "default_suffix")]
    suffix: String,
}

fn default_prefix() -> String {
    "##".to_string()
}

fn default_suffix() -> String {
    "</w>".to_string()
}

fn yes() -> bool {
    true
}

impl Decoder {
    pub fn from_config(value: &Value) -> Result<Self> {
        let kind = component_type(value, "decoder")?;
        Ok(match kind {
            "WordPiece" => {
                let c: WordPieceConfig = component_body(value)?;
                Decoder::WordPiece {
                    prefix: c.prefix,
                    cleanup: c.cleanup,
                }
            }
            "ByteLevel" => Decoder::ByteLevel,
            "BPEDecoder" => {
                let c: BpeConfig = component_body(value)?;
                Decoder::Bpe { suffix: c.suffix }
            }
            other => {
                return Err(TokenizerError::UnsupportedComponent {
                    kind: "decoder",
                    name: other.to_string(),
                })
            }
        })
    }

    pub fn decode(&self, tokens: Vec<String>) -> String {
        match self {
            Decoder::WordPiece { prefix, cleanup } => tokens
                .into_iter()
                .enumerate()
                .map(|(i, token)| {
                    let token = if i == 0 {
                        token
                    } else if token.starts_with(prefix.as_str()) {
                        token.replacen(prefix.as_str(), "", 1)
                    } else {
                        format!(" {}", token)
                    };
                    if *cleanup {
                        cleanup_spacing(&token)
                    } else {
                        token
                    }
                })
                .collect(),
            Decoder::ByteLevel => {
                let mut bytes = Vec::new();
                for token in &tokens {
                    let mapped: Option<Vec<u8>> = token.chars().map(char_byte).collect();
                    match mapped {
                        Some(b) => bytes.extend(b),
                        None => bytes.extend_from_slice(token.as_bytes()),
                    }
                }
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Decoder::Bpe { suffix } => {
                let last = tokens.len().saturating_sub(1);
                tokens
                    .into_iter()
                    .enumerate()
                    .map(|(i, token)| token.replace(suffix.as_str(), if i == last { "" } else { " " }))
                    .collect()
            }
        }
    }
}

/// Removes the spaces the WordPiece decoder leaves before punctuation and
/// English contractions.
fn cleanup_spacing(text: &str) -> String {
    text.replace(" .", ".")
        .replace(" ?", "?")
        .replace(" !", "!")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" do not", " don't")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wordpiece() {
        let d = Decoder::from_config(&serde_json::json!({"type": "WordPiece"})).unwrap();
        assert_eq!(d.decode(toks(&["hello", "##s", ",", "world", "!"])), "hellos, world!");
    }

    #[test]
    fn test_byte_level() {
        let d = Decoder::ByteLevel;
        assert_eq!(d.decode(toks(&["Hello", "Ġwor", "ld"])), "Hello world");
        assert_eq!(d.decode(toks(&["Ã©"])), "é");
    }

    #[test]
    fn test_bpe_suffix() {
        let d = Decoder::Bpe {
            suffix: "</w>".into(),
        };
        assert_eq!(d.decode(toks(&["hel", "lo</w>", "there</w>"])), "hello there");
    }

    #[test]
    fn test_unsupported() {
        assert!(Decoder::from_config(&serde_json::json!({"type": "Metaspace"})).is_err());
    }
}
