use std::collections::{HashMap, HashSet};

use crate::config::AddedTokenConfig;

/// Tokens declared in `added_tokens`. They are matched on the raw input
/// before normalization and bypass the subword model.
#[derive(Debug, Clone, Default)]
pub struct AddedVocabulary {
    /// (content, id), longest content first.
    patterns: Vec<(String, u32)>,
    id_to_content: HashMap<u32, String>,
    special: HashSet<String>,
}

/// A slice of the input: plain text to be tokenized, or an added token.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    Text { text: &'a str, offset: usize },
    Added { id: u32, content: &'a str, offset: usize },
}

impl AddedVocabulary {
    pub fn new(tokens: &[AddedTokenConfig]) -> Self {
        let mut patterns: Vec<(String, u32)> = tokens
            .iter()
            .filter(|t| !t.content.is_empty())
            .map(|t| (t.content.clone(), t.id))
            .collect();
        patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        AddedVocabulary {
            patterns,
            id_to_content: tokens.iter().map(|t| (t.id, t.content.clone())).collect(),
            special: tokens
                .iter()
                .filter(|t| t.special)
                .map(|t| t.content.clone())
                .collect(),
        }
    }

    pub fn content(&self, id: u32) -> Option<&str> {
        self.id_to_content.get(&id).map(String::as_str)
    }

    pub fn id(&self, content: &str) -> Option<u32> {
        self.patterns
            .iter()
            .find(|(c, _)| c == content)
            .map(|(_, id)| *id)
    }

    pub fn is_special(&self, token: &str) -> bool {
        self.special.contains(token)
    }

    /// Splits `text` around added tokens, leftmost match first and the
    /// longest token at a given position.
    pub fn split<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        let mut text_start = 0;
        let mut pos = 0;
        while pos < text.len() {
            let matched = self
                .patterns
                .iter()
                .find(|(content, _)| text[pos..].starts_with(content.as_str()));
            match matched {
                Some((content, id)) => {
                    if text_start < pos {
                        segments.push(Segment::Text {
                            text: &text[text_start..pos],
                            offset: text_start,
                        });
                    }
                    let end = pos + content.len();
                    segments.push(Segment::Added {
                        id: *id,
                        content: &text[pos..end],
                        offset: pos,
                    });
                    pos = end;
                    text_start = end;
                }
                None => {
                    pos += text[pos..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }
        if text_start < text.len() {
            segments.push(Segment::Text {
                text: &text[text_start..],
                offset: text_start,
            });
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> AddedVocabulary {
        let tok = |id, content: &str, special| AddedTokenConfig {
            id,
            content: content.to_string(),
            special,
            normalized: false,
        };
        AddedVocabulary::new(&[tok(0, "<s>", true), tok(1, "<s>x", false), tok(2, "é!", false)])
    }

    #[test]
    fn test_split_longest_leftmost() {
        let segs = vocab().split("a<s>xb<s>");
        assert_eq!(
            segs,
            vec![
                Segment::Text { text: "a", offset: 0 },
                Segment::Added { id: 1, content: "<s>x", offset: 1 },
                Segment::Text { text: "b", offset: 5 },
                Segment::Added { id: 0, content: "<s>", offset: 6 },
            ]
        );
    }

    #[test]
    fn test_split_multibyte() {
        let segs = vocab().split("ééé!");
        assert_eq!(
            segs,
            vec![
                Segment::Text { text: "éé", offset: 0 },
                Segment::Added { id: 2, content: "é!", offset: 4 },
            ]
        );
    }

    #[test]
    fn test_special_lookup() {
        let v = vocab();
        assert!(v.is_special("<s>"));
        assert!(!v.is_special("<s>x"));
        assert_eq!(v.content(2), Some("é!"));
    }
}
