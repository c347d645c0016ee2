use serde::Deserialize;
use serde_json::Value;
use unicode_categories::UnicodeCategories;
use unicode_normalization::char::canonical_combining_class;
use unicode_normalization::UnicodeNormalization;

use crate::config::{component_body, component_type};
use crate::error::{Result, TokenizerError};

/// Byte range `[start, end)` in the original input text.
pub type Span = (usize, usize);

/// Text under normalization. Every character remembers the byte range of the
/// original character it was derived from, so token offsets can be reported
/// against the caller's string.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedText {
    chars: Vec<(char, Span)>,
}

impl NormalizedText {
    /// Wraps `text`, which starts at byte `base` of the original input.
    pub fn from_original(text: &str, base: usize) -> Self {
        let chars = text
            .char_indices()
            .map(|(i, c)| (c, (base + i, base + i + c.len_utf8())))
            .collect();
        NormalizedText { chars }
    }

    pub fn chars(&self) -> &[(char, Span)] {
        &self.chars
    }

    pub fn into_chars(self) -> Vec<(char, Span)> {
        self.chars
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().map(|(c, _)| *c).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    fn map_chars<I, F>(&mut self, mut f: F)
    where
        I: IntoIterator<Item = char>,
        F: FnMut(char) -> I,
    {
        let mut out = Vec::with_capacity(self.chars.len());
        for &(c, span) in &self.chars {
            out.extend(f(c).into_iter().map(|n| (n, span)));
        }
        self.chars = out;
    }

    fn filter<F: Fn(char) -> bool>(&mut self, keep: F) {
        self.chars.retain(|(c, _)| keep(*c));
    }

    /// Composes runs of a starter followed by combining marks. A composed
    /// character covers the span of the whole run.
    fn compose(&mut self, compat: bool) {
        let mut out = Vec::with_capacity(self.chars.len());
        let mut i = 0;
        while i < self.chars.len() {
            let mut j = i + 1;
            while j < self.chars.len() && canonical_combining_class(self.chars[j].0) != 0 {
                j += 1;
            }
            let run: String = self.chars[i..j].iter().map(|(c, _)| *c).collect();
            let span = (self.chars[i].1 .0, self.chars[j - 1].1 .1);
            if compat {
                out.extend(run.nfkc().map(|c| (c, span)));
            } else {
                out.extend(run.nfc().map(|c| (c, span)));
            }
            i = j;
        }
        self.chars = out;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnicodeForm {
    Nfc,
    Nfd,
    Nfkc,
    Nfkd,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalizer {
    Bert {
        clean_text: bool,
        handle_chinese_chars: bool,
        strip_accents: Option<bool>,
        lowercase: bool,
    },
    Lowercase,
    StripAccents,
    Unicode(UnicodeForm),
    Sequence(Vec<Normalizer>),
}

#[derive(Deserialize)]
struct BertNormalizerConfig {
    #[serde(default = "yes")]
    clean_text: bool,
    #[serde(default = "yes")]
    handle_chinese_chars: bool,
    #[serde(default)]
    strip_accents: Option<bool>,
    #[serde(default = "yes")]
    lowercase: bool,
}

fn yes() -> bool {
    true
}

#[derive(Deserialize)]
struct SequenceConfig {
    normalizers: Vec<Value>,
}

impl Normalizer {
    pub fn from_config(value: &Value) -> Result<Self> {
        let kind = component_type(value, "normalizer")?;
        Ok(match kind {
            "BertNormalizer" => {
                let c: BertNormalizerConfig = component_body(value)?;
                Normalizer::Bert {
                    clean_text: c.clean_text,
                    handle_chinese_chars: c.handle_chinese_chars,
                    strip_accents: c.strip_accents,
                    lowercase: c.lowercase,
                }
            }
            "Lowercase" => Normalizer::Lowercase,
            "StripAccents" => Normalizer::StripAccents,
            "NFC" => Normalizer::Unicode(UnicodeForm::Nfc),
            "NFD" => Normalizer::Unicode(UnicodeForm::Nfd),
            "NFKC" => Normalizer::Unicode(UnicodeForm::Nfkc),
            "NFKD" => Normalizer::Unicode(UnicodeForm::Nfkd),
            "Sequence" => {
                let c: SequenceConfig = component_body(value)?;
                Normalizer::Sequence(
                    c.normalizers
                        .iter()
                        .map(Normalizer::from_config)
                        .collect::<Result<_>>()?,
                )
            }
            other => {
                return Err(TokenizerError::UnsupportedComponent {
                    kind: "normalizer",
                    name: other.to_string(),
                })
            }
        })
    }

    pub fn normalize(&self, text: &mut NormalizedText) {
        match self {
            Normalizer::Bert {
                clean_text,
                handle_chinese_chars,
                strip_accents,
                lowercase,
            } => {
                if *clean_text {
                    text.filter(|c| !(c == '\0' || c == '\u{fffd}' || is_control(c)));
                    text.map_chars(|c| Some(if is_whitespace(c) { ' ' } else { c }));
                }
                if *handle_chinese_chars {
                    text.map_chars(|c| {
                        if is_chinese_char(c) {
                            vec![' ', c, ' ']
                        } else {
                            vec![c]
                        }
                    });
                }
                if strip_accents.unwrap_or(*lowercase) {
                    decompose(text, false);
                    text.filter(|c| !c.is_mark_nonspacing());
                }
                if *lowercase {
                    text.map_chars(char::to_lowercase);
                }
            }
            Normalizer::Lowercase => text.map_chars(char::to_lowercase),
            Normalizer::StripAccents => text.filter(|c| !c.is_mark_nonspacing()),
            Normalizer::Unicode(form) => match form {
                UnicodeForm::Nfd => decompose(text, false),
                UnicodeForm::Nfkd => decompose(text, true),
                UnicodeForm::Nfc => text.compose(false),
                UnicodeForm::Nfkc => text.compose(true),
            },
            Normalizer::Sequence(items) => {
                for n in items {
                    n.normalize(text);
                }
            }
        }
    }
}

fn decompose(text: &mut NormalizedText, compat: bool) {
    if compat {
        text.map_chars(|c| std::iter::once(c).nfkd().collect::<Vec<_>>());
    } else {
        text.map_chars(|c| std::iter::once(c).nfd().collect::<Vec<_>>());
    }
}

pub(crate) fn is_whitespace(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || c.is_whitespace()
}

fn is_control(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' => false,
        _ => c.is_other(),
    }
}

fn is_chinese_char(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B920..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}
