use crate::added::{AddedVocabulary, Segment};
use crate::config::TokenizerJson;
use crate::decoder::Decoder;
use crate::encoding::Encoding;
use crate::error::Result;
use crate::models::Model;
use crate::normalizer::{NormalizedText, Normalizer};
use crate::pre_tokenizer::{Piece, PreTokenizer};
use crate::processor::PostProcessor;
use crate::truncation::{content_budget, TruncationPolicy};

use super::TokenizerEngine;

/// Tokenizer pipeline implemented in this crate:
/// added tokens, normalizer, pre-tokenizer, model, truncation,
/// post-processor.
#[derive(Debug, Clone)]
pub struct InProcessEngine {
    added: AddedVocabulary,
    normalizer: Option<Normalizer>,
    pre_tokenizer: Option<PreTokenizer>,
    model: Model,
    post_processor: Option<PostProcessor>,
    decoder: Option<Decoder>,
}

impl InProcessEngine {
    /// Builds every component of the file, rejecting unknown component types.
    pub fn from_config(config: &TokenizerJson) -> Result<Self> {
        Ok(InProcessEngine {
            added: AddedVocabulary::new(&config.added_tokens),
            normalizer: config
                .normalizer
                .as_ref()
                .map(Normalizer::from_config)
                .transpose()?,
            pre_tokenizer: config
                .pre_tokenizer
                .as_ref()
                .map(PreTokenizer::from_config)
                .transpose()?,
            model: Model::from_config(&config.model)?,
            post_processor: config
                .post_processor
                .as_ref()
                .map(PostProcessor::from_config)
                .transpose()?,
            decoder: config
                .decoder
                .as_ref()
                .map(Decoder::from_config)
                .transpose()?,
        })
    }

    fn encode_content(&self, text: &str) -> Encoding {
        let mut encoding = Encoding::default();
        for segment in self.added.split(text) {
            match segment {
                Segment::Added {
                    id,
                    content,
                    offset,
                } => encoding.push(id, content.to_string(), (offset, offset + content.len()), false),
                Segment::Text { text, offset } => {
                    let mut normalized = NormalizedText::from_original(text, offset);
                    if let Some(n) = &self.normalizer {
                        n.normalize(&mut normalized);
                    }
                    let pieces: Vec<Piece> = match &self.pre_tokenizer {
                        Some(p) => p.pre_tokenize(vec![normalized.into_chars()]),
                        None => vec![normalized.into_chars()],
                    };
                    for piece in pieces.iter().filter(|p| !p.is_empty()) {
                        let word: Vec<char> = piece.iter().map(|(c, _)| *c).collect();
                        for token in self.model.tokenize(&word) {
                            let span = (piece[token.range.start].1 .0, piece[token.range.end - 1].1 .1);
                            encoding.push(token.id, token.value, span, false);
                        }
                    }
                }
            }
        }
        encoding
    }
}

impl TokenizerEngine for InProcessEngine {
    fn encode(
        &self,
        text: &str,
        max_len: Option<usize>,
        policy: TruncationPolicy,
    ) -> Result<Encoding> {
        let mut encoding = self.encode_content(text);
        if let Some(keep) = content_budget(encoding.len(), self.added_special_tokens(), max_len, policy)? {
            encoding.truncate(keep);
        }
        Ok(match &self.post_processor {
            Some(p) => p.process(encoding),
            None => encoding,
        })
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let tokens: Vec<String> = ids
            .iter()
            .filter_map(|&id| {
                self.added
                    .content(id)
                    .or_else(|| self.model.vocab().token(id))
            })
            .filter(|token| !skip_special_tokens || !self.added.is_special(token))
            .map(str::to_string)
            .collect();
        Ok(match &self.decoder {
            Some(d) => d.decode(tokens),
            None => tokens.join(" "),
        })
    }

    fn added_special_tokens(&self) -> usize {
        self.post_processor
            .as_ref()
            .map_or(0, PostProcessor::added_tokens)
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.added
            .id(token)
            .or_else(|| self.model.vocab().get(token))
    }
}
