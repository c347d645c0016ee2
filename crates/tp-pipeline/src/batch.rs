//! Padded, masked tensor batches built from tokenized text.

use std::str::FromStr;

use tp_tokenizer::{Encoding, Tokenizer, TruncationPolicy};

use crate::engine::EngineInputs;
use crate::error::{PipelineError, Result, Stage};

/// How rows are padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// To the longest encoded row.
    #[default]
    Longest,
    /// To exactly this many positions; also the encode limit.
    Fixed(usize),
}

impl FromStr for Padding {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("longest") {
            return Ok(Padding::Longest);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Padding::Fixed(n)),
            _ => Err(PipelineError::config(format!(
                "padding: '{}' (expected longest or a positive length)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOptions {
    pub padding: Padding,
    /// Model capacity; rows never exceed it.
    pub max_length: Option<usize>,
    pub truncation: TruncationPolicy,
    /// Emit the segment id matrix.
    pub with_type_ids: bool,
}

/// Row-major `[batch_size, seq_len]` matrices for one call. Row `i` is
/// input `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineBatch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Option<Vec<i64>>,
    /// Byte spans into each input string, one per unpadded token.
    pub offsets: Vec<Vec<(usize, usize)>>,
    pub special_tokens_mask: Vec<Vec<u32>>,
    /// Unpadded token count per row.
    pub lengths: Vec<usize>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl PipelineBatch {
    /// Tokenizes `inputs` and pads them into one batch.
    ///
    /// Pad positions get the tokenizer's pad id, mask 0 and type id 0.
    pub fn build<S: AsRef<str>>(tokenizer: &Tokenizer, inputs: &[S], options: &BatchOptions) -> Result<Self> {
        if inputs.is_empty() {
            return Err(PipelineError::inference(Stage::BuildBatch, "no inputs"));
        }
        let fixed = match options.padding {
            Padding::Fixed(l) => {
                if let Some(max) = options.max_length.filter(|&max| l > max) {
                    return Err(PipelineError::inference(
                        Stage::BuildBatch,
                        format!("fixed length {} exceeds model capacity {}", l, max),
                    ));
                }
                Some(l)
            }
            Padding::Longest => None,
        };
        let limit = match (fixed, options.max_length) {
            (Some(l), Some(max)) => Some(l.min(max)),
            (l, max) => l.or(max),
        };

        let encodings = tokenizer
            .encode_batch(inputs, limit, options.truncation)
            .map_err(|e| PipelineError::tokenization(Stage::Encode, e))?;
        Self::from_encodings(&encodings, tokenizer.pad_id(), fixed, options.with_type_ids)
    }

    /// Pads already-encoded rows to `fixed` or to the longest row.
    pub fn from_encodings(
        encodings: &[Encoding],
        pad_id: u32,
        fixed: Option<usize>,
        with_type_ids: bool,
    ) -> Result<Self> {
        let longest = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        let seq_len = fixed.unwrap_or(longest);
        if seq_len == 0 {
            return Err(PipelineError::inference(Stage::BuildBatch, "every input encoded to zero tokens"));
        }
        if longest > seq_len {
            return Err(PipelineError::inference(
                Stage::BuildBatch,
                format!("encoded row of {} tokens does not fit {} positions", longest, seq_len),
            ));
        }

        let n = encodings.len();
        let mut input_ids = vec![pad_id as i64; n * seq_len];
        let mut attention_mask = vec![0i64; n * seq_len];
        let mut token_type_ids = with_type_ids.then(|| vec![0i64; n * seq_len]);
        for (row, enc) in encodings.iter().enumerate() {
            let base = row * seq_len;
            for (t, &id) in enc.ids.iter().enumerate() {
                input_ids[base + t] = id as i64;
                attention_mask[base + t] = 1;
            }
            if let Some(types) = token_type_ids.as_mut() {
                for (t, &ty) in enc.type_ids.iter().enumerate() {
                    types[base + t] = ty as i64;
                }
            }
        }

        Ok(PipelineBatch {
            input_ids,
            attention_mask,
            token_type_ids,
            offsets: encodings.iter().map(|e| e.offsets.clone()).collect(),
            special_tokens_mask: encodings.iter().map(|e| e.special_tokens_mask.clone()).collect(),
            lengths: encodings.iter().map(Encoding::len).collect(),
            batch_size: n,
            seq_len,
        })
    }

    /// Mask sum of row `i`.
    pub fn mask_sum(&self, i: usize) -> i64 {
        self.attention_mask[i * self.seq_len..(i + 1) * self.seq_len].iter().sum()
    }

    pub fn row_ids(&self, i: usize) -> &[i64] {
        &self.input_ids[i * self.seq_len..(i + 1) * self.seq_len]
    }

    /// Copies the matrices into engine inputs.
    pub fn engine_inputs(&self) -> EngineInputs {
        EngineInputs {
            input_ids: self.input_ids.clone(),
            attention_mask: self.attention_mask.clone(),
            token_type_ids: self.token_type_ids.clone(),
            batch: self.batch_size,
            seq_len: self.seq_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tp_tokenizer::testing::{bert_tokenizer_json, BERT_VOCAB};
    use tp_tokenizer::{TokenizerError, TokenizerRuntime};

    fn tokenizer() -> Tokenizer {
        Tokenizer::from_bytes(TokenizerRuntime::InProcess, bert_tokenizer_json().as_bytes()).unwrap()
    }

    fn id(token: &str) -> i64 {
        BERT_VOCAB.iter().position(|t| *t == token).unwrap() as i64
    }

    #[test]
    fn test_fixed_length_batch() {
        let tok = tokenizer();
        let options = BatchOptions {
            padding: Padding::Fixed(4),
            ..Default::default()
        };
        let batch = PipelineBatch::build(&tok, &["good", "bad"], &options).unwrap();
        assert_eq!(batch.batch_size, 2);
        assert_eq!(batch.seq_len, 4);
        assert_eq!(batch.input_ids.len(), 8);
        assert_eq!(batch.row_ids(0), &[id("[CLS]"), id("good"), id("[SEP]"), 0]);
        assert_eq!(batch.row_ids(1), &[id("[CLS]"), id("bad"), id("[SEP]"), 0]);
        // mask sum = token count of "bad" with its specials
        let bad = tok.encode("bad", None, TruncationPolicy::Truncate).unwrap();
        assert_eq!(batch.mask_sum(1), bad.len() as i64);
        assert_eq!(batch.attention_mask, vec![1, 1, 1, 0, 1, 1, 1, 0]);
        assert!(batch.token_type_ids.is_none());
    }

    #[test]
    fn test_longest_padding_and_mask_sums() {
        let tok = tokenizer();
        let inputs = ["hello", "the movie was great", "a film"];
        let options = BatchOptions {
            with_type_ids: true,
            ..Default::default()
        };
        let batch = PipelineBatch::build(&tok, &inputs, &options).unwrap();
        assert_eq!(batch.seq_len, 6);
        assert_eq!(batch.lengths, vec![3, 6, 4]);
        for (i, &len) in batch.lengths.iter().enumerate() {
            assert_eq!(batch.mask_sum(i), len as i64);
        }
        assert_eq!(batch.token_type_ids.as_ref().unwrap(), &vec![0i64; 18]);
        assert_eq!(batch.offsets[2], vec![(0, 0), (0, 1), (2, 6), (0, 0)]);
        assert_eq!(batch.special_tokens_mask[0], vec![1, 0, 1]);
    }

    #[test]
    fn test_row_order_preserved() {
        let tok = tokenizer();
        let inputs = ["bad", "good", "awful", "great"];
        let batch = PipelineBatch::build(&tok, &inputs, &BatchOptions::default()).unwrap();
        for (i, word) in inputs.iter().enumerate() {
            assert_eq!(batch.row_ids(i)[1], id(word));
        }
    }

    #[test]
    fn test_capacity_truncates_by_default() {
        let tok = tokenizer();
        let options = BatchOptions {
            max_length: Some(4),
            ..Default::default()
        };
        let batch = PipelineBatch::build(&tok, &["the movie was great"], &options).unwrap();
        assert_eq!(batch.seq_len, 4);
        assert_eq!(batch.row_ids(0), &[id("[CLS]"), id("the"), id("movie"), id("[SEP]")]);
    }

    #[test]
    fn test_capacity_error_policy() {
        let tok = tokenizer();
        let options = BatchOptions {
            max_length: Some(4),
            truncation: TruncationPolicy::Error,
            ..Default::default()
        };
        let err = PipelineBatch::build(&tok, &["the movie was great"], &options).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Tokenization {
                stage: Stage::Encode,
                source: TokenizerError::SequenceTooLong { len: 6, max: 4 }
            }
        ));
    }

    #[test]
    fn test_fixed_length_over_capacity() {
        let tok = tokenizer();
        let options = BatchOptions {
            padding: Padding::Fixed(32),
            max_length: Some(16),
            ..Default::default()
        };
        let err = PipelineBatch::build(&tok, &["good"], &options).unwrap_err();
        assert_eq!(err.stage(), Stage::BuildBatch);
    }

    #[test]
    fn test_empty_input() {
        let tok = tokenizer();
        let err = PipelineBatch::build::<&str>(&tok, &[], &BatchOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Inference { stage: Stage::BuildBatch, .. }));
    }

    #[test]
    fn test_padding_parse() {
        assert_eq!("longest".parse::<Padding>().unwrap(), Padding::Longest);
        assert_eq!("12".parse::<Padding>().unwrap(), Padding::Fixed(12));
        assert!("-1".parse::<Padding>().is_err());
        assert!("0".parse::<Padding>().is_err());
    }
}
