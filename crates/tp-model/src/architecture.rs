use tp_tensor::{ComputeBackend, Tensor};

use crate::error::{ModelError, Result};

/// One padded batch in the layout encoders consume: row-major `[batch, seq_len]`
/// matrices of token ids, attention mask (1 = real token) and optional
/// segment ids.
#[derive(Debug, Clone, Copy)]
pub struct EncoderInput<'a> {
    pub input_ids: &'a [i64],
    pub attention_mask: &'a [i64],
    pub token_type_ids: Option<&'a [i64]>,
    pub batch: usize,
    pub seq_len: usize,
}

impl EncoderInput<'_> {
    /// Checks every matrix against `batch * seq_len`.
    pub fn validate(&self) -> Result<()> {
        let expected = self.batch * self.seq_len;
        if self.batch == 0 || self.seq_len == 0 {
            return Err(ModelError::InvalidInput(format!(
                "empty batch: {} rows of length {}",
                self.batch, self.seq_len
            )));
        }
        let matrices = [
            ("input_ids", Some(self.input_ids)),
            ("attention_mask", Some(self.attention_mask)),
            ("token_type_ids", self.token_type_ids),
        ];
        for (name, data) in matrices {
            if let Some(data) = data {
                if data.len() != expected {
                    return Err(ModelError::InvalidInput(format!(
                        "{} has {} elements, expected {}x{}",
                        name,
                        data.len(),
                        self.batch,
                        self.seq_len
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Encoder outputs. `last_hidden_state` is `[batch, seq_len, hidden]`;
/// `pooled` and `logits` are present when the checkpoint carries a pooler
/// and a classification head.
#[derive(Debug)]
pub struct EncoderOutput {
    pub last_hidden_state: Tensor,
    pub pooled: Option<Tensor>,
    pub logits: Option<Tensor>,
}

/// Trait for encoder-only transformer architectures.
///
/// A forward pass has no state between calls, so one loaded encoder can
/// serve concurrent batches.
pub trait Encoder: Send + Sync + std::fmt::Debug {
    fn forward(&self, input: &EncoderInput<'_>, backend: &dyn ComputeBackend) -> Result<EncoderOutput>;

    fn hidden_size(&self) -> usize;

    /// Longest sequence the position table covers.
    fn max_positions(&self) -> usize;

    /// Class labels stored with the weights, if any.
    fn labels(&self) -> Option<&[String]>;

    /// Number of classification outputs, 0 without a head.
    fn num_labels(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let ids = [1i64, 2, 3, 4];
        let mask = [1i64, 1, 1, 0];
        let input = EncoderInput {
            input_ids: &ids,
            attention_mask: &mask,
            token_type_ids: None,
            batch: 2,
            seq_len: 2,
        };
        assert!(input.validate().is_ok());

        let short = [0i64; 3];
        let bad = EncoderInput {
            token_type_ids: Some(&short),
            ..input
        };
        assert!(matches!(bad.validate(), Err(ModelError::InvalidInput(m)) if m.contains("token_type_ids")));

        let empty = EncoderInput {
            batch: 0,
            ..input
        };
        assert!(empty.validate().is_err());
    }
}
