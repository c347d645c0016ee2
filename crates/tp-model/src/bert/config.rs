use crate::error::{ModelError, Result};
use crate::gguf::GgufFile;

/// Hyperparameters of a BERT-family encoder, read from GGUF metadata.
#[derive(Debug, Clone)]
pub struct BertConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub head_dim: usize,
    pub intermediate_size: usize,
    pub max_positions: usize,
    /// 0 when the checkpoint has no segment embedding table.
    pub type_vocab_size: usize,
    pub layer_norm_eps: f32,
    /// `bert.classifier.output_labels`, when present.
    pub labels: Option<Vec<String>>,
}

impl BertConfig {
    /// Reads:
    /// - `general.architecture` (must be `bert`)
    /// - `bert.embedding_length`, `bert.block_count`, `bert.attention.head_count`
    /// - `bert.feed_forward_length`, `bert.context_length`
    /// - `bert.attention.layer_norm_epsilon` (default 1e-12)
    /// - `bert.classifier.output_labels` (optional)
    ///
    /// Vocabulary sizes come from the embedding tables' shapes.
    pub fn from_gguf(gguf: &GgufFile) -> Result<BertConfig> {
        let md = &gguf.metadata;
        let arch = md.get_string("general.architecture")?;
        if arch != "bert" {
            return Err(ModelError::UnsupportedArchitecture(arch.to_string()));
        }

        let hidden_size = md.get_usize("bert.embedding_length")?;
        let n_heads = md.get_usize("bert.attention.head_count")?;
        if n_heads == 0 || hidden_size % n_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "embedding length {} is not divisible into {} heads",
                hidden_size, n_heads
            )));
        }

        let vocab_size = leading_dim(gguf, "token_embd.weight")?;
        let type_vocab_size = if gguf.has_tensor("token_types.weight") {
            leading_dim(gguf, "token_types.weight")?
        } else {
            0
        };

        Ok(BertConfig {
            vocab_size,
            hidden_size,
            n_layers: md.get_usize("bert.block_count")?,
            n_heads,
            head_dim: hidden_size / n_heads,
            intermediate_size: md.get_usize("bert.feed_forward_length")?,
            max_positions: md.get_usize("bert.context_length")?,
            type_vocab_size,
            layer_norm_eps: md
                .optional("bert.attention.layer_norm_epsilon", |m, k| m.get_f32(k))?
                .unwrap_or(1e-12),
            labels: md.optional("bert.classifier.output_labels", |m, k| m.get_string_array(k))?,
        })
    }
}

/// Row count of a `[rows, hidden]` table.
fn leading_dim(gguf: &GgufFile, name: &str) -> Result<usize> {
    Ok(gguf
        .tensor_info(name)?
        .row_major_dims()
        .first()
        .copied()
        .unwrap_or(0))
}
