use tp_tensor::ComputeBackend;

use super::config::BertConfig;
use crate::error::{ModelError, Result};
use crate::gguf::GgufFile;

/// Loads a tensor and checks its row-major shape.
fn load(gguf: &GgufFile, name: &str, shape: &[usize]) -> Result<Vec<f32>> {
    let tensor = gguf.get_tensor_f32(name)?;
    if tensor.shape().dims() != shape {
        return Err(ModelError::TensorShape {
            name: name.to_string(),
            expected: shape.to_vec(),
            got: tensor.shape().dims().to_vec(),
        });
    }
    Ok(tensor.into_f32_vec()?)
}

/// A dense layer `y = x W + b`.
///
/// GGUF stores the weight as `[out, in]`; it is transposed at load so the
/// forward pass is a plain `[rows, in] x [in, out]` product.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Vec<f32>,
    bias: Vec<f32>,
    in_dim: usize,
    out_dim: usize,
}

impl Linear {
    pub fn load(gguf: &GgufFile, prefix: &str, in_dim: usize, out_dim: usize) -> Result<Linear> {
        let w = load(gguf, &format!("{}.weight", prefix), &[out_dim, in_dim])?;
        let bias = load(gguf, &format!("{}.bias", prefix), &[out_dim])?;
        let mut weight = vec![0.0f32; in_dim * out_dim];
        for o in 0..out_dim {
            for i in 0..in_dim {
                weight[i * out_dim + o] = w[o * in_dim + i];
            }
        }
        Ok(Linear {
            weight,
            bias,
            in_dim,
            out_dim,
        })
    }

    /// Output width, discovering it from the stored weight when unknown.
    pub fn load_any(gguf: &GgufFile, prefix: &str, in_dim: usize) -> Result<Linear> {
        let info = gguf.tensor_info(&format!("{}.weight", prefix))?;
        let out_dim = info.row_major_dims().first().copied().unwrap_or(0);
        Self::load(gguf, prefix, in_dim, out_dim)
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn forward(&self, x: &[f32], rows: usize, backend: &dyn ComputeBackend) -> Result<Vec<f32>> {
        let y = backend.matmul(x, &self.weight, rows, self.in_dim, self.out_dim)?;
        Ok(backend.add_bias(&y, &self.bias)?)
    }
}

#[derive(Debug, Clone)]
pub struct LayerNorm {
    weight: Vec<f32>,
    bias: Vec<f32>,
    eps: f32,
}

impl LayerNorm {
    pub fn load(gguf: &GgufFile, prefix: &str, hidden: usize, eps: f32) -> Result<LayerNorm> {
        Ok(LayerNorm {
            weight: load(gguf, &format!("{}.weight", prefix), &[hidden])?,
            bias: load(gguf, &format!("{}.bias", prefix), &[hidden])?,
            eps,
        })
    }

    pub fn forward(&self, x: &[f32], backend: &dyn ComputeBackend) -> Result<Vec<f32>> {
        Ok(backend.layer_norm(x, &self.weight, &self.bias, self.eps, self.weight.len())?)
    }
}

/// Weights of one encoder block.
#[derive(Debug, Clone)]
pub struct BertLayer {
    pub query: Linear,
    pub key: Linear,
    pub value: Linear,
    pub attn_output: Linear,
    pub attn_norm: LayerNorm,
    pub ffn_up: Linear,
    pub ffn_down: Linear,
    pub output_norm: LayerNorm,
}

/// All weights of a BERT encoder, dequantized to f32.
///
/// GGUF tensor names:
/// - `token_embd.weight`, `position_embd.weight`, `token_types.weight` (optional)
/// - `token_embd_norm.{weight,bias}`
/// - `blk.{i}.attn_{q,k,v}.{weight,bias}`, `blk.{i}.attn_output.{weight,bias}`
/// - `blk.{i}.attn_output_norm.{weight,bias}`
/// - `blk.{i}.ffn_up.{weight,bias}`, `blk.{i}.ffn_down.{weight,bias}`
/// - `blk.{i}.layer_output_norm.{weight,bias}`
/// - `cls.{weight,bias}` pooler and `cls.output.{weight,bias}` classifier (optional)
#[derive(Debug, Clone)]
pub struct BertWeights {
    pub token_embd: Vec<f32>,
    pub position_embd: Vec<f32>,
    pub token_types: Option<Vec<f32>>,
    pub embd_norm: LayerNorm,
    pub layers: Vec<BertLayer>,
    pub pooler: Option<Linear>,
    pub classifier: Option<Linear>,
}

impl BertWeights {
    pub fn from_gguf(gguf: &GgufFile, config: &BertConfig) -> Result<BertWeights> {
        let h = config.hidden_size;
        let eps = config.layer_norm_eps;

        let token_types = if config.type_vocab_size > 0 {
            Some(load(gguf, "token_types.weight", &[config.type_vocab_size, h])?)
        } else {
            None
        };

        let mut layers = Vec::with_capacity(config.n_layers);
        for i in 0..config.n_layers {
            let blk = |name: &str| format!("blk.{}.{}", i, name);
            layers.push(BertLayer {
                query: Linear::load(gguf, &blk("attn_q"), h, h)?,
                key: Linear::load(gguf, &blk("attn_k"), h, h)?,
                value: Linear::load(gguf, &blk("attn_v"), h, h)?,
                attn_output: Linear::load(gguf, &blk("attn_output"), h, h)?,
                attn_norm: LayerNorm::load(gguf, &blk("attn_output_norm"), h, eps)?,
                ffn_up: Linear::load(gguf, &blk("ffn_up"), h, config.intermediate_size)?,
                ffn_down: Linear::load(gguf, &blk("ffn_down"), config.intermediate_size, h)?,
                output_norm: LayerNorm::load(gguf, &blk("layer_output_norm"), h, eps)?,
            });
        }

        let pooler = if gguf.has_tensor("cls.weight") {
            Some(Linear::load(gguf, "cls", h, h)?)
        } else {
            None
        };
        let classifier = if gguf.has_tensor("cls.output.weight") {
            Some(Linear::load_any(gguf, "cls.output", h)?)
        } else {
            None
        };

        Ok(BertWeights {
            token_embd: load(gguf, "token_embd.weight", &[config.vocab_size, h])?,
            position_embd: load(gguf, "position_embd.weight", &[config.max_positions, h])?,
            token_types,
            embd_norm: LayerNorm::load(gguf, "token_embd_norm", h, eps)?,
            layers,
            pooler,
            classifier,
        })
    }
}
