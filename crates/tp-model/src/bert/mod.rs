pub mod config;
pub mod weights;

pub use config::BertConfig;
pub use weights::{BertLayer, BertWeights, LayerNorm, Linear};

use tracing::debug;

use tp_tensor::{ComputeBackend, Tensor};

use crate::architecture::{Encoder, EncoderInput, EncoderOutput};
use crate::error::{ModelError, Result};
use crate::gguf::GgufFile;

/// Additive attention bias for padded key positions.
const MASKED: f32 = -1e9;

/// A BERT-family encoder loaded from a GGUF file.
#[derive(Debug, Clone)]
pub struct BertModel {
    pub config: BertConfig,
    pub weights: BertWeights,
}

impl BertModel {
    pub fn from_gguf(gguf: &GgufFile) -> Result<BertModel> {
        let config = BertConfig::from_gguf(gguf)?;
        let weights = BertWeights::from_gguf(gguf, &config)?;
        debug!(
            hidden = config.hidden_size,
            layers = config.n_layers,
            heads = config.n_heads,
            max_positions = config.max_positions,
            classifier = weights.classifier.as_ref().map(Linear::out_dim),
            "loaded BERT encoder"
        );
        if let (Some(labels), Some(head)) = (&config.labels, &weights.classifier) {
            if labels.len() != head.out_dim() {
                return Err(ModelError::InvalidConfig(format!(
                    "{} classifier labels for {} outputs",
                    labels.len(),
                    head.out_dim()
                )));
            }
        }
        Ok(BertModel { config, weights })
    }

    /// Sum of word, position and segment embeddings, then layer norm.
    fn embed(&self, input: &EncoderInput<'_>, backend: &dyn ComputeBackend) -> Result<Vec<f32>> {
        let h = self.config.hidden_size;
        let mut x = Vec::with_capacity(input.batch * input.seq_len * h);
        for (idx, &id) in input.input_ids.iter().enumerate() {
            let pos = idx % input.seq_len;
            let word = table_row(&self.weights.token_embd, id, self.config.vocab_size, h, "token id")?;
            let position = &self.weights.position_embd[pos * h..(pos + 1) * h];
            let segment = match (&self.weights.token_types, input.token_type_ids) {
                (Some(table), Some(types)) => {
                    Some(table_row(table, types[idx], self.config.type_vocab_size, h, "token type id")?)
                }
                // Checkpoints with a segment table still expect segment 0.
                (Some(table), None) => Some(&table[..h]),
                (None, _) => None,
            };
            for i in 0..h {
                x.push(word[i] + position[i] + segment.map_or(0.0, |s| s[i]));
            }
        }
        self.weights.embd_norm.forward(&x, backend)
    }

    /// Multi-head self-attention for one block, returning the merged
    /// context vectors before the output projection.
    fn attention(
        &self,
        layer: &BertLayer,
        x: &[f32],
        input: &EncoderInput<'_>,
        backend: &dyn ComputeBackend,
    ) -> Result<Vec<f32>> {
        let cfg = &self.config;
        let (h, d, l) = (cfg.hidden_size, cfg.head_dim, input.seq_len);
        let rows = input.batch * l;
        let q = backend.scale(&layer.query.forward(x, rows, backend)?, 1.0 / (d as f32).sqrt())?;
        let k = layer.key.forward(x, rows, backend)?;
        let v = layer.value.forward(x, rows, backend)?;

        let mut context = vec![0.0f32; rows * h];
        let mut qh = vec![0.0f32; l * d];
        let mut kt = vec![0.0f32; d * l];
        let mut vh = vec![0.0f32; l * d];
        for b in 0..input.batch {
            let mask = &input.attention_mask[b * l..(b + 1) * l];
            for head in 0..cfg.n_heads {
                for t in 0..l {
                    let src = (b * l + t) * h + head * d;
                    qh[t * d..(t + 1) * d].copy_from_slice(&q[src..src + d]);
                    vh[t * d..(t + 1) * d].copy_from_slice(&v[src..src + d]);
                    for j in 0..d {
                        kt[j * l + t] = k[src + j];
                    }
                }
                let mut scores = backend.matmul(&qh, &kt, l, d, l)?;
                for row in scores.chunks_exact_mut(l) {
                    for (s, &m) in row.iter_mut().zip(mask) {
                        if m == 0 {
                            *s += MASKED;
                        }
                    }
                }
                let probs = backend.softmax(&scores, l)?;
                let ctx = backend.matmul(&probs, &vh, l, l, d)?;
                for t in 0..l {
                    let dst = (b * l + t) * h + head * d;
                    context[dst..dst + d].copy_from_slice(&ctx[t * d..(t + 1) * d]);
                }
            }
        }
        Ok(context)
    }

    fn block(
        &self,
        layer: &BertLayer,
        x: Vec<f32>,
        input: &EncoderInput<'_>,
        backend: &dyn ComputeBackend,
    ) -> Result<Vec<f32>> {
        let rows = input.batch * input.seq_len;
        let context = self.attention(layer, &x, input, backend)?;
        let attn = layer.attn_output.forward(&context, rows, backend)?;
        let x = layer.attn_norm.forward(&backend.add(&x, &attn)?, backend)?;

        let up = backend.gelu(&layer.ffn_up.forward(&x, rows, backend)?)?;
        let down = layer.ffn_down.forward(&up, rows, backend)?;
        layer.output_norm.forward(&backend.add(&x, &down)?, backend)
    }
}

/// Row `id` of an embedding table with `rows` entries.
fn table_row<'t>(table: &'t [f32], id: i64, rows: usize, h: usize, what: &str) -> Result<&'t [f32]> {
    let idx = usize::try_from(id)
        .ok()
        .filter(|&i| i < rows)
        .ok_or_else(|| ModelError::InvalidInput(format!("{} {} outside 0..{}", what, id, rows)))?;
    Ok(&table[idx * h..(idx + 1) * h])
}

impl Encoder for BertModel {
    /// Embeddings, the encoder blocks, then the optional pooler (tanh over
    /// the first token) and classification head. Without a pooler the head
    /// reads the first token's hidden state directly.
    fn forward(&self, input: &EncoderInput<'_>, backend: &dyn ComputeBackend) -> Result<EncoderOutput> {
        input.validate()?;
        let cfg = &self.config;
        if input.seq_len > cfg.max_positions {
            return Err(ModelError::InvalidInput(format!(
                "sequence length {} exceeds {} positions",
                input.seq_len, cfg.max_positions
            )));
        }
        let h = cfg.hidden_size;

        let mut x = self.embed(input, backend)?;
        for layer in &self.weights.layers {
            x = self.block(layer, x, input, backend)?;
        }

        let first_tokens: Vec<f32> = x
            .chunks_exact(input.seq_len * h)
            .flat_map(|row| row[..h].iter().copied())
            .collect();
        let pooled = match &self.weights.pooler {
            Some(pooler) => Some(backend.tanh(&pooler.forward(&first_tokens, input.batch, backend)?)?),
            None => None,
        };
        let logits = match &self.weights.classifier {
            Some(head) => {
                let features = pooled.as_deref().unwrap_or(first_tokens.as_slice());
                let logits = head.forward(features, input.batch, backend)?;
                Some(Tensor::from_f32(logits, vec![input.batch, head.out_dim()])?)
            }
            None => None,
        };
        let pooled = pooled
            .map(|p| Tensor::from_f32(p, vec![input.batch, h]))
            .transpose()?;

        Ok(EncoderOutput {
            last_hidden_state: Tensor::from_f32(x, vec![input.batch, input.seq_len, h])?,
            pooled,
            logits,
        })
    }

    fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn max_positions(&self) -> usize {
        self.config.max_positions
    }

    fn labels(&self) -> Option<&[String]> {
        self.config.labels.as_deref()
    }

    fn num_labels(&self) -> usize {
        self.weights.classifier.as_ref().map_or(0, Linear::out_dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bert_fixture, LABELS};
    use approx::assert_abs_diff_eq;
    use tp_tensor::CpuBackend;

    const VOCAB: &[&str] = &["[PAD]", "[UNK]", "[CLS]", "[SEP]", "good", "bad", "movie"];

    fn load(classifier: bool) -> (tempfile::TempDir, BertModel) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        bert_fixture(VOCAB, classifier).write(&path).unwrap();
        let model = BertModel::from_gguf(&GgufFile::open(&path).unwrap()).unwrap();
        (dir, model)
    }

    fn run(model: &BertModel, ids: &[i64], mask: &[i64], batch: usize) -> EncoderOutput {
        let input = EncoderInput {
            input_ids: ids,
            attention_mask: mask,
            token_type_ids: None,
            batch,
            seq_len: ids.len() / batch,
        };
        model.forward(&input, &CpuBackend::new()).unwrap()
    }

    #[test]
    fn test_config_from_metadata() {
        let (_dir, model) = load(true);
        assert_eq!(model.config.vocab_size, VOCAB.len());
        assert_eq!(model.config.hidden_size, 8);
        assert_eq!(model.config.head_dim, 4);
        assert_eq!(model.config.type_vocab_size, 2);
        assert_eq!(model.max_positions(), 16);
        assert_eq!(model.labels().unwrap(), &LABELS.map(String::from));
        assert_eq!(model.num_labels(), 2);
    }

    #[test]
    fn test_output_shapes() {
        let (_dir, model) = load(true);
        let out = run(&model, &[2, 4, 3, 2, 5, 3], &[1; 6], 2);
        assert_eq!(out.last_hidden_state.shape().dims(), &[2, 3, 8]);
        assert_eq!(out.pooled.unwrap().shape().dims(), &[2, 8]);
        assert_eq!(out.logits.unwrap().shape().dims(), &[2, 2]);
    }

    #[test]
    fn test_padding_is_masked() {
        let (_dir, model) = load(false);
        let plain = run(&model, &[2, 4, 6, 3], &[1, 1, 1, 1], 1);
        let padded = run(&model, &[2, 4, 6, 3, 0, 0], &[1, 1, 1, 1, 0, 0], 1);
        let a = plain.last_hidden_state.as_f32().unwrap();
        let b = padded.last_hidden_state.as_f32().unwrap();
        for (x, y) in a.iter().zip(&b[..a.len()]) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_rows_are_independent() {
        let (_dir, model) = load(true);
        let single = run(&model, &[2, 5, 3], &[1, 1, 1], 1);
        let batched = run(&model, &[2, 4, 3, 2, 5, 3], &[1; 6], 2);
        let single = single.logits.unwrap();
        let batched = batched.logits.unwrap();
        for (x, y) in single.as_f32().unwrap().iter().zip(batched.row_f32(1).unwrap()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_classifier_separates_topics() {
        let (_dir, model) = load(true);
        let out = run(&model, &[2, 4, 6, 3, 2, 5, 6, 3], &[1; 8], 2);
        let logits = out.logits.unwrap();
        let good = logits.row_f32(0).unwrap();
        let bad = logits.row_f32(1).unwrap();
        // [negative, positive]
        assert!(good[1] > good[0]);
        assert!(bad[0] > bad[1]);
    }

    #[test]
    fn test_no_head_without_classifier() {
        let (_dir, model) = load(false);
        let out = run(&model, &[2, 4, 3], &[1, 1, 1], 1);
        assert!(out.pooled.is_none());
        assert!(out.logits.is_none());
        assert_eq!(model.num_labels(), 0);
        assert!(model.labels().is_none());
    }

    #[test]
    fn test_invalid_inputs() {
        let (_dir, model) = load(false);
        let backend = CpuBackend::new();
        let ids = [2i64, 99, 3];
        let mask = [1i64; 3];
        let input = EncoderInput {
            input_ids: &ids,
            attention_mask: &mask,
            token_type_ids: None,
            batch: 1,
            seq_len: 3,
        };
        assert!(matches!(model.forward(&input, &backend), Err(ModelError::InvalidInput(_))));

        let types = [0i64, 2, 0];
        let ids = [2i64, 4, 3];
        let input = EncoderInput {
            input_ids: &ids,
            token_type_ids: Some(&types),
            ..input
        };
        assert!(matches!(model.forward(&input, &backend), Err(ModelError::InvalidInput(_))));

        let long = vec![4i64; 17];
        let long_mask = vec![1i64; 17];
        let input = EncoderInput {
            input_ids: &long,
            attention_mask: &long_mask,
            token_type_ids: None,
            batch: 1,
            seq_len: 17,
        };
        assert!(matches!(model.forward(&input, &backend), Err(ModelError::InvalidInput(m)) if m.contains("positions")));
    }

    #[test]
    fn test_label_count_must_match_head() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        let mut w = bert_fixture(VOCAB, true);
        w.add_string_array("bert.classifier.output_labels", &["a", "b", "c"]);
        w.write(&path).unwrap();
        assert!(matches!(
            BertModel::from_gguf(&GgufFile::open(&path).unwrap()),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_encoder_rejects_other_architectures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        let mut w = crate::gguf::GgufWriter::new();
        w.add_string("general.architecture", "llama");
        w.write(&path).unwrap();
        assert!(matches!(
            crate::load_encoder(&path),
            Err(ModelError::UnsupportedArchitecture(a)) if a == "llama"
        ));
    }

    #[test]
    fn test_missing_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        let mut w = crate::gguf::GgufWriter::new();
        w.add_string("general.architecture", "bert");
        w.add_u32("bert.embedding_length", 8);
        w.add_u32("bert.attention.head_count", 2);
        w.add_u32("bert.block_count", 1);
        w.add_u32("bert.feed_forward_length", 16);
        w.add_u32("bert.context_length", 16);
        w.add_tensor_f32("token_embd.weight", &[2, 8], &[0.0; 16]);
        w.write(&path).unwrap();
        assert!(matches!(
            BertModel::from_gguf(&GgufFile::open(&path).unwrap()),
            Err(ModelError::TensorNotFound(_))
        ));
    }
}
