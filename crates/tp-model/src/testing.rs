//! Tiny deterministic BERT checkpoints for tests.
//!
//! Each token embedding is a one-hot "topic" plus a small token-specific
//! offset, attention averages the unmasked tokens and the feed-forward path
//! is zero. Mean-pooled outputs therefore track which topics a sentence
//! mentions, and padded positions stay invisible when masking works.

use std::path::Path;

use crate::error::Result;
use crate::gguf::GgufWriter;

pub const HIDDEN: usize = 8;
pub const HEADS: usize = 2;
pub const FF: usize = 16;
pub const CONTEXT: usize = 16;

pub const POSITIVE: &[&str] = &["good", "great", "love"];
pub const NEGATIVE: &[&str] = &["bad", "terrible", "awful", "hate"];
pub const SUBJECT: &[&str] = &["movie", "film"];

/// Labels of the fixture classifier, in output order.
pub const LABELS: [&str; 2] = ["negative", "positive"];

fn topic(id: usize, token: &str) -> usize {
    if POSITIVE.contains(&token) {
        0
    } else if NEGATIVE.contains(&token) {
        1
    } else if SUBJECT.contains(&token) {
        2
    } else {
        3 + id % 5
    }
}

/// Embedding row for token `id`.
pub fn token_embedding(id: usize, token: &str) -> [f32; HIDDEN] {
    let mut v = [0.0f32; HIDDEN];
    if token == "[PAD]" || token == "<pad>" {
        // Large enough to flip any score it leaks into.
        v[1] = 4.0;
        v[0] = -2.0;
        return v;
    }
    v[topic(id, token)] = 1.0;
    v[(id * 3) % HIDDEN] += 0.25;
    v
}

fn identity(n: usize) -> Vec<f32> {
    let mut m = vec![0.0f32; n * n];
    for i in 0..n {
        m[i * n + i] = 1.0;
    }
    m
}

/// Builds the fixture encoder over `vocab` (token strings in id order).
/// With `classifier`, adds an identity pooler and a two-way head scoring
/// the negative and positive topics.
pub fn bert_fixture(vocab: &[&str], classifier: bool) -> GgufWriter {
    let h = HIDDEN;
    let mut w = GgufWriter::new();
    w.add_string("general.architecture", "bert");
    w.add_string("general.name", "fixture-bert");
    w.add_u32("bert.embedding_length", h as u32);
    w.add_u32("bert.block_count", 1);
    w.add_u32("bert.attention.head_count", HEADS as u32);
    w.add_u32("bert.feed_forward_length", FF as u32);
    w.add_u32("bert.context_length", CONTEXT as u32);
    w.add_f32("bert.attention.layer_norm_epsilon", 1e-12);

    let embd: Vec<f32> = vocab
        .iter()
        .enumerate()
        .flat_map(|(id, token)| token_embedding(id, token))
        .collect();
    w.add_tensor_f32("token_embd.weight", &[vocab.len(), h], &embd);
    w.add_tensor_f32("position_embd.weight", &[CONTEXT, h], &vec![0.0; CONTEXT * h]);
    w.add_tensor_f32("token_types.weight", &[2, h], &vec![0.0; 2 * h]);
    w.add_tensor_f32("token_embd_norm.weight", &[h], &[1.0; HIDDEN]);
    w.add_tensor_f32("token_embd_norm.bias", &[h], &[0.0; HIDDEN]);

    let zeros_hh = vec![0.0f32; h * h];
    let eye = identity(h);
    for (name, weight) in [
        ("attn_q", &zeros_hh),
        ("attn_k", &zeros_hh),
        ("attn_v", &eye),
        ("attn_output", &eye),
    ] {
        w.add_tensor_f32(&format!("blk.0.{}.weight", name), &[h, h], weight);
        w.add_tensor_f32(&format!("blk.0.{}.bias", name), &[h], &[0.0; HIDDEN]);
    }
    for norm in ["attn_output_norm", "layer_output_norm"] {
        w.add_tensor_f32(&format!("blk.0.{}.weight", norm), &[h], &[1.0; HIDDEN]);
        w.add_tensor_f32(&format!("blk.0.{}.bias", norm), &[h], &[0.0; HIDDEN]);
    }
    w.add_tensor_f32("blk.0.ffn_up.weight", &[FF, h], &vec![0.0; FF * h]);
    w.add_tensor_f32("blk.0.ffn_up.bias", &[FF], &[0.0; FF]);
    w.add_tensor_f32("blk.0.ffn_down.weight", &[h, FF], &vec![0.0; FF * h]);
    w.add_tensor_f32("blk.0.ffn_down.bias", &[h], &[0.0; HIDDEN]);

    if classifier {
        w.add_string_array("bert.classifier.output_labels", &LABELS);
        w.add_tensor_f32("cls.weight", &[h, h], &eye);
        w.add_tensor_f32("cls.bias", &[h], &[0.0; HIDDEN]);
        let mut head = vec![0.0f32; 2 * h];
        head[1] = 1.0; // negative <- topic 1
        head[h] = 1.0; // positive <- topic 0
        w.add_tensor_f32("cls.output.weight", &[2, h], &head);
        w.add_tensor_f32("cls.output.bias", &[2], &[0.0, 0.0]);
    }
    w
}

pub fn write_bert_fixture(path: &Path, vocab: &[&str], classifier: bool) -> Result<()> {
    bert_fixture(vocab, classifier).write(path)
}
