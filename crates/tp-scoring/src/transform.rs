use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::chain::{LabelScore, ScoreStage};
use crate::error::ScoringError;

/// Maps raw classifier outputs to scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreTransform {
    /// Raw logits, unchanged.
    None,
    /// Normalized over the row; scores sum to 1.
    #[default]
    Softmax,
    /// Independent per class; each score in [0, 1].
    Sigmoid,
}

impl ScoreTransform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreTransform::None => "none",
            ScoreTransform::Softmax => "softmax",
            ScoreTransform::Sigmoid => "sigmoid",
        }
    }

    /// Transforms one row in place.
    pub fn apply_row(&self, row: &mut [f32]) {
        match self {
            ScoreTransform::None => {}
            ScoreTransform::Softmax => softmax(row),
            ScoreTransform::Sigmoid => row.iter_mut().for_each(|v| *v = sigmoid(*v)),
        }
    }
}

fn softmax(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        row.iter_mut().for_each(|v| *v /= sum);
    }
}

/// Logistic function, evaluated so that large negative inputs do not
/// overflow `exp`.
fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl ScoreStage for ScoreTransform {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn apply(&self, scores: &mut Vec<LabelScore>) {
        let mut row: Vec<f32> = scores.iter().map(|s| s.score).collect();
        self.apply_row(&mut row);
        for (s, v) in scores.iter_mut().zip(row) {
            s.score = v;
        }
    }
}

impl fmt::Display for ScoreTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreTransform {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "identity" => Ok(ScoreTransform::None),
            "softmax" => Ok(ScoreTransform::Softmax),
            "sigmoid" => Ok(ScoreTransform::Sigmoid),
            other => Err(ScoringError::InvalidValue(format!(
                "score transform '{}' (expected none, softmax or sigmoid)",
                other
            ))),
        }
    }
}
