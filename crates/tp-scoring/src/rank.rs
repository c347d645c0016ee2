use std::cmp::Ordering;
use std::str::FromStr;

use serde::Deserialize;

use crate::chain::{LabelScore, ScoreStage};
use crate::error::ScoringError;

/// Orders scores from highest to lowest. Ties keep class-index order and
/// NaN sorts last.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortDescending;

impl ScoreStage for SortDescending {
    fn name(&self) -> &str {
        "sort_descending"
    }

    fn apply(&self, scores: &mut Vec<LabelScore>) {
        scores.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
            (false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
            (a_nan, b_nan) => a_nan.cmp(&b_nan),
        });
    }
}

/// Keeps the first `k` entries. Expects sorted input.
#[derive(Debug, Clone, Copy)]
pub struct TopK {
    k: usize,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl ScoreStage for TopK {
    fn name(&self) -> &str {
        "top_k"
    }

    fn apply(&self, scores: &mut Vec<LabelScore>) {
        scores.truncate(self.k);
    }
}

/// Whether a classifier reports only its best class or every class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelMode {
    #[default]
    Single,
    Multi,
}

impl FromStr for LabelMode {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "single-label" => Ok(LabelMode::Single),
            "multi" | "multi-label" => Ok(LabelMode::Multi),
            other => Err(ScoringError::InvalidValue(format!(
                "label mode '{}' (expected single or multi)",
                other
            ))),
        }
    }
}
