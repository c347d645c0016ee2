//! Model metadata from the Hugging Face `config.json` next to the weights.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ModelError, Result};

/// How classification logits are meant to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    #[default]
    SingleLabelClassification,
    MultiLabelClassification,
    Regression,
}

/// The subset of `config.json` the pipelines read. Unknown fields are
/// ignored since these files carry many training-only settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub architectures: Vec<String>,
    /// Keys are class indices written as strings (`"0"`, `"1"`, ...).
    #[serde(default)]
    pub id2label: BTreeMap<String, String>,
    #[serde(default)]
    pub max_position_embeddings: Option<usize>,
    #[serde(default)]
    pub hidden_size: Option<usize>,
    #[serde(default)]
    pub problem_type: Option<ProblemType>,
}

impl ModelMetadata {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Labels ordered by class index. `None` when `id2label` is absent.
    /// Indices must be exactly `0..n`.
    pub fn labels(&self) -> Result<Option<Vec<String>>> {
        if self.id2label.is_empty() {
            return Ok(None);
        }
        let mut indexed = self
            .id2label
            .iter()
            .map(|(k, v)| {
                k.trim()
                    .parse::<usize>()
                    .map(|i| (i, v.clone()))
                    .map_err(|_| ModelError::InvalidConfig(format!("id2label key '{}' is not an index", k)))
            })
            .collect::<Result<Vec<_>>>()?;
        indexed.sort_by_key(|(i, _)| *i);
        for (expected, (i, _)) in indexed.iter().enumerate() {
            if *i != expected {
                return Err(ModelError::InvalidConfig(format!(
                    "id2label has no entry for class {}",
                    expected
                )));
            }
        }
        Ok(Some(indexed.into_iter().map(|(_, v)| v).collect()))
    }

    pub fn is_multi_label(&self) -> bool {
        self.problem_type == Some(ProblemType::MultiLabelClassification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classifier_config() {
        let json = br#"{
            "architectures": ["BertForSequenceClassification"],
            "model_type": "bert",
            "hidden_size": 768,
            "max_position_embeddings": 512,
            "id2label": {"0": "NEGATIVE", "1": "POSITIVE"},
            "label2id": {"NEGATIVE": 0, "POSITIVE": 1},
            "torch_dtype": "float32"
        }"#;
        let md = ModelMetadata::from_bytes(json).unwrap();
        assert_eq!(md.model_type.as_deref(), Some("bert"));
        assert_eq!(md.max_position_embeddings, Some(512));
        assert_eq!(md.labels().unwrap().unwrap(), vec!["NEGATIVE", "POSITIVE"]);
        assert!(!md.is_multi_label());
    }

    #[test]
    fn test_labels_sorted_numerically() {
        let mut md = ModelMetadata::default();
        for i in 0..12 {
            md.id2label.insert(i.to_string(), format!("L{}", i));
        }
        let labels = md.labels().unwrap().unwrap();
        assert_eq!(labels[2], "L2");
        assert_eq!(labels[10], "L10");
    }

    #[test]
    fn test_label_gaps_rejected() {
        let md = ModelMetadata::from_bytes(br#"{"id2label": {"0": "a", "2": "c"}}"#).unwrap();
        assert!(matches!(md.labels(), Err(ModelError::InvalidConfig(_))));
        let md = ModelMetadata::from_bytes(br#"{"id2label": {"x": "a"}}"#).unwrap();
        assert!(md.labels().is_err());
    }

    #[test]
    fn test_problem_type() {
        let md =
            ModelMetadata::from_bytes(br#"{"problem_type": "multi_label_classification"}"#).unwrap();
        assert!(md.is_multi_label());
        assert_eq!(ModelMetadata::default().labels().unwrap(), None);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ModelMetadata::from_bytes(b"{not json"),
            Err(ModelError::InvalidConfig(_))
        ));
    }
}
