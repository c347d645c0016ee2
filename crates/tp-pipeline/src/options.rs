//! Typed options for sessions, models and pipelines.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use tp_scoring::{LabelMode, ScoreTransform};
use tp_tokenizer::{TokenizerRuntime, TruncationPolicy};

use crate::batch::Padding;
use crate::error::{PipelineError, Result};

/// Numeric execution engine behind a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// BERT forward pass in this workspace, over GGUF weights.
    #[default]
    Cpu,
    /// ONNX Runtime, over `model.onnx`.
    Ort,
    /// candle, over `model.safetensors`.
    Candle,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Cpu, BackendKind::Ort, BackendKind::Candle];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Ort => "ort",
            BackendKind::Candle => "candle",
        }
    }

    /// Whether this build includes the backend.
    pub fn is_compiled(self) -> bool {
        match self {
            BackendKind::Cpu => true,
            BackendKind::Ort => cfg!(feature = "ort"),
            BackendKind::Candle => cfg!(feature = "candle"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(BackendKind::Cpu),
            "ort" | "onnx" | "onnxruntime" => Ok(BackendKind::Ort),
            "candle" => Ok(BackendKind::Candle),
            other => Err(PipelineError::config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Device an engine executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda {
        #[serde(default)]
        device: usize,
    },
    Metal {
        #[serde(default)]
        device: usize,
    },
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionProvider::Cpu => f.write_str("cpu"),
            ExecutionProvider::Cuda { device } => write!(f, "cuda:{}", device),
            ExecutionProvider::Metal { device } => write!(f, "metal:{}", device),
        }
    }
}

/// Session construction options. Each backend accepts the subset it
/// understands and rejects anything else that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    pub execution_provider: ExecutionProvider,
    pub intra_op_threads: Option<usize>,
    pub inter_op_threads: Option<usize>,
    /// Where compiled or optimized graphs are cached between runs.
    pub cache_dir: Option<PathBuf>,
}

impl SessionOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::config(format!("session options: {}", e)))
    }

    /// Names of the options that are set, for rejection messages.
    pub(crate) fn set_fields(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.execution_provider != ExecutionProvider::Cpu {
            set.push("execution_provider");
        }
        if self.intra_op_threads.is_some() {
            set.push("intra_op_threads");
        }
        if self.inter_op_threads.is_some() {
            set.push("inter_op_threads");
        }
        if self.cache_dir.is_some() {
            set.push("cache_dir");
        }
        set
    }

    /// Fails when any option outside `supported` is set.
    pub(crate) fn reject_unsupported(&self, backend: BackendKind, supported: &[&str]) -> Result<()> {
        let rejected: Vec<&str> = self
            .set_fields()
            .into_iter()
            .filter(|f| !supported.contains(f))
            .collect();
        if rejected.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::config(format!(
                "backend {} does not support session option(s): {}",
                backend,
                rejected.join(", ")
            )))
        }
    }
}

/// Options for loading one model directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelOptions {
    /// Tokenizer engine; the backend's default when unset.
    pub tokenizer: Option<TokenizerRuntime>,
    /// Weights file name inside the model directory, overriding the
    /// backend's default.
    pub weights_file: Option<String>,
}

/// Which pipeline an option list is parsed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineTask {
    FeatureExtraction,
    TextClassification,
}

impl PipelineTask {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineTask::FeatureExtraction => "feature-extraction",
            PipelineTask::TextClassification => "text-classification",
        }
    }
}

/// Pipeline behavior knobs. `None` keeps the pipeline's default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOptions {
    pub normalize_embeddings: Option<bool>,
    pub score_transform: Option<ScoreTransform>,
    pub label_mode: Option<LabelMode>,
    pub padding: Option<Padding>,
    pub truncation: Option<TruncationPolicy>,
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(PipelineError::config(format!("{}: '{}' is not a boolean", key, other))),
    }
}

impl PipelineOptions {
    /// Parses a key/value list for `task`.
    ///
    /// Keys: `normalize-embeddings` (feature extraction), `score-transform`
    /// and `label-mode` (classification), `padding` (`longest` or a fixed
    /// length) and `truncation` (`truncate` or `error`) for both. Unknown
    /// keys, keys for the other task, repeated keys and malformed values
    /// are configuration errors.
    pub fn parse<K: AsRef<str>, V: AsRef<str>>(task: PipelineTask, pairs: &[(K, V)]) -> Result<Self> {
        let mut options = PipelineOptions::default();
        let mut seen: Vec<&str> = Vec::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref().trim(), value.as_ref());
            if seen.contains(&key) {
                return Err(PipelineError::config(format!("option '{}' given twice", key)));
            }
            seen.push(key);

            match key {
                "normalize-embeddings" => {
                    options.normalize_embeddings = Some(parse_bool(key, value)?);
                }
                "score-transform" => {
                    let t = value.parse().map_err(|e| PipelineError::config(format!("{}: {}", key, e)))?;
                    options.score_transform = Some(t);
                }
                "label-mode" => {
                    let m = value.parse().map_err(|e| PipelineError::config(format!("{}: {}", key, e)))?;
                    options.label_mode = Some(m);
                }
                "padding" => options.padding = Some(value.parse()?),
                "truncation" => {
                    options.truncation = Some(match value.trim().to_ascii_lowercase().as_str() {
                        "truncate" => TruncationPolicy::Truncate,
                        "error" => TruncationPolicy::Error,
                        other => {
                            return Err(PipelineError::config(format!(
                                "truncation: '{}' (expected truncate or error)",
                                other
                            )))
                        }
                    });
                }
                other => return Err(PipelineError::config(format!("unknown option '{}'", other))),
            }
        }
        options.check_task(task)?;
        Ok(options)
    }

    /// Rejects fields that only the other task understands.
    pub fn check_task(&self, task: PipelineTask) -> Result<()> {
        let foreign = match task {
            PipelineTask::FeatureExtraction => {
                if self.score_transform.is_some() {
                    Some("score-transform")
                } else if self.label_mode.is_some() {
                    Some("label-mode")
                } else {
                    None
                }
            }
            PipelineTask::TextClassification => self.normalize_embeddings.map(|_| "normalize-embeddings"),
        };
        match foreign {
            Some(key) => Err(PipelineError::config(format!(
                "option '{}' does not apply to {}",
                key,
                task.as_str()
            ))),
            None => Ok(()),
        }
    }
}
