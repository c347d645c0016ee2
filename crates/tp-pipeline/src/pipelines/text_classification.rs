use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use tp_scoring::{LabelMode, ScoreChain, ScoreTransform, SortDescending, TopK};

use super::{postprocess_err, take_output, PipelineCore};
use crate::engine::LOGITS;
use crate::error::{PipelineError, Result, Stage};
use crate::model::Model;
use crate::options::{ModelOptions, PipelineOptions, PipelineTask};
use crate::session::Session;
use crate::statistics::PipelineStatistics;

#[derive(Debug, Clone, Default)]
pub struct TextClassificationConfig {
    pub model_path: PathBuf,
    /// Unique within the session.
    pub name: String,
    /// Output holding `[N, C]` logits; `logits` when unset.
    pub output_name: Option<String>,
    pub options: PipelineOptions,
    pub model_options: ModelOptions,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationOutput {
    pub label: String,
    pub score: f32,
}

/// Text to scored labels.
///
/// Multi-label models (`problem_type` of `multi_label_classification`)
/// default to sigmoid scores for every label, everything else to the
/// softmax winner.
#[derive(Debug)]
pub struct TextClassificationPipeline {
    core: PipelineCore,
    output_name: String,
    transform: ScoreTransform,
    mode: LabelMode,
    chain: ScoreChain,
}

fn label_name(labels: Option<&[String]>, index: usize) -> String {
    match labels.and_then(|l| l.get(index)) {
        Some(label) => label.clone(),
        None => format!("LABEL_{}", index),
    }
}

impl TextClassificationPipeline {
    pub fn new(session: &Session, config: TextClassificationConfig) -> Result<Self> {
        let core = PipelineCore::new(
            session,
            PipelineTask::TextClassification,
            &config.name,
            &config.model_path,
            &config.model_options,
            &config.options,
            config.timeout,
        )?;

        let multi = core.model().is_multi_label();
        let transform = config.options.score_transform.unwrap_or(if multi {
            ScoreTransform::Sigmoid
        } else {
            ScoreTransform::Softmax
        });
        let mode = config
            .options
            .label_mode
            .unwrap_or(if multi { LabelMode::Multi } else { LabelMode::Single });

        let mut chain = ScoreChain::new()
            .with(Box::new(transform))
            .with(Box::new(SortDescending));
        if mode == LabelMode::Single {
            chain = chain.with(Box::new(TopK::new(1)));
        }
        debug!(pipeline = core.name(), stages = ?chain.stages(), "score chain");

        Ok(TextClassificationPipeline {
            core,
            output_name: config.output_name.unwrap_or_else(|| LOGITS.to_string()),
            transform,
            mode,
            chain,
        })
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn model(&self) -> &Model {
        self.core.model()
    }

    pub fn transform(&self) -> ScoreTransform {
        self.transform
    }

    pub fn label_mode(&self) -> LabelMode {
        self.mode
    }

    /// Classifies `inputs`; `result[i]` holds the labels of `inputs[i]`,
    /// best first.
    pub fn run<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Vec<Vec<ClassificationOutput>>> {
        let (batch, mut outputs) = self.core.forward(inputs)?;
        let tensor = take_output(&mut outputs, &self.output_name)?;
        let classes = match *tensor.shape().dims() {
            [n, c] if n == batch.batch_size && c > 0 => c,
            ref dims => {
                return Err(PipelineError::inference(
                    Stage::Postprocess,
                    format!(
                        "output '{}' has shape {:?}, expected [{}, classes]",
                        self.output_name, dims, batch.batch_size
                    ),
                ))
            }
        };

        let labels = self.core.model().labels();
        if let Some(labels) = labels.filter(|l| l.len() != classes) {
            return Err(PipelineError::inference(
                Stage::Postprocess,
                format!("model has {} labels but produced {} scores", labels.len(), classes),
            ));
        }

        let logits = tensor.as_f32().map_err(postprocess_err)?;
        Ok(logits
            .chunks(classes)
            .map(|row| {
                self.chain
                    .run(row)
                    .into_iter()
                    .map(|s| ClassificationOutput {
                        label: label_name(labels, s.index),
                        score: s.score,
                    })
                    .collect()
            })
            .collect())
    }

    pub fn statistics(&self) -> PipelineStatistics {
        self.core.statistics()
    }
}
