use std::path::PathBuf;
use std::time::Duration;

use tp_scoring::{l2_normalize, mean_pool};

use super::{postprocess_err, take_output, PipelineCore};
use crate::engine::LAST_HIDDEN_STATE;
use crate::error::{PipelineError, Result, Stage};
use crate::model::Model;
use crate::options::{ModelOptions, PipelineOptions, PipelineTask};
use crate::session::Session;
use crate::statistics::PipelineStatistics;

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractionConfig {
    pub model_path: PathBuf,
    /// Unique within the session.
    pub name: String,
    /// Output to pool; `last_hidden_state` when unset.
    pub output_name: Option<String>,
    pub options: PipelineOptions,
    pub model_options: ModelOptions,
    /// Upper bound on one engine call.
    pub timeout: Option<Duration>,
}

/// Text to one embedding per input.
///
/// Token-level outputs `[N, L, H]` are mean-pooled over unmasked positions;
/// sentence-level outputs `[N, H]` are returned as they are.
#[derive(Debug)]
pub struct FeatureExtractionPipeline {
    core: PipelineCore,
    output_name: String,
    normalize: bool,
}

impl FeatureExtractionPipeline {
    pub fn new(session: &Session, config: FeatureExtractionConfig) -> Result<Self> {
        let core = PipelineCore::new(
            session,
            PipelineTask::FeatureExtraction,
            &config.name,
            &config.model_path,
            &config.model_options,
            &config.options,
            config.timeout,
        )?;
        Ok(FeatureExtractionPipeline {
            core,
            output_name: config.output_name.unwrap_or_else(|| LAST_HIDDEN_STATE.to_string()),
            normalize: config.options.normalize_embeddings.unwrap_or(false),
        })
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn model(&self) -> &Model {
        self.core.model()
    }

    /// Embeds `inputs`; `result[i]` belongs to `inputs[i]`.
    pub fn run<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Vec<Vec<f32>>> {
        let (batch, mut outputs) = self.core.forward(inputs)?;
        let tensor = take_output(&mut outputs, &self.output_name)?;
        let data = tensor.as_f32().map_err(postprocess_err)?;

        let mut embeddings = match *tensor.shape().dims() {
            [n, l, h] if n == batch.batch_size && l == batch.seq_len => {
                mean_pool(data, &batch.attention_mask, n, l, h).map_err(postprocess_err)?
            }
            [n, h] if n == batch.batch_size && h > 0 => data.chunks(h).map(<[f32]>::to_vec).collect(),
            ref dims => {
                return Err(PipelineError::inference(
                    Stage::Postprocess,
                    format!(
                        "output '{}' has shape {:?}, expected [{}, {}, hidden] or [{}, hidden]",
                        self.output_name, dims, batch.batch_size, batch.seq_len, batch.batch_size
                    ),
                ))
            }
        };
        if self.normalize {
            embeddings.iter_mut().for_each(|e| l2_normalize(e));
        }
        Ok(embeddings)
    }

    pub fn statistics(&self) -> PipelineStatistics {
        self.core.statistics()
    }
}
