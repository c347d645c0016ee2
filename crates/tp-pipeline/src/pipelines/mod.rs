//! Task pipelines: tokenize, batch, run, postprocess.

pub mod feature_extraction;
pub mod text_classification;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use tp_tensor::Tensor;

use crate::batch::{BatchOptions, PipelineBatch};
use crate::engine::EngineOutputs;
use crate::error::{PipelineError, ResourceError, Result, Stage};
use crate::model::Model;
use crate::options::{ModelOptions, PipelineOptions, PipelineTask};
use crate::session::Session;
use crate::statistics::{PipelineStatistics, StatsRecorder};

pub use feature_extraction::{FeatureExtractionConfig, FeatureExtractionPipeline};
pub use text_classification::{ClassificationOutput, TextClassificationConfig, TextClassificationPipeline};

/// What both pipelines share: the session, the model, the batch settings
/// and the counters. Owns the pipeline's name in the session.
#[derive(Debug)]
pub(crate) struct PipelineCore {
    session: Session,
    model: Arc<Model>,
    name: String,
    batch: BatchOptions,
    timeout: Option<Duration>,
    stats: StatsRecorder,
}

impl PipelineCore {
    pub(crate) fn new(
        session: &Session,
        task: PipelineTask,
        name: &str,
        model_path: &Path,
        model_options: &ModelOptions,
        options: &PipelineOptions,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(PipelineError::config("pipeline name must not be empty"));
        }
        options.check_task(task)?;
        let model = session.load_model(model_path, model_options)?;
        session.register_pipeline(name)?;

        let batch = BatchOptions {
            padding: options.padding.unwrap_or_default(),
            max_length: Some(model.capacity()),
            truncation: options.truncation.unwrap_or_default(),
            with_type_ids: model.wants_type_ids,
        };
        info!(
            pipeline = name,
            task = task.as_str(),
            model = %model.path().display(),
            backend = %model.backend(),
            "pipeline created"
        );
        Ok(PipelineCore {
            session: session.clone(),
            model,
            name: name.to_string(),
            batch,
            timeout,
            stats: StatsRecorder::default(),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn model(&self) -> &Model {
        &self.model
    }

    /// Tokenizes and batches `inputs`, then runs the model.
    pub(crate) fn forward<S: AsRef<str>>(&self, inputs: &[S]) -> Result<(PipelineBatch, EngineOutputs)> {
        if self.session.is_destroyed() {
            return Err(ResourceError::UseAfterDestroy(Stage::Encode).into());
        }

        let start = Instant::now();
        let batch = PipelineBatch::build(self.model.tokenizer(), inputs, &self.batch)?;
        self.stats.record_tokenization(start.elapsed());

        let start = Instant::now();
        let outputs = match self.timeout {
            Some(timeout) => self
                .session
                .run_with_timeout(&self.model, batch.engine_inputs(), timeout)?,
            None => self.session.run(&self.model, &batch.engine_inputs())?,
        };
        let elapsed = start.elapsed();
        self.stats.record_inference(elapsed);
        debug!(
            pipeline = %self.name,
            batch = batch.batch_size,
            seq_len = batch.seq_len,
            ?elapsed,
            "forward"
        );
        Ok((batch, outputs))
    }

    pub(crate) fn statistics(&self) -> PipelineStatistics {
        self.stats.snapshot(&self.name)
    }
}

impl Drop for PipelineCore {
    fn drop(&mut self) {
        self.session.release_pipeline(&self.name);
    }
}

/// Removes output `name`, or fails listing what the model produced.
pub(crate) fn take_output(outputs: &mut EngineOutputs, name: &str) -> Result<Tensor> {
    outputs.remove(name).ok_or_else(|| {
        let available: Vec<&str> = outputs.keys().map(String::as_str).collect();
        PipelineError::inference(
            Stage::Postprocess,
            format!("model has no output '{}' (available: {})", name, available.join(", ")),
        )
    })
}

pub(crate) fn postprocess_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::inference(Stage::Postprocess, e)
}
