use std::path::Path;

use tracing::debug;

use tp_model::{Encoder, EncoderInput, ModelMetadata};
use tp_tensor::{ComputeBackend, CpuBackend};

use super::{EngineInputs, EngineOutputs, GraphInfo, InferenceEngine, ModelId, LAST_HIDDEN_STATE, LOGITS, POOLER_OUTPUT};
use crate::error::{PipelineError, Result, Stage};
use crate::options::{BackendKind, SessionOptions};

/// Runs GGUF encoders with the reference `CpuBackend`.
#[derive(Debug)]
pub struct CpuEngine {
    backend: CpuBackend,
    graphs: Vec<Option<Box<dyn Encoder>>>,
}

impl CpuEngine {
    /// Accepts only the default options: the CPU backend runs on the
    /// calling thread with no graph cache.
    pub fn new(options: &SessionOptions) -> Result<Self> {
        options.reject_unsupported(BackendKind::Cpu, &[])?;
        Ok(CpuEngine {
            backend: CpuBackend::new(),
            graphs: Vec::new(),
        })
    }

    fn graph(&self, id: ModelId) -> Result<&dyn Encoder> {
        self.graphs
            .get(id.0)
            .and_then(|g| g.as_deref())
            .ok_or_else(|| PipelineError::inference(Stage::Infer, format!("no model registered as {:?}", id)))
    }
}

impl InferenceEngine for CpuEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn default_weights_file(&self) -> &'static str {
        "model.gguf"
    }

    fn load(&mut self, weights: &Path, _metadata: Option<&ModelMetadata>) -> Result<(ModelId, GraphInfo)> {
        let encoder = tp_model::load_encoder(weights).map_err(|e| PipelineError::load(weights, e))?;
        let info = GraphInfo {
            capacity: Some(encoder.max_positions()),
            labels: encoder.labels().map(<[String]>::to_vec),
            wants_type_ids: true,
        };
        let id = ModelId(self.graphs.len());
        debug!(
            ?id,
            compute = self.backend.name(),
            hidden = encoder.hidden_size(),
            path = %weights.display(),
            "registered encoder"
        );
        self.graphs.push(Some(encoder));
        Ok((id, info))
    }

    fn run(&self, id: ModelId, inputs: &EngineInputs) -> Result<EngineOutputs> {
        let encoder = self.graph(id)?;
        let input = EncoderInput {
            input_ids: &inputs.input_ids,
            attention_mask: &inputs.attention_mask,
            token_type_ids: inputs.token_type_ids.as_deref(),
            batch: inputs.batch,
            seq_len: inputs.seq_len,
        };
        let output = encoder
            .forward(&input, &self.backend)
            .map_err(|e| PipelineError::inference(Stage::Infer, e))?;

        let mut outputs = EngineOutputs::new();
        outputs.insert(LAST_HIDDEN_STATE.to_string(), output.last_hidden_state);
        if let Some(pooled) = output.pooled {
            outputs.insert(POOLER_OUTPUT.to_string(), pooled);
        }
        if let Some(logits) = output.logits {
            outputs.insert(LOGITS.to_string(), logits);
        }
        Ok(outputs)
    }

    fn unload(&mut self, id: ModelId) {
        if let Some(slot) = self.graphs.get_mut(id.0) {
            *slot = None;
        }
    }
}
