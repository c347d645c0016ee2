use std::path::Path;

use candle_core::{DType, Device, Tensor as CandleTensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tracing::debug;

use tp_model::ModelMetadata;
use tp_tensor::Tensor;

use super::{EngineInputs, EngineOutputs, GraphInfo, InferenceEngine, ModelId, LAST_HIDDEN_STATE};
use crate::error::{PipelineError, Result, Stage};
use crate::options::{BackendKind, ExecutionProvider, SessionOptions};

struct CandleGraph {
    model: BertModel,
    max_positions: usize,
}

/// candle's BERT over safetensors weights, on CPU, CUDA or Metal.
///
/// The model has no classification head, so it only produces
/// `last_hidden_state`.
pub struct CandleEngine {
    device: Device,
    graphs: Vec<Option<CandleGraph>>,
}

impl std::fmt::Debug for CandleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEngine")
            .field("device", &self.device)
            .field("graphs", &self.graphs.iter().flatten().count())
            .finish()
    }
}

fn candle_err(stage: Stage) -> impl Fn(candle_core::Error) -> PipelineError {
    move |e| PipelineError::inference(stage, e)
}

impl CandleEngine {
    pub fn new(options: &SessionOptions) -> Result<Self> {
        options.reject_unsupported(BackendKind::Candle, &["execution_provider"])?;
        let device = match options.execution_provider {
            ExecutionProvider::Cpu => Ok(Device::Cpu),
            ExecutionProvider::Cuda { device } => Device::new_cuda(device),
            ExecutionProvider::Metal { device } => Device::new_metal(device),
        }
        .map_err(|e| PipelineError::config(format!("device {}: {}", options.execution_provider, e)))?;
        Ok(CandleEngine {
            device,
            graphs: Vec::new(),
        })
    }

    fn graph(&self, id: ModelId) -> Result<&CandleGraph> {
        self.graphs
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| PipelineError::inference(Stage::Infer, format!("no model registered as {:?}", id)))
    }

    fn matrix(&self, data: &[i64], inputs: &EngineInputs) -> Result<CandleTensor> {
        CandleTensor::from_vec(data.to_vec(), (inputs.batch, inputs.seq_len), &self.device)
            .map_err(candle_err(Stage::Infer))
    }
}

impl InferenceEngine for CandleEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::Candle
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn default_weights_file(&self) -> &'static str {
        "model.safetensors"
    }

    fn load(&mut self, weights: &Path, _metadata: Option<&ModelMetadata>) -> Result<(ModelId, GraphInfo)> {
        let config_path = weights.with_file_name("config.json");
        let config_bytes = std::fs::read(&config_path).map_err(|e| PipelineError::load(&config_path, e))?;
        let config: Config =
            serde_json::from_slice(&config_bytes).map_err(|e| PipelineError::load(&config_path, e))?;
        let max_positions = serde_json::from_slice::<ModelMetadata>(&config_bytes)
            .ok()
            .and_then(|m| m.max_position_embeddings)
            .unwrap_or(512);

        // SAFETY: the weights file is mapped read-only and not modified
        // while loaded.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &self.device) }
            .map_err(|e| PipelineError::load(weights, e))?;
        let model = BertModel::load(vb, &config).map_err(|e| PipelineError::load(weights, e))?;
        debug!(path = %weights.display(), device = ?self.device, "loaded candle BERT");

        let id = ModelId(self.graphs.len());
        self.graphs.push(Some(CandleGraph { model, max_positions }));
        Ok((
            id,
            GraphInfo {
                capacity: Some(max_positions),
                labels: None,
                wants_type_ids: true,
            },
        ))
    }

    fn run(&self, id: ModelId, inputs: &EngineInputs) -> Result<EngineOutputs> {
        let graph = self.graph(id)?;
        if inputs.seq_len > graph.max_positions {
            return Err(PipelineError::inference(
                Stage::Infer,
                format!("sequence length {} exceeds {} positions", inputs.seq_len, graph.max_positions),
            ));
        }
        let ids = self.matrix(&inputs.input_ids, inputs)?;
        let mask = self.matrix(&inputs.attention_mask, inputs)?;
        let types = match &inputs.token_type_ids {
            Some(t) => self.matrix(t, inputs)?,
            None => ids.zeros_like().map_err(candle_err(Stage::Infer))?,
        };

        let hidden = graph
            .model
            .forward(&ids, &types, Some(&mask))
            .map_err(candle_err(Stage::Infer))?;
        let (n, l, h) = hidden.dims3().map_err(candle_err(Stage::Infer))?;
        let data = hidden
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(candle_err(Stage::Infer))?;

        let mut outputs = EngineOutputs::new();
        outputs.insert(
            LAST_HIDDEN_STATE.to_string(),
            Tensor::from_f32(data, vec![n, l, h]).map_err(|e| PipelineError::inference(Stage::Infer, e))?,
        );
        Ok(outputs)
    }

    fn unload(&mut self, id: ModelId) {
        if let Some(slot) = self.graphs.get_mut(id.0) {
            *slot = None;
        }
    }
}
