use std::path::Path;

use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor as OrtTensor;
use tracing::debug;

use tp_model::ModelMetadata;
use tp_tensor::Tensor;

use super::{EngineInputs, EngineOutputs, GraphInfo, InferenceEngine, ModelId};
use crate::error::{PipelineError, Result, Stage};
use crate::options::{BackendKind, ExecutionProvider, SessionOptions};

pub(crate) fn init_environment() -> Result<()> {
    ort::init()
        .with_name("tp-pipeline")
        .commit()
        .map(|_| ())
        .map_err(|e| PipelineError::config(format!("ONNX Runtime initialization failed: {}", e)))
}

pub(crate) fn release_environment() {
    // The runtime environment is process-global in `ort`; sessions hold
    // the native memory and are already gone at this point.
    debug!("no ONNX Runtime sessions remain");
}

struct OrtGraph {
    session: Session,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// ONNX Runtime sessions over `model.onnx` graphs.
pub struct OrtEngine {
    options: SessionOptions,
    graphs: Vec<Option<OrtGraph>>,
}

impl std::fmt::Debug for OrtEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtEngine")
            .field("options", &self.options)
            .field("graphs", &self.graphs.iter().flatten().count())
            .finish()
    }
}

fn ort_err(stage: Stage) -> impl Fn(ort::Error) -> PipelineError {
    move |e| PipelineError::inference(stage, e)
}

impl OrtEngine {
    pub fn new(options: &SessionOptions) -> Result<Self> {
        options.reject_unsupported(
            BackendKind::Ort,
            &["execution_provider", "intra_op_threads", "inter_op_threads", "cache_dir"],
        )?;
        if let ExecutionProvider::Metal { .. } = options.execution_provider {
            return Err(PipelineError::config(
                "backend ort does not support the metal execution provider",
            ));
        }
        Ok(OrtEngine {
            options: options.clone(),
            graphs: Vec::new(),
        })
    }

    fn build_session(&self, weights: &Path) -> std::result::Result<Session, ort::Error> {
        let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        if let Some(n) = self.options.intra_op_threads {
            builder = builder.with_intra_threads(n)?;
        }
        if let Some(n) = self.options.inter_op_threads {
            builder = builder.with_parallel_execution(true)?.with_inter_threads(n)?;
        }
        if let Some(dir) = &self.options.cache_dir {
            let stem = weights.file_stem().and_then(|s| s.to_str()).unwrap_or("model");
            builder = builder.with_optimized_model_path(dir.join(format!("{}.optimized.onnx", stem)))?;
        }
        if let ExecutionProvider::Cuda { device } = self.options.execution_provider {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device as i32)
                .build()
                .error_on_failure()])?;
        }
        builder.commit_from_file(weights)
    }

    fn graph(&self, id: ModelId) -> Result<&OrtGraph> {
        self.graphs
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| PipelineError::inference(Stage::Infer, format!("no model registered as {:?}", id)))
    }
}

impl InferenceEngine for OrtEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::Ort
    }

    fn is_thread_safe(&self) -> bool {
        false
    }

    fn default_weights_file(&self) -> &'static str {
        "model.onnx"
    }

    fn load(&mut self, weights: &Path, metadata: Option<&ModelMetadata>) -> Result<(ModelId, GraphInfo)> {
        let session = self
            .build_session(weights)
            .map_err(|e| PipelineError::load(weights, e))?;
        let inputs: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let outputs: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        debug!(path = %weights.display(), ?inputs, ?outputs, "created ONNX Runtime session");

        let info = GraphInfo {
            capacity: metadata.and_then(|m| m.max_position_embeddings),
            labels: None,
            wants_type_ids: inputs.iter().any(|n| n == "token_type_ids"),
        };
        let id = ModelId(self.graphs.len());
        self.graphs.push(Some(OrtGraph {
            session,
            inputs,
            outputs,
        }));
        Ok((id, info))
    }

    fn run(&self, id: ModelId, inputs: &EngineInputs) -> Result<EngineOutputs> {
        let graph = self.graph(id)?;
        let shape = vec![inputs.batch as i64, inputs.seq_len as i64];

        let mut feed: Vec<(String, SessionInputValue<'_>)> = Vec::with_capacity(graph.inputs.len());
        for name in &graph.inputs {
            let data = match name.as_str() {
                "input_ids" => inputs.input_ids.clone(),
                "attention_mask" => inputs.attention_mask.clone(),
                "token_type_ids" => inputs
                    .token_type_ids
                    .clone()
                    .unwrap_or_else(|| vec![0; inputs.input_ids.len()]),
                other => {
                    return Err(PipelineError::inference(
                        Stage::Infer,
                        format!("graph input '{}' is not one this engine can feed", other),
                    ))
                }
            };
            let tensor = OrtTensor::from_array((shape.clone(), data)).map_err(ort_err(Stage::Infer))?;
            feed.push((name.clone(), tensor.into()));
        }

        let results = graph.session.run(feed).map_err(ort_err(Stage::Infer))?;
        let mut outputs = EngineOutputs::new();
        for name in &graph.outputs {
            let Some(value) = results.get(name.as_str()) else {
                continue;
            };
            let (dims, data) = value
                .try_extract_raw_tensor::<f32>()
                .map_err(ort_err(Stage::Infer))?;
            let dims: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
            let tensor = Tensor::from_f32(data.to_vec(), dims)
                .map_err(|e| PipelineError::inference(Stage::Infer, e))?;
            outputs.insert(name.clone(), tensor);
        }
        Ok(outputs)
    }

    fn unload(&mut self, id: ModelId) {
        if let Some(slot) = self.graphs.get_mut(id.0) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn inputs() -> EngineInputs {
        EngineInputs {
            input_ids: vec![2, 7, 3],
            attention_mask: vec![1, 1, 1],
            token_type_ids: None,
            batch: 1,
            seq_len: 3,
        }
    }

    #[test]
    fn test_accepts_runtime_options() {
        let opts = SessionOptions {
            execution_provider: ExecutionProvider::Cuda { device: 0 },
            intra_op_threads: Some(2),
            inter_op_threads: Some(1),
            cache_dir: Some(std::env::temp_dir()),
        };
        let engine = OrtEngine::new(&opts).unwrap();
        assert_eq!(engine.kind(), BackendKind::Ort);
        assert!(!engine.is_thread_safe());
        assert_eq!(engine.default_weights_file(), "model.onnx");
    }

    #[test]
    fn test_rejects_metal() {
        let opts = SessionOptions {
            execution_provider: ExecutionProvider::Metal { device: 0 },
            ..Default::default()
        };
        let err = OrtEngine::new(&opts).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(ref m) if m.contains("metal")));
    }

    #[test]
    fn test_load_rejects_invalid_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();
        let mut engine = OrtEngine::new(&SessionOptions::default()).unwrap();
        assert!(matches!(engine.load(&path, None), Err(PipelineError::Load { .. })));
    }

    #[test]
    fn test_run_unknown_model() {
        let engine = OrtEngine::new(&SessionOptions::default()).unwrap();
        let err = engine.run(ModelId(3), &inputs()).unwrap_err();
        assert_eq!(err.stage(), Stage::Infer);
    }

    #[test]
    fn test_session_over_ort() {
        let session = Session::new(BackendKind::Ort, SessionOptions::default()).unwrap();
        assert!(!session.is_destroyed());
        session.destroy().unwrap();
        assert!(session.destroy().is_err());
    }
}
