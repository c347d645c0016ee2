//! Inference engines behind a session.

#[cfg(feature = "candle")]
pub mod candle;
pub mod cpu;
#[cfg(feature = "ort")]
pub mod ort;

use std::collections::BTreeMap;
use std::path::Path;

use tp_model::ModelMetadata;
use tp_tensor::Tensor;
use tp_tokenizer::TokenizerRuntime;

use crate::error::{PipelineError, Result};
use crate::options::{BackendKind, SessionOptions};

pub use cpu::CpuEngine;

/// Output names every engine uses for the common heads.
pub const LAST_HIDDEN_STATE: &str = "last_hidden_state";
pub const POOLER_OUTPUT: &str = "pooler_output";
pub const LOGITS: &str = "logits";

/// Handle of a graph registered in an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub usize);

/// One padded batch, row-major `[batch, seq_len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInputs {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Option<Vec<i64>>,
    pub batch: usize,
    pub seq_len: usize,
}

/// Named f32 outputs of one run.
pub type EngineOutputs = BTreeMap<String, Tensor>;

/// What an engine learned about a graph while loading it.
#[derive(Debug, Clone, Default)]
pub struct GraphInfo {
    /// Longest sequence the graph accepts, when the graph states it.
    pub capacity: Option<usize>,
    pub labels: Option<Vec<String>>,
    /// Whether the graph consumes segment ids.
    pub wants_type_ids: bool,
}

/// Operations every inference engine provides.
pub trait InferenceEngine: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Whether `run` may be called from several threads at once.
    fn is_thread_safe(&self) -> bool;

    /// Weights file looked up in a model directory by default.
    fn default_weights_file(&self) -> &'static str;

    /// Registers the graph stored at `weights`.
    fn load(&mut self, weights: &Path, metadata: Option<&ModelMetadata>) -> Result<(ModelId, GraphInfo)>;

    fn run(&self, id: ModelId, inputs: &EngineInputs) -> Result<EngineOutputs>;

    /// Drops a graph. Unknown ids are ignored.
    fn unload(&mut self, id: ModelId);
}

/// The engine chosen for a session, fixed at construction.
#[derive(Debug)]
pub enum Engine {
    Cpu(CpuEngine),
    #[cfg(feature = "ort")]
    Ort(ort::OrtEngine),
    #[cfg(feature = "candle")]
    Candle(candle::CandleEngine),
    #[cfg(test)]
    Recording(crate::test_support::RecordingEngine),
}

impl Engine {
    /// Builds the engine for `kind`, validating the options it accepts.
    pub fn new(kind: BackendKind, options: &SessionOptions) -> Result<Engine> {
        match kind {
            BackendKind::Cpu => Ok(Engine::Cpu(CpuEngine::new(options)?)),
            #[cfg(feature = "ort")]
            BackendKind::Ort => Ok(Engine::Ort(ort::OrtEngine::new(options)?)),
            #[cfg(feature = "candle")]
            BackendKind::Candle => Ok(Engine::Candle(candle::CandleEngine::new(options)?)),
            #[allow(unreachable_patterns)]
            other => Err(PipelineError::config(format!(
                "backend {} is not compiled in (enable the '{}' feature)",
                other, other
            ))),
        }
    }

    pub fn as_dyn(&self) -> &dyn InferenceEngine {
        match self {
            Engine::Cpu(e) => e,
            #[cfg(feature = "ort")]
            Engine::Ort(e) => e,
            #[cfg(feature = "candle")]
            Engine::Candle(e) => e,
            #[cfg(test)]
            Engine::Recording(e) => e,
        }
    }

    pub fn as_dyn_mut(&mut self) -> &mut dyn InferenceEngine {
        match self {
            Engine::Cpu(e) => e,
            #[cfg(feature = "ort")]
            Engine::Ort(e) => e,
            #[cfg(feature = "candle")]
            Engine::Candle(e) => e,
            #[cfg(test)]
            Engine::Recording(e) => e,
        }
    }
}

/// Tokenizer engines a backend may be paired with, default first.
///
/// The CPU backend reads GGUF files, which carry no compiled tokenizer, so
/// it always uses the in-process engine.
pub fn compatible_tokenizers(kind: BackendKind) -> &'static [TokenizerRuntime] {
    match kind {
        BackendKind::Cpu => &[TokenizerRuntime::InProcess],
        BackendKind::Ort | BackendKind::Candle => &[TokenizerRuntime::Native, TokenizerRuntime::InProcess],
    }
}

/// Resolves the tokenizer engine for a model load: the requested one if the
/// backend allows it, else the first compatible engine built into this
/// binary.
pub fn select_tokenizer(kind: BackendKind, requested: Option<TokenizerRuntime>) -> Result<TokenizerRuntime> {
    let allowed = compatible_tokenizers(kind);
    match requested {
        Some(runtime) if !allowed.contains(&runtime) => Err(PipelineError::config(format!(
            "tokenizer engine {} cannot be used with backend {}",
            runtime, kind
        ))),
        Some(runtime) if !runtime.is_available() => Err(PipelineError::config(format!(
            "tokenizer engine {} is not compiled in",
            runtime
        ))),
        Some(runtime) => Ok(runtime),
        None => allowed
            .iter()
            .copied()
            .find(|r| r.is_available())
            .ok_or_else(|| PipelineError::config(format!("no tokenizer engine available for backend {}", kind))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_matrix() {
        assert_eq!(
            select_tokenizer(BackendKind::Cpu, None).unwrap(),
            TokenizerRuntime::InProcess
        );
        assert_eq!(
            select_tokenizer(BackendKind::Cpu, Some(TokenizerRuntime::InProcess)).unwrap(),
            TokenizerRuntime::InProcess
        );
        assert!(matches!(
            select_tokenizer(BackendKind::Cpu, Some(TokenizerRuntime::Native)),
            Err(PipelineError::Configuration(_))
        ));
        assert_eq!(
            select_tokenizer(BackendKind::Ort, Some(TokenizerRuntime::InProcess)).unwrap(),
            TokenizerRuntime::InProcess
        );
    }

    #[cfg(feature = "native-tokenizer")]
    #[test]
    fn test_native_is_default_for_graph_backends() {
        assert_eq!(select_tokenizer(BackendKind::Ort, None).unwrap(), TokenizerRuntime::Native);
        assert_eq!(select_tokenizer(BackendKind::Candle, None).unwrap(), TokenizerRuntime::Native);
    }

    #[cfg(not(feature = "ort"))]
    #[test]
    fn test_backend_not_compiled() {
        let err = Engine::new(BackendKind::Ort, &SessionOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(m) if m.contains("not compiled")));
    }
}
