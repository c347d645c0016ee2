//! `tp-pipeline` - text pipelines over interchangeable inference engines.
//!
//! - [`session`]: backend engine lifetime and the model cache
//! - [`batch`]: padded, masked batches from tokenized text
//! - [`pipelines`]: feature extraction and text classification
//! - [`engine`]: the CPU, ONNX Runtime and candle engines
//!
//! ```no_run
//! use tp_pipeline::{BackendKind, FeatureExtractionConfig, FeatureExtractionPipeline, Session, SessionOptions};
//!
//! let session = Session::new(BackendKind::Cpu, SessionOptions::default())?;
//! let embed = FeatureExtractionPipeline::new(
//!     &session,
//!     FeatureExtractionConfig {
//!         model_path: "models/minilm".into(),
//!         name: "embed".into(),
//!         ..Default::default()
//!     },
//! )?;
//! let vectors = embed.run(&["a sentence", "another one"])?;
//! # Ok::<(), tp_pipeline::PipelineError>(())
//! ```

pub mod batch;
pub mod engine;
pub mod env;
pub mod error;
pub mod model;
pub mod options;
pub mod pipelines;
pub mod resolver;
pub mod session;
pub mod statistics;
#[cfg(test)]
mod test_support;

pub use batch::{BatchOptions, Padding, PipelineBatch};
pub use engine::{EngineInputs, EngineOutputs, InferenceEngine, ModelId};
pub use error::{ErrorCategory, PipelineError, ResourceError, Result, Stage};
pub use model::Model;
pub use options::{BackendKind, ExecutionProvider, ModelOptions, PipelineOptions, PipelineTask, SessionOptions};
pub use pipelines::{
    ClassificationOutput, FeatureExtractionConfig, FeatureExtractionPipeline, TextClassificationConfig,
    TextClassificationPipeline,
};
pub use resolver::{LocalResolver, ModelResolver, ResolveOptions};
pub use session::Session;
pub use statistics::PipelineStatistics;

pub use tp_scoring::{LabelMode, ScoreTransform};
pub use tp_tokenizer::{TokenizerRuntime, TruncationPolicy};
