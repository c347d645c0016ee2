use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tp_tokenizer::TokenizerError;

/// Where in a pipeline call an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Encode,
    BuildBatch,
    Infer,
    Decode,
    Postprocess,
    Destroy,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Encode => "encode",
            Stage::BuildBatch => "build-batch",
            Stage::Infer => "infer",
            Stage::Decode => "decode",
            Stage::Postprocess => "postprocess",
            Stage::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error class, stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Load,
    Tokenization,
    Inference,
    Resource,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("session already destroyed")]
    AlreadyDestroyed,
    #[error("session used after destroy (at {0})")]
    UseAfterDestroy(Stage),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad backend/tokenizer selection or options. Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
    #[error("tokenization failed at {stage}: {source}")]
    Tokenization {
        stage: Stage,
        #[source]
        source: TokenizerError,
    },
    #[error("inference failed at {stage}: {message}")]
    Inference { stage: Stage, message: String },
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::Configuration(message.into())
    }

    pub fn load(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        PipelineError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(stage: Stage, message: impl fmt::Display) -> Self {
        PipelineError::Inference {
            stage,
            message: message.to_string(),
        }
    }

    pub fn tokenization(stage: Stage, source: TokenizerError) -> Self {
        PipelineError::Tokenization { stage, source }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Configuration(_) | PipelineError::Load { .. } => Stage::Load,
            PipelineError::Tokenization { stage, .. } | PipelineError::Inference { stage, .. } => *stage,
            PipelineError::Resource(ResourceError::AlreadyDestroyed) => Stage::Destroy,
            PipelineError::Resource(ResourceError::UseAfterDestroy(stage)) => *stage,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Configuration(_) => ErrorCategory::Configuration,
            PipelineError::Load { .. } => ErrorCategory::Load,
            PipelineError::Tokenization { .. } => ErrorCategory::Tokenization,
            PipelineError::Inference { .. } => ErrorCategory::Inference,
            PipelineError::Resource(_) => ErrorCategory::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_category() {
        let e = PipelineError::inference(Stage::Postprocess, "3 labels for 2 outputs");
        assert_eq!(e.stage(), Stage::Postprocess);
        assert_eq!(e.category(), ErrorCategory::Inference);
        assert_eq!(e.to_string(), "inference failed at postprocess: 3 labels for 2 outputs");

        let e = PipelineError::tokenization(
            Stage::Encode,
            TokenizerError::SequenceTooLong { len: 600, max: 512 },
        );
        assert_eq!(e.stage(), Stage::Encode);
        assert_eq!(e.category(), ErrorCategory::Tokenization);

        let e: PipelineError = ResourceError::UseAfterDestroy(Stage::Infer).into();
        assert_eq!(e.stage(), Stage::Infer);
        assert_eq!(e.category(), ErrorCategory::Resource);

        let e: PipelineError = ResourceError::AlreadyDestroyed.into();
        assert_eq!(e.stage(), Stage::Destroy);

        assert_eq!(PipelineError::config("x").category(), ErrorCategory::Configuration);
        let e = PipelineError::load("/m/tokenizer.json", "not found");
        assert_eq!(e.category(), ErrorCategory::Load);
        assert_eq!(e.to_string(), "failed to load /m/tokenizer.json: not found");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::BuildBatch.to_string(), "build-batch");
        assert_eq!(Stage::Destroy.as_str(), "destroy");
    }
}
