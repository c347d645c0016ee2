use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed tokenizer file: {0}")]
    Malformed(String),
    #[error("unsupported {kind}: {name}")]
    UnsupportedComponent { kind: &'static str, name: String },
    #[error("sequence of {len} tokens exceeds the maximum of {max}")]
    SequenceTooLong { len: usize, max: usize },
    #[error("tokenizer runtime '{0}' is not compiled into this build")]
    RuntimeUnavailable(String),
    #[error("unknown tokenizer runtime '{0}'")]
    UnknownRuntime(String),
    #[error("native tokenizer error: {0}")]
    Engine(String),
}

impl From<serde_json::Error> for TokenizerError {
    fn from(e: serde_json::Error) -> Self {
        TokenizerError::Malformed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
