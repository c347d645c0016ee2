use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("expected a rank-{expected} tensor, got shape {got:?}")]
    RankMismatch { expected: usize, got: Vec<usize> },
    #[error("index {index} out of bounds for dimension of size {size}")]
    OutOfBounds { index: usize, size: usize },
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
