//! `tp-tensor` - Tensor library with pluggable compute backends for text pipelines.
//!
//! This crate provides:
//! - A `Tensor` type backed by CPU storage (f32 activations)
//! - A `ComputeBackend` trait for the encoder math (matmul, layer norm, softmax, GELU)
//! - A reference `CpuBackend` implementation
//! - Shape utilities
//! - Data type definitions for GGUF weight blocks (F32, F16, BF16, I64, Q4/Q8)

pub mod backend;
pub mod cpu;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use backend::ComputeBackend;
pub use cpu::CpuBackend;
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use storage::CpuStorage;
pub use tensor::Tensor;
