use std::fmt::Debug;

use crate::error::Result;

/// Trait for pluggable compute backends used by the in-process encoder.
///
/// All operations work on row-major f32 slices. Data is passed in as slices
/// and returned as owned vectors. The backend is responsible for performing
/// the computation and validating slice lengths.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu").
    fn name(&self) -> &str;

    /// Matrix multiplication: C = A @ B.
    ///
    /// - `a`: row-major data of shape [m, k]
    /// - `b`: row-major data of shape [k, n]
    /// - Returns: row-major data of shape [m, n]
    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>>;

    /// Element-wise addition: result[i] = a[i] + b[i].
    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// Scalar multiplication: result[i] = a[i] * s.
    fn scale(&self, a: &[f32], s: f32) -> Result<Vec<f32>>;

    /// Row-broadcast bias addition.
    ///
    /// `x` holds rows of `bias.len()` elements; `bias` is added to every row.
    fn add_bias(&self, x: &[f32], bias: &[f32]) -> Result<Vec<f32>>;

    /// Layer normalization over rows of `hidden_size` elements:
    ///
    ///   mean = sum(x) / n, var = sum((x - mean)^2) / n
    ///   result[i] = (x[i] - mean) / sqrt(var + eps) * weight[i] + bias[i]
    fn layer_norm(
        &self,
        x: &[f32],
        weight: &[f32],
        bias: &[f32],
        eps: f32,
        hidden_size: usize,
    ) -> Result<Vec<f32>>;

    /// Softmax over chunks of `n` elements.
    ///
    /// For each chunk: result[i] = exp(x[i] - max(x)) / sum(exp(x[j] - max(x)))
    fn softmax(&self, x: &[f32], n: usize) -> Result<Vec<f32>>;

    /// Exact (erf-based) GELU: result[i] = 0.5 * x * (1 + erf(x / sqrt(2))).
    fn gelu(&self, x: &[f32]) -> Result<Vec<f32>>;

    /// Hyperbolic tangent, used by the sequence-classification pooler.
    fn tanh(&self, x: &[f32]) -> Result<Vec<f32>>;
}
