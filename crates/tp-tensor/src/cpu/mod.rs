pub mod matmul;
pub mod unary;

use crate::backend::ComputeBackend;
use crate::error::{Result, TensorError};

/// Pure-Rust CPU compute backend.
///
/// Implements all operations with straightforward loops optimized for
/// correctness rather than peak performance. It is the execution core of the
/// in-process encoder engine and the reference other engines are compared to.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn check_rows(op: &str, len: usize, row: usize) -> Result<()> {
    if row == 0 {
        return Err(TensorError::Other(format!("{}: row size must be > 0", op)));
    }
    if len % row != 0 {
        return Err(TensorError::Other(format!(
            "{}: x.len()={} is not a multiple of {}",
            op, len, row
        )));
    }
    Ok(())
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
        if a.len() != m * k {
            return Err(TensorError::Other(format!(
                "matmul: a.len()={} but expected m*k={}",
                a.len(),
                m * k
            )));
        }
        if b.len() != k * n {
            return Err(TensorError::Other(format!(
                "matmul: b.len()={} but expected k*n={}",
                b.len(),
                k * n
            )));
        }
        Ok(matmul::matmul_ikj(a, b, m, k, n))
    }

    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        if a.len() != b.len() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![a.len()],
                got: vec![b.len()],
            });
        }
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
    }

    fn scale(&self, a: &[f32], s: f32) -> Result<Vec<f32>> {
        Ok(a.iter().map(|x| x * s).collect())
    }

    fn add_bias(&self, x: &[f32], bias: &[f32]) -> Result<Vec<f32>> {
        check_rows("add_bias", x.len(), bias.len())?;
        Ok(x
            .chunks_exact(bias.len())
            .flat_map(|row| row.iter().zip(bias).map(|(v, b)| v + b))
            .collect())
    }

    fn layer_norm(
        &self,
        x: &[f32],
        weight: &[f32],
        bias: &[f32],
        eps: f32,
        hidden_size: usize,
    ) -> Result<Vec<f32>> {
        if weight.len() != hidden_size || bias.len() != hidden_size {
            return Err(TensorError::Other(format!(
                "layer_norm: weight.len()={} bias.len()={} but hidden_size={}",
                weight.len(),
                bias.len(),
                hidden_size
            )));
        }
        check_rows("layer_norm", x.len(), hidden_size)?;

        let mut result = Vec::with_capacity(x.len());
        for row in x.chunks_exact(hidden_size) {
            let mean = row.iter().sum::<f32>() / hidden_size as f32;
            let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / hidden_size as f32;
            let inv_std = 1.0 / (var + eps).sqrt();
            for i in 0..hidden_size {
                result.push((row[i] - mean) * inv_std * weight[i] + bias[i]);
            }
        }
        Ok(result)
    }

    fn softmax(&self, x: &[f32], n: usize) -> Result<Vec<f32>> {
        check_rows("softmax", x.len(), n)?;

        let mut result = vec![0.0f32; x.len()];
        for (chunk, out) in x.chunks_exact(n).zip(result.chunks_exact_mut(n)) {
            // Find max for numerical stability
            let max_val = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max);

            let mut sum = 0.0f32;
            for (o, &v) in out.iter_mut().zip(chunk) {
                let e = (v - max_val).exp();
                *o = e;
                sum += e;
            }
            for o in out.iter_mut() {
                *o /= sum;
            }
        }
        Ok(result)
    }

    fn gelu(&self, x: &[f32]) -> Result<Vec<f32>> {
        Ok(x.iter().map(|&v| unary::gelu(v)).collect())
    }

    fn tanh(&self, x: &[f32]) -> Result<Vec<f32>> {
        Ok(x.iter().map(|v| v.tanh()).collect())
    }
}
