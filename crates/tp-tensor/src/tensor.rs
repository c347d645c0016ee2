use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// A tensor backed by CPU storage.
///
/// Holds contiguous, row-major data with an associated shape. Engines hand
/// their named outputs back as tensors; the math itself runs on slices
/// through a `ComputeBackend`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
}

impl Tensor {
    /// Create an f32 tensor, checking that `data` fills `shape` exactly.
    pub fn from_f32(data: Vec<f32>, shape: impl Into<Shape>) -> Result<Self> {
        Self::with_storage(CpuStorage::F32(data), shape.into())
    }

    fn with_storage(storage: CpuStorage, shape: Shape) -> Result<Self> {
        if storage.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![storage.len()],
            });
        }
        Ok(Tensor { storage, shape })
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Returns the underlying data as an f32 slice.
    pub fn as_f32(&self) -> Result<&[f32]> {
        self.storage.as_f32_slice()
    }

    /// Consume the tensor, returning its f32 buffer.
    pub fn into_f32_vec(self) -> Result<Vec<f32>> {
        match self.storage {
            CpuStorage::F32(v) => Ok(v),
        }
    }

    /// Returns the f32 slice for index `i` along the leading dimension.
    ///
    /// For a [N, L, H] tensor this is the [L, H] block of row `i`.
    pub fn row_f32(&self, i: usize) -> Result<&[f32]> {
        if self.shape.ndim() == 0 {
            return Err(TensorError::RankMismatch {
                expected: 1,
                got: vec![],
            });
        }
        let rows = self.shape.dim(0);
        if i >= rows {
            return Err(TensorError::OutOfBounds {
                index: i,
                size: rows,
            });
        }
        let stride = self.shape.numel() / rows.max(1);
        let data = self.as_f32()?;
        Ok(&data[i * stride..(i + 1) * stride])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tensor() {
        let t = Tensor::from_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
        assert_eq!(t.shape().dims(), &[2, 3]);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        assert!(Tensor::from_f32(vec![1.0, 2.0], vec![3]).is_err());
    }

    #[test]
    fn test_row_slices() {
        let t = Tensor::from_f32((0..12).map(|v| v as f32).collect(), vec![2, 3, 2]).unwrap();
        assert_eq!(t.row_f32(1).unwrap(), &[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert!(t.row_f32(2).is_err());
    }

    #[test]
    fn test_into_f32_vec() {
        let t = Tensor::from_f32(vec![1.0, 2.0], vec![1, 2]).unwrap();
        assert_eq!(t.into_f32_vec().unwrap(), vec![1.0, 2.0]);
    }
}
