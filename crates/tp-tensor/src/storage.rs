use crate::dtype::DType;
use crate::error::Result;

/// CPU-side tensor storage.
///
/// Weights are dequantized to f32 at load and activations stay f32, so
/// that is the only element type held in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    /// 32-bit floating point storage.
    F32(Vec<f32>),
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element type held by this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
        }
    }

    /// Returns the data as an f32 slice.
    pub fn as_f32_slice(&self) -> Result<&[f32]> {
        match self {
            CpuStorage::F32(v) => Ok(v.as_slice()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_view() {
        let s = CpuStorage::F32(vec![1.0, 2.0]);
        assert_eq!(s.as_f32_slice().unwrap(), &[1.0, 2.0]);
        assert_eq!(s.dtype(), DType::F32);
        assert_eq!(s.len(), 2);
        assert!(!s.is_empty());
    }
}
