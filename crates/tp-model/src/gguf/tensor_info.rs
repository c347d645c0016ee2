use std::io::Read;

use tp_tensor::DType;

use crate::error::{ModelError, Result};

use super::io::{read_string, read_u32, read_u64};

/// Describes a single tensor stored within a GGUF file.
#[derive(Debug, Clone)]
pub struct GgufTensorInfo {
    /// Tensor name (e.g. "blk.0.attn_q.weight").
    pub name: String,
    /// Dimension sizes in ggml order: `dims[0]` is the fastest-varying axis,
    /// so a `[rows][cols]` matrix is stored as `dims = [cols, rows]`.
    pub dims: Vec<u64>,
    pub dtype: DType,
    /// Byte offset from the start of the tensor data section.
    pub offset: u64,
}

impl GgufTensorInfo {
    pub fn numel(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// Byte size of the raw data, counting whole quantization blocks.
    pub fn data_size(&self) -> usize {
        self.numel().div_ceil(self.dtype.block_size()) * self.dtype.size_in_bytes()
    }

    /// Dimensions in row-major order (outermost first).
    pub fn row_major_dims(&self) -> Vec<usize> {
        self.dims.iter().rev().map(|&d| d as usize).collect()
    }
}

/// Parse `n_tensors` entries: name, u32 rank, rank x u64 dims, u32 ggml
/// type, u64 data offset.
pub fn parse_tensor_infos(reader: &mut impl Read, n_tensors: u64) -> Result<Vec<GgufTensorInfo>> {
    let mut infos = Vec::with_capacity((n_tensors as usize).min(4096));
    for _ in 0..n_tensors {
        let name = read_string(reader)?;
        let n_dims = read_u32(reader)?;
        if n_dims > 4 {
            return Err(ModelError::Other(format!(
                "tensor '{}' has {} dimensions (at most 4 supported)",
                name, n_dims
            )));
        }
        let dims = (0..n_dims)
            .map(|_| read_u64(reader))
            .collect::<Result<Vec<_>>>()?;
        let type_id = read_u32(reader)?;
        let dtype = DType::from_gguf_type(type_id).ok_or(ModelError::UnsupportedGgufType(type_id))?;
        let offset = read_u64(reader)?;
        infos.push(GgufTensorInfo {
            name,
            dims,
            dtype,
            offset,
        });
    }
    Ok(infos)
}
