use std::io::{BufReader, Seek};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use tp_tensor::{DType, Tensor, TensorError};

use super::header::{GgufHeader, GGUF_DEFAULT_ALIGNMENT};
use super::metadata::GgufMetadata;
use super::tensor_info::{self, GgufTensorInfo};
use crate::error::{ModelError, Result};

/// A parsed GGUF file backed by a memory-mapped region.
///
/// The header, metadata and tensor table are read with buffered I/O, then the
/// whole file is mapped. Every tensor's byte range is validated against the
/// mapping at open time, so later accesses cannot run past the end.
pub struct GgufFile {
    pub header: GgufHeader,
    pub metadata: GgufMetadata,
    pub tensor_infos: Vec<GgufTensorInfo>,
    path: PathBuf,
    mmap: Mmap,
    /// Byte offset where tensor data begins (aligned).
    data_offset: usize,
}

impl std::fmt::Debug for GgufFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GgufFile")
            .field("path", &self.path)
            .field("version", &self.header.version)
            .field("tensors", &self.tensor_infos.len())
            .finish_non_exhaustive()
    }
}

impl GgufFile {
    pub fn open(path: &Path) -> Result<GgufFile> {
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(&file);

        let header = GgufHeader::parse(&mut reader)?;
        let metadata = GgufMetadata::parse_kv(&mut reader, header.n_kv)?;
        let tensor_infos = tensor_info::parse_tensor_infos(&mut reader, header.n_tensors)?;

        let alignment = metadata
            .optional("general.alignment", GgufMetadata::get_usize)?
            .unwrap_or(GGUF_DEFAULT_ALIGNMENT);
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(ModelError::Other(format!(
                "general.alignment must be a power of two, got {}",
                alignment
            )));
        }
        let table_end = reader.stream_position()? as usize;
        let data_offset = table_end.next_multiple_of(alignment);

        // SAFETY: the mapping is read-only and the file is not modified
        // while the model is loaded.
        let mmap = unsafe { Mmap::map(&file)? };

        for info in &tensor_infos {
            let end = (info.offset as usize)
                .checked_add(data_offset)
                .and_then(|start| start.checked_add(info.data_size()));
            match end {
                Some(end) if end <= mmap.len() => {}
                _ => return Err(ModelError::TruncatedTensor(info.name.clone())),
            }
        }

        debug!(
            path = %path.display(),
            version = header.version,
            tensors = tensor_infos.len(),
            metadata_keys = metadata.entries.len(),
            "opened GGUF file"
        );

        Ok(GgufFile {
            header,
            metadata,
            tensor_infos,
            path: path.to_path_buf(),
            mmap,
            data_offset,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tensor_info(&self, name: &str) -> Result<&GgufTensorInfo> {
        self.tensor_infos
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ModelError::TensorNotFound(name.to_string()))
    }

    pub fn has_tensor(&self, name: &str) -> bool {
        self.tensor_infos.iter().any(|t| t.name == name)
    }

    /// Raw bytes of a tensor within the mapping.
    pub fn tensor_data(&self, info: &GgufTensorInfo) -> &[u8] {
        let start = self.data_offset + info.offset as usize;
        &self.mmap[start..start + info.data_size()]
    }

    /// Load a tensor by name as f32 in row-major shape, dequantizing
    /// F16, BF16, Q4_0, Q4_1 and Q8_0 data.
    pub fn get_tensor_f32(&self, name: &str) -> Result<Tensor> {
        let info = self.tensor_info(name)?;
        let raw = self.tensor_data(info);
        let numel = info.numel();

        let data = match info.dtype {
            DType::F32 => dequantize_f32(raw),
            DType::F16 => dequantize_f16(raw),
            DType::BF16 => dequantize_bf16(raw),
            DType::Q4_0 => dequantize_q4_0(raw, numel),
            DType::Q4_1 => dequantize_q4_1(raw, numel),
            DType::Q8_0 => dequantize_q8_0(raw, numel),
            DType::I64 => {
                return Err(TensorError::UnsupportedDType(format!(
                    "tensor '{}' holds I64 data, expected a float type",
                    name
                ))
                .into())
            }
        };

        Ok(Tensor::from_f32(data, info.row_major_dims())?)
    }
}

fn f16_at(bytes: &[u8]) -> f32 {
    half::f16::from_le_bytes([bytes[0], bytes[1]]).to_f32()
}

fn dequantize_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn dequantize_f16(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2).map(f16_at).collect()
}

fn dequantize_bf16(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2)
        .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
        .collect()
}

const QK: usize = 32;

/// Expands the 16 packed bytes of a 4-bit block. Element `j` is the low
/// nibble of byte `j`, element `j + 16` the high nibble.
fn unpack_nibbles(qs: &[u8], mut emit: impl FnMut(u8)) {
    for &byte in qs {
        emit(byte & 0x0F);
    }
    for &byte in qs {
        emit(byte >> 4);
    }
}

/// Q4_0 block (18 bytes, 32 elements): f16 scale `d`, 16 nibble bytes.
/// value = (q - 8) * d
fn dequantize_q4_0(data: &[u8], numel: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(numel.next_multiple_of(QK));
    for block in data.chunks_exact(18) {
        let d = f16_at(&block[0..2]);
        unpack_nibbles(&block[2..], |q| out.push((q as i32 - 8) as f32 * d));
    }
    out.truncate(numel);
    out
}

/// Q4_1 block (20 bytes, 32 elements): f16 scale `d`, f16 minimum `m`,
/// 16 nibble bytes. value = q * d + m
fn dequantize_q4_1(data: &[u8], numel: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(numel.next_multiple_of(QK));
    for block in data.chunks_exact(20) {
        let d = f16_at(&block[0..2]);
        let m = f16_at(&block[2..4]);
        unpack_nibbles(&block[4..], |q| out.push(q as f32 * d + m));
    }
    out.truncate(numel);
    out
}

/// Q8_0 block (34 bytes, 32 elements): f16 scale `d`, 32 signed bytes.
fn dequantize_q8_0(data: &[u8], numel: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(numel.next_multiple_of(QK));
    for block in data.chunks_exact(34) {
        let d = f16_at(&block[0..2]);
        out.extend(block[2..].iter().map(|&q| q as i8 as f32 * d));
    }
    out.truncate(numel);
    out
}
