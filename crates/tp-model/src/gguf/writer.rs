//! Minimal GGUF v3 writer for building fixture models in tests.

use std::io::Write;
use std::path::Path;

use tp_tensor::DType;

use super::header::{GGUF_DEFAULT_ALIGNMENT, GGUF_MAGIC};
use super::metadata::GgufMetadataValue;
use crate::error::Result;

struct PendingTensor {
    name: String,
    ggml_dims: Vec<u64>,
    dtype: DType,
    data: Vec<u8>,
}

/// Accumulates metadata and tensors, then serializes them in one pass.
#[derive(Default)]
pub struct GgufWriter {
    kv: Vec<(String, GgufMetadataValue)>,
    tensors: Vec<PendingTensor>,
}

impl GgufWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: GgufMetadataValue) -> &mut Self {
        self.kv.push((key.to_string(), value));
        self
    }

    pub fn add_u32(&mut self, key: &str, v: u32) -> &mut Self {
        self.add(key, GgufMetadataValue::U32(v))
    }

    pub fn add_f32(&mut self, key: &str, v: f32) -> &mut Self {
        self.add(key, GgufMetadataValue::F32(v))
    }

    pub fn add_bool(&mut self, key: &str, v: bool) -> &mut Self {
        self.add(key, GgufMetadataValue::Bool(v))
    }

    pub fn add_string(&mut self, key: &str, v: &str) -> &mut Self {
        self.add(key, GgufMetadataValue::String(v.to_string()))
    }

    pub fn add_string_array(&mut self, key: &str, values: &[&str]) -> &mut Self {
        let items = values
            .iter()
            .map(|s| GgufMetadataValue::String(s.to_string()))
            .collect();
        self.add(key, GgufMetadataValue::Array(items))
    }

    /// Adds an f32 tensor given its row-major shape.
    pub fn add_tensor_f32(&mut self, name: &str, shape: &[usize], data: &[f32]) -> &mut Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.add_tensor_raw(name, shape, DType::F32, bytes)
    }

    /// Adds pre-encoded tensor bytes given the row-major shape.
    pub fn add_tensor_raw(
        &mut self,
        name: &str,
        shape: &[usize],
        dtype: DType,
        data: Vec<u8>,
    ) -> &mut Self {
        self.tensors.push(PendingTensor {
            name: name.to_string(),
            ggml_dims: shape.iter().rev().map(|&d| d as u64).collect(),
            dtype,
            data,
        });
        self
    }

    fn alignment(&self) -> usize {
        self.kv
            .iter()
            .find_map(|(k, v)| match (k.as_str(), v) {
                ("general.alignment", GgufMetadataValue::U32(a)) => Some(*a as usize),
                _ => None,
            })
            .unwrap_or(GGUF_DEFAULT_ALIGNMENT)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let alignment = self.alignment();
        let mut out = Vec::new();
        out.extend_from_slice(&GGUF_MAGIC);
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&(self.tensors.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.kv.len() as u64).to_le_bytes());

        for (key, value) in &self.kv {
            put_string(&mut out, key);
            out.extend_from_slice(&value_type(value).to_le_bytes());
            put_value(&mut out, value);
        }

        let mut offset = 0usize;
        let mut offsets = Vec::with_capacity(self.tensors.len());
        for t in &self.tensors {
            offset = offset.next_multiple_of(alignment);
            offsets.push(offset);
            offset += t.data.len();
        }
        for (t, offset) in self.tensors.iter().zip(&offsets) {
            put_string(&mut out, &t.name);
            out.extend_from_slice(&(t.ggml_dims.len() as u32).to_le_bytes());
            for d in &t.ggml_dims {
                out.extend_from_slice(&d.to_le_bytes());
            }
            out.extend_from_slice(&t.dtype.to_gguf_type().to_le_bytes());
            out.extend_from_slice(&(*offset as u64).to_le_bytes());
        }

        let data_start = out.len().next_multiple_of(alignment);
        out.resize(data_start, 0);
        for (t, offset) in self.tensors.iter().zip(&offsets) {
            out.resize(data_start + offset, 0);
            out.extend_from_slice(&t.data);
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(&self.to_bytes())?;
        Ok(())
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn value_type(value: &GgufMetadataValue) -> u32 {
    match value {
        GgufMetadataValue::U8(_) => 0,
        GgufMetadataValue::I8(_) => 1,
        GgufMetadataValue::U16(_) => 2,
        GgufMetadataValue::I16(_) => 3,
        GgufMetadataValue::U32(_) => 4,
        GgufMetadataValue::I32(_) => 5,
        GgufMetadataValue::F32(_) => 6,
        GgufMetadataValue::Bool(_) => 7,
        GgufMetadataValue::String(_) => 8,
        GgufMetadataValue::Array(_) => 9,
        GgufMetadataValue::U64(_) => 10,
        GgufMetadataValue::I64(_) => 11,
        GgufMetadataValue::F64(_) => 12,
    }
}

fn put_value(out: &mut Vec<u8>, value: &GgufMetadataValue) {
    match value {
        GgufMetadataValue::U8(v) => out.push(*v),
        GgufMetadataValue::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufMetadataValue::Bool(v) => out.push(*v as u8),
        GgufMetadataValue::String(s) => put_string(out, s),
        GgufMetadataValue::Array(items) => {
            // Element type comes from the first item; empty arrays are
            // written as string arrays.
            let elem = items.first().map_or(8, value_type);
            out.extend_from_slice(&elem.to_le_bytes());
            out.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                put_value(out, item);
            }
        }
    }
}
