use std::fmt;

/// Supported data types for tensor storage and GGUF weight blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision).
    F16,
    /// 16-bit brain floating point.
    BF16,
    /// 64-bit signed integer, used for token id / mask tensors.
    I64,
    /// 4-bit quantized format (GGUF Q4_0 block type).
    Q4_0,
    /// 4-bit quantized format with per-block minimum (GGUF Q4_1 block type).
    Q4_1,
    /// 8-bit quantized format (GGUF Q8_0 block type).
    Q8_0,
}

impl DType {
    /// Returns the size in bytes of a single element for non-quantized types,
    /// or the size of one block for quantized types.
    ///
    /// - Q4_0: 18 bytes per block of 32 elements (f16 scale + 16 bytes of nibbles)
    /// - Q4_1: 20 bytes per block of 32 elements (f16 scale + f16 min + 16 bytes)
    /// - Q8_0: 34 bytes per block of 32 elements (f16 scale + 32 bytes of quants)
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
            DType::I64 => 8,
            DType::Q4_0 => 18,
            DType::Q4_1 => 20,
            DType::Q8_0 => 34,
        }
    }

    /// Converts a GGUF (ggml) type ID to a `DType`.
    pub fn from_gguf_type(id: u32) -> Option<DType> {
        match id {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            2 => Some(DType::Q4_0),
            3 => Some(DType::Q4_1),
            8 => Some(DType::Q8_0),
            27 => Some(DType::I64),
            30 => Some(DType::BF16),
            _ => None,
        }
    }

    /// Returns the GGUF (ggml) type ID for this `DType`.
    pub fn to_gguf_type(&self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
            DType::Q4_0 => 2,
            DType::Q4_1 => 3,
            DType::Q8_0 => 8,
            DType::I64 => 27,
            DType::BF16 => 30,
        }
    }

    /// Returns the number of elements per quantization block, or 1 for
    /// non-quantized types.
    pub fn block_size(&self) -> usize {
        match self {
            DType::Q4_0 | DType::Q4_1 | DType::Q8_0 => 32,
            _ => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::I64 => "i64",
            DType::Q4_0 => "q4_0",
            DType::Q4_1 => "q4_1",
            DType::Q8_0 => "q8_0",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::BF16.size_in_bytes(), 2);
        assert_eq!(DType::I64.size_in_bytes(), 8);
        assert_eq!(DType::Q4_1.size_in_bytes(), 20);
    }

    #[test]
    fn test_gguf_type_ids() {
        for dtype in &[
            DType::F32,
            DType::F16,
            DType::BF16,
            DType::I64,
            DType::Q4_0,
            DType::Q4_1,
            DType::Q8_0,
        ] {
            assert_eq!(DType::from_gguf_type(dtype.to_gguf_type()), Some(*dtype));
        }
        assert!(DType::from_gguf_type(999).is_none());
    }
}
