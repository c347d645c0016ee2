use std::collections::HashMap;
use std::io::Read;

use crate::error::{ModelError, Result};

use super::io::{read_array, read_len, read_string, read_u32};

/// A single GGUF metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum GgufMetadataValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Array(Vec<GgufMetadataValue>),
}

impl GgufMetadataValue {
    /// Human-readable variant name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            GgufMetadataValue::U8(_) => "U8",
            GgufMetadataValue::I8(_) => "I8",
            GgufMetadataValue::U16(_) => "U16",
            GgufMetadataValue::I16(_) => "I16",
            GgufMetadataValue::U32(_) => "U32",
            GgufMetadataValue::I32(_) => "I32",
            GgufMetadataValue::U64(_) => "U64",
            GgufMetadataValue::I64(_) => "I64",
            GgufMetadataValue::F32(_) => "F32",
            GgufMetadataValue::F64(_) => "F64",
            GgufMetadataValue::Bool(_) => "Bool",
            GgufMetadataValue::String(_) => "String",
            GgufMetadataValue::Array(_) => "Array",
        }
    }

    /// Any non-negative integer variant, widened.
    fn as_u64(&self) -> Option<u64> {
        match *self {
            GgufMetadataValue::U8(v) => Some(v as u64),
            GgufMetadataValue::U16(v) => Some(v as u64),
            GgufMetadataValue::U32(v) => Some(v as u64),
            GgufMetadataValue::U64(v) => Some(v),
            GgufMetadataValue::I8(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I16(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I32(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }
}

fn mismatch(key: &str, expected: &str, got: &GgufMetadataValue) -> ModelError {
    ModelError::TypeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}

/// Collection of GGUF metadata key-value pairs.
#[derive(Debug, Clone, Default)]
pub struct GgufMetadata {
    pub entries: HashMap<String, GgufMetadataValue>,
}

impl GgufMetadata {
    fn require(&self, key: &str) -> Result<&GgufMetadataValue> {
        self.entries
            .get(key)
            .ok_or_else(|| ModelError::MissingKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Result<&str> {
        match self.require(key)? {
            GgufMetadataValue::String(s) => Ok(s.as_str()),
            other => Err(mismatch(key, "String", other)),
        }
    }

    pub fn get_u32(&self, key: &str) -> Result<u32> {
        match self.require(key)? {
            GgufMetadataValue::U32(v) => Ok(*v),
            other => Err(mismatch(key, "U32", other)),
        }
    }

    /// A size or count. Converters disagree on the integer width used for
    /// these, so any non-negative integer type is accepted.
    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let value = self.require(key)?;
        value
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| mismatch(key, "unsigned integer", value))
    }

    /// An f32, also accepting F64 values (narrowed).
    pub fn get_f32(&self, key: &str) -> Result<f32> {
        match self.require(key)? {
            GgufMetadataValue::F32(v) => Ok(*v),
            GgufMetadataValue::F64(v) => Ok(*v as f32),
            other => Err(mismatch(key, "F32", other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.require(key)? {
            GgufMetadataValue::Bool(v) => Ok(*v),
            other => Err(mismatch(key, "Bool", other)),
        }
    }

    pub fn get_string_array(&self, key: &str) -> Result<Vec<String>> {
        match self.require(key)? {
            GgufMetadataValue::Array(arr) => arr
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    GgufMetadataValue::String(s) => Ok(s.clone()),
                    other => Err(mismatch(&format!("{}[{}]", key, i), "String", other)),
                })
                .collect(),
            other => Err(mismatch(key, "Array", other)),
        }
    }

    /// Looks up an optional key: `Ok(None)` when absent, an error when
    /// present with the wrong type.
    pub fn optional<T>(
        &self,
        key: &str,
        get: impl FnOnce(&Self, &str) -> Result<T>,
    ) -> Result<Option<T>> {
        if self.contains(key) {
            get(self, key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Parse `n_kv` entries: GGUF string key, u32 value type, payload.
    ///
    /// GGUF value type IDs:
    ///   0=U8, 1=I8, 2=U16, 3=I16, 4=U32, 5=I32, 6=F32, 7=Bool,
    ///   8=String, 9=Array, 10=U64, 11=I64, 12=F64
    pub fn parse_kv(reader: &mut impl Read, n_kv: u64) -> Result<GgufMetadata> {
        let mut entries = HashMap::new();
        for _ in 0..n_kv {
            let key = read_string(reader)?;
            let type_id = read_u32(reader)?;
            let value = read_value(reader, type_id)?;
            entries.insert(key, value);
        }
        Ok(GgufMetadata { entries })
    }
}

fn read_value(reader: &mut impl Read, type_id: u32) -> Result<GgufMetadataValue> {
    use GgufMetadataValue as V;
    Ok(match type_id {
        0 => V::U8(u8::from_le_bytes(read_array(reader)?)),
        1 => V::I8(i8::from_le_bytes(read_array(reader)?)),
        2 => V::U16(u16::from_le_bytes(read_array(reader)?)),
        3 => V::I16(i16::from_le_bytes(read_array(reader)?)),
        4 => V::U32(u32::from_le_bytes(read_array(reader)?)),
        5 => V::I32(i32::from_le_bytes(read_array(reader)?)),
        6 => V::F32(f32::from_le_bytes(read_array(reader)?)),
        7 => V::Bool(read_array::<1>(reader)?[0] != 0),
        8 => V::String(read_string(reader)?),
        9 => {
            // u32 element type, u64 count, then `count` payloads
            let elem_type = read_u32(reader)?;
            let count = read_len(reader, "array")?;
            let mut values = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                values.push(read_value(reader, elem_type)?);
            }
            V::Array(values)
        }
        10 => V::U64(u64::from_le_bytes(read_array(reader)?)),
        11 => V::I64(i64::from_le_bytes(read_array(reader)?)),
        12 => V::F64(f64::from_le_bytes(read_array(reader)?)),
        other => return Err(ModelError::UnsupportedGgufType(other)),
    })
}
