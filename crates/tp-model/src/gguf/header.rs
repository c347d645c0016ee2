use std::io::Read;

use crate::error::{ModelError, Result};

use super::io::{read_array, read_u32, read_u64};

/// The four-byte magic number identifying a GGUF file: ASCII "GGUF".
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// Tensor data alignment used when `general.alignment` is absent.
pub const GGUF_DEFAULT_ALIGNMENT: usize = 32;

/// Oldest and newest container versions this reader understands. Versions 2
/// and 3 share the same layout for little-endian files.
const MIN_VERSION: u32 = 2;
const MAX_VERSION: u32 = 3;

/// Parsed GGUF file header.
#[derive(Debug, Clone, Copy)]
pub struct GgufHeader {
    pub version: u32,
    pub n_tensors: u64,
    pub n_kv: u64,
}

impl GgufHeader {
    /// Reads and validates the magic, then the version, tensor count and
    /// key-value count.
    pub fn parse(reader: &mut impl Read) -> Result<GgufHeader> {
        let magic: [u8; 4] = read_array(reader)?;
        if magic != GGUF_MAGIC {
            return Err(ModelError::InvalidMagic(magic));
        }
        let version = read_u32(reader)?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(ModelError::UnsupportedVersion(version));
        }
        Ok(GgufHeader {
            version,
            n_tensors: read_u64(reader)?,
            n_kv: read_u64(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(magic: &[u8; 4], version: u32) -> Vec<u8> {
        let mut bytes = magic.to_vec();
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&7u64.to_le_bytes());
        bytes.extend_from_slice(&3u64.to_le_bytes());
        bytes
    }

    #[test]
    fn test_parse_header() {
        let bytes = header_bytes(b"GGUF", 3);
        let header = GgufHeader::parse(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.version, 3);
        assert_eq!(header.n_tensors, 7);
        assert_eq!(header.n_kv, 3);
    }

    #[test]
    fn test_bad_magic() {
        let bytes = header_bytes(b"GGML", 3);
        assert!(matches!(
            GgufHeader::parse(&mut bytes.as_slice()),
            Err(ModelError::InvalidMagic(m)) if &m == b"GGML"
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let bytes = header_bytes(b"GGUF", 1);
        assert!(matches!(
            GgufHeader::parse(&mut bytes.as_slice()),
            Err(ModelError::UnsupportedVersion(1))
        ));
    }
}
