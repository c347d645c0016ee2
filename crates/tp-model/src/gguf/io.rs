//! Little-endian primitive readers shared by the GGUF parsers.

use std::io::Read;

use crate::error::{ModelError, Result};

/// Strings and arrays longer than this are treated as corruption rather
/// than allocated.
const MAX_LEN: u64 = 1 << 30;

pub(crate) fn read_array<const N: usize>(reader: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_u32(reader: &mut impl Read) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array(reader)?))
}

pub(crate) fn read_u64(reader: &mut impl Read) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array(reader)?))
}

/// Reads a length prefix and checks it against the sanity limit.
pub(crate) fn read_len(reader: &mut impl Read, what: &str) -> Result<usize> {
    let len = read_u64(reader)?;
    if len > MAX_LEN {
        return Err(ModelError::Other(format!("{} length {} is implausible", what, len)));
    }
    Ok(len as usize)
}

/// A GGUF string: u64 length followed by that many UTF-8 bytes.
pub(crate) fn read_string(reader: &mut impl Read) -> Result<String> {
    let len = read_len(reader, "string")?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| ModelError::Other(format!("invalid UTF-8 in string: {}", e)))
}
