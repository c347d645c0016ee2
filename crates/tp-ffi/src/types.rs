use std::os::raw::{c_char, c_int};

/// Status code returned by every FFI function.
pub type TpStatus = c_int;

pub const TP_OK: TpStatus = 0;
pub const TP_ERROR_INVALID_ARGUMENT: TpStatus = 1;
pub const TP_ERROR_CONFIGURATION: TpStatus = 2;
pub const TP_ERROR_LOAD: TpStatus = 3;
pub const TP_ERROR_TOKENIZATION: TpStatus = 4;
pub const TP_ERROR_INFERENCE: TpStatus = 5;
/// Use after destroy, double destroy or an unknown handle.
pub const TP_ERROR_RESOURCE: TpStatus = 6;
pub const TP_ERROR_INTERNAL: TpStatus = 7;

/// Opaque session handle. 0 is never a valid handle.
pub type TpSession = u64;

/// Opaque pipeline handle. 0 is never a valid handle.
pub type TpPipeline = u64;

/// One `key=value` pipeline option.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TpOption {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// Row-major `[rows, dim]` embeddings. Free with `tp_embeddings_free`.
#[repr(C)]
#[derive(Debug)]
pub struct TpEmbeddings {
    pub data: *mut f32,
    pub rows: usize,
    pub dim: usize,
}

impl Default for TpEmbeddings {
    fn default() -> Self {
        TpEmbeddings {
            data: std::ptr::null_mut(),
            rows: 0,
            dim: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct TpLabelScore {
    pub label: *mut c_char,
    pub score: f32,
}

/// Classification results for `rows` inputs. Row `i` owns `counts[i]`
/// consecutive entries of `scores`, best first. Free with
/// `tp_classifications_free`.
#[repr(C)]
#[derive(Debug)]
pub struct TpClassifications {
    pub scores: *mut TpLabelScore,
    pub total: usize,
    pub counts: *mut usize,
    pub rows: usize,
}

impl Default for TpClassifications {
    fn default() -> Self {
        TpClassifications {
            scores: std::ptr::null_mut(),
            total: 0,
            counts: std::ptr::null_mut(),
            rows: 0,
        }
    }
}
