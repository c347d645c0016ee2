use std::cell::RefCell;
use std::ffi::CString;

use tp_pipeline::{ErrorCategory, PipelineError};

use crate::types::*;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `tp_last_error`.
pub fn set_last_error(msg: String) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

pub fn status_of(err: &PipelineError) -> TpStatus {
    match err.category() {
        ErrorCategory::Configuration => TP_ERROR_CONFIGURATION,
        ErrorCategory::Load => TP_ERROR_LOAD,
        ErrorCategory::Tokenization => TP_ERROR_TOKENIZATION,
        ErrorCategory::Inference => TP_ERROR_INFERENCE,
        ErrorCategory::Resource => TP_ERROR_RESOURCE,
    }
}

/// Records `err` as the last error and returns its status.
pub fn fail(err: PipelineError) -> TpStatus {
    tracing::debug!(stage = %err.stage(), error = %err, "ffi call failed");
    let status = status_of(&err);
    set_last_error(err.to_string());
    status
}

pub fn invalid_argument(msg: &str) -> TpStatus {
    set_last_error(msg.to_string());
    TP_ERROR_INVALID_ARGUMENT
}
