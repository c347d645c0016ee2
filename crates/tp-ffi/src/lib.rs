//! C ABI over `tp-pipeline`.
//!
//! Sessions and pipelines are integer handles. Every function returns a
//! `TpStatus`; on failure the message is available from `tp_last_error` on
//! the same thread. Results are written to caller-provided structs and
//! released with the matching `*_free` function.

mod error;
mod handles;
mod types;

pub use error::*;
pub use types::*;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use tp_pipeline::{
    BackendKind, FeatureExtractionConfig, FeatureExtractionPipeline, ModelOptions, PipelineError, PipelineOptions,
    PipelineTask, Session, SessionOptions, TextClassificationConfig, TextClassificationPipeline,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use handles::PipelineHandle;

/// Execute a closure that returns a `TpStatus`, catching any panics
/// and converting them into `TP_ERROR_INTERNAL`.
fn catch_panic<F: FnOnce() -> TpStatus>(f: F) -> TpStatus {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            TP_ERROR_INTERNAL
        }
    }
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, TpStatus> {
    if ptr.is_null() {
        return Err(invalid_argument(&format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| invalid_argument(&format!("{} is not UTF-8: {}", what, e)))
}

unsafe fn c_str_array<'a>(ptr: *const *const c_char, len: usize) -> Result<Vec<&'a str>, TpStatus> {
    if ptr.is_null() && len > 0 {
        return Err(invalid_argument("inputs is null"));
    }
    (0..len).map(|i| c_str(*ptr.add(i), "input")).collect()
}

/// Splits model-level keys (`tokenizer`, `weights-file`, `timeout-ms`)
/// from pipeline options.
unsafe fn parse_options(
    task: PipelineTask,
    ptr: *const TpOption,
    len: usize,
) -> Result<(PipelineOptions, ModelOptions, Option<Duration>), TpStatus> {
    if ptr.is_null() && len > 0 {
        return Err(invalid_argument("options is null"));
    }
    let mut model = ModelOptions::default();
    let mut timeout = None;
    let mut rest = Vec::new();
    for i in 0..len {
        let option = *ptr.add(i);
        let key = c_str(option.key, "option key")?;
        let value = c_str(option.value, "option value")?;
        match key {
            "tokenizer" => {
                let runtime = value.parse().map_err(|e| fail(PipelineError::config(format!("tokenizer: {}", e))))?;
                model.tokenizer = Some(runtime);
            }
            "weights-file" => model.weights_file = Some(value.to_string()),
            "timeout-ms" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| fail(PipelineError::config(format!("timeout-ms: '{}' is not a number", value))))?;
                timeout = Some(Duration::from_millis(ms));
            }
            _ => rest.push((key, value)),
        }
    }
    let options = PipelineOptions::parse(task, &rest).map_err(fail)?;
    Ok((options, model, timeout))
}

/// Install a `tracing` subscriber that prints to stderr, filtered by
/// `RUST_LOG`. Calling it again is a no-op.
#[no_mangle]
pub extern "C" fn tp_init_logging() -> TpStatus {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tp_pipeline=info,tp_ffi=info".into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    TP_OK
}

/// Create a session on `backend` (`cpu`, `ort` or `candle`).
///
/// `options_json` may be null; otherwise it holds `SessionOptions` as JSON.
#[no_mangle]
pub unsafe extern "C" fn tp_session_create(
    backend: *const c_char,
    options_json: *const c_char,
    session_out: *mut TpSession,
) -> TpStatus {
    catch_panic(|| {
        if session_out.is_null() {
            return invalid_argument("session_out is null");
        }
        let backend = match c_str(backend, "backend") {
            Ok(b) => b,
            Err(status) => return status,
        };
        let options = if options_json.is_null() {
            Ok(SessionOptions::default())
        } else {
            match c_str(options_json, "options_json") {
                Ok(json) => SessionOptions::from_json(json),
                Err(status) => return status,
            }
        };
        let session = (|| -> tp_pipeline::Result<Session> {
            let kind: BackendKind = backend.parse()?;
            Session::new(kind, options?)
        })();
        match session {
            Ok(session) => {
                *session_out = handles::insert_session(session);
                TP_OK
            }
            Err(e) => fail(e),
        }
    })
}

/// Destroy a session. A second call returns `TP_ERROR_RESOURCE`.
#[no_mangle]
pub extern "C" fn tp_session_destroy(session: TpSession) -> TpStatus {
    catch_panic(|| handles::destroy_session(session))
}

unsafe fn create_pipeline(
    session: TpSession,
    model_path: *const c_char,
    name: *const c_char,
    options: *const TpOption,
    n_options: usize,
    task: PipelineTask,
    pipeline_out: *mut TpPipeline,
) -> TpStatus {
    if pipeline_out.is_null() {
        return invalid_argument("pipeline_out is null");
    }
    let parsed = (|| {
        let model_path = c_str(model_path, "model_path")?;
        let name = c_str(name, "name")?;
        let (options, model_options, timeout) = parse_options(task, options, n_options)?;
        let session = handles::session(session)?;
        let pipeline = match task {
            PipelineTask::FeatureExtraction => FeatureExtractionPipeline::new(
                &session,
                FeatureExtractionConfig {
                    model_path: model_path.into(),
                    name: name.to_string(),
                    output_name: None,
                    options,
                    model_options,
                    timeout,
                },
            )
            .map(PipelineHandle::FeatureExtraction),
            PipelineTask::TextClassification => TextClassificationPipeline::new(
                &session,
                TextClassificationConfig {
                    model_path: model_path.into(),
                    name: name.to_string(),
                    output_name: None,
                    options,
                    model_options,
                    timeout,
                },
            )
            .map(PipelineHandle::TextClassification),
        };
        pipeline.map_err(fail)
    })();
    match parsed {
        Ok(pipeline) => {
            *pipeline_out = handles::insert_pipeline(pipeline);
            TP_OK
        }
        Err(status) => status,
    }
}

/// Create a feature-extraction pipeline over the model directory at
/// `model_path`. `options` is an array of `n_options` key/value pairs.
#[no_mangle]
pub unsafe extern "C" fn tp_feature_extraction_create(
    session: TpSession,
    model_path: *const c_char,
    name: *const c_char,
    options: *const TpOption,
    n_options: usize,
    pipeline_out: *mut TpPipeline,
) -> TpStatus {
    catch_panic(|| {
        create_pipeline(
            session,
            model_path,
            name,
            options,
            n_options,
            PipelineTask::FeatureExtraction,
            pipeline_out,
        )
    })
}

/// Create a text-classification pipeline over the model directory at
/// `model_path`.
#[no_mangle]
pub unsafe extern "C" fn tp_text_classification_create(
    session: TpSession,
    model_path: *const c_char,
    name: *const c_char,
    options: *const TpOption,
    n_options: usize,
    pipeline_out: *mut TpPipeline,
) -> TpStatus {
    catch_panic(|| {
        create_pipeline(
            session,
            model_path,
            name,
            options,
            n_options,
            PipelineTask::TextClassification,
            pipeline_out,
        )
    })
}

/// Embed `n_inputs` strings. On success `*out` owns the embeddings.
#[no_mangle]
pub unsafe extern "C" fn tp_feature_extraction_run(
    pipeline: TpPipeline,
    inputs: *const *const c_char,
    n_inputs: usize,
    out: *mut TpEmbeddings,
) -> TpStatus {
    catch_panic(|| {
        if out.is_null() {
            return invalid_argument("out is null");
        }
        let result = (|| {
            let handle = handles::pipeline(pipeline)?;
            let PipelineHandle::FeatureExtraction(p) = handle.as_ref() else {
                return Err(invalid_argument("pipeline is not a feature-extraction pipeline"));
            };
            let texts = c_str_array(inputs, n_inputs)?;
            p.run(&texts).map_err(fail)
        })();
        match result {
            Ok(embeddings) => {
                let rows = embeddings.len();
                let dim = embeddings.first().map_or(0, Vec::len);
                let flat: Box<[f32]> = embeddings.into_iter().flatten().collect();
                *out = TpEmbeddings {
                    data: Box::into_raw(flat) as *mut f32,
                    rows,
                    dim,
                };
                TP_OK
            }
            Err(status) => status,
        }
    })
}

/// Classify `n_inputs` strings. On success `*out` owns the results.
#[no_mangle]
pub unsafe extern "C" fn tp_text_classification_run(
    pipeline: TpPipeline,
    inputs: *const *const c_char,
    n_inputs: usize,
    out: *mut TpClassifications,
) -> TpStatus {
    catch_panic(|| {
        if out.is_null() {
            return invalid_argument("out is null");
        }
        let result = (|| {
            let handle = handles::pipeline(pipeline)?;
            let PipelineHandle::TextClassification(p) = handle.as_ref() else {
                return Err(invalid_argument("pipeline is not a text-classification pipeline"));
            };
            let texts = c_str_array(inputs, n_inputs)?;
            p.run(&texts).map_err(fail)
        })();
        match result {
            Ok(rows) => {
                let counts: Box<[usize]> = rows.iter().map(Vec::len).collect();
                let scores: Box<[TpLabelScore]> = rows
                    .into_iter()
                    .flatten()
                    .map(|o| TpLabelScore {
                        label: CString::new(o.label.replace('\0', "")).unwrap_or_default().into_raw(),
                        score: o.score,
                    })
                    .collect();
                *out = TpClassifications {
                    total: scores.len(),
                    scores: Box::into_raw(scores) as *mut TpLabelScore,
                    rows: counts.len(),
                    counts: Box::into_raw(counts) as *mut usize,
                };
                TP_OK
            }
            Err(status) => status,
        }
    })
}

/// Destroy a pipeline. Unknown or already destroyed handles return
/// `TP_ERROR_RESOURCE`.
#[no_mangle]
pub extern "C" fn tp_pipeline_destroy(pipeline: TpPipeline) -> TpStatus {
    catch_panic(|| handles::remove_pipeline(pipeline))
}

/// Free embeddings written by `tp_feature_extraction_run` and reset the
/// struct. Null or already freed structs are a no-op.
#[no_mangle]
pub unsafe extern "C" fn tp_embeddings_free(embeddings: *mut TpEmbeddings) {
    let Some(e) = embeddings.as_mut() else { return };
    if !e.data.is_null() {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(e.data, e.rows * e.dim)));
    }
    *e = TpEmbeddings::default();
}

/// Free results written by `tp_text_classification_run` and reset the
/// struct.
#[no_mangle]
pub unsafe extern "C" fn tp_classifications_free(results: *mut TpClassifications) {
    let Some(r) = results.as_mut() else { return };
    if !r.scores.is_null() {
        let scores = Box::from_raw(std::ptr::slice_from_raw_parts_mut(r.scores, r.total));
        for score in scores.iter() {
            if !score.label.is_null() {
                drop(CString::from_raw(score.label));
            }
        }
    }
    if !r.counts.is_null() {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(r.counts, r.rows)));
    }
    *r = TpClassifications::default();
}

/// Retrieve the last error message on this thread, or null. The caller
/// must free the returned string with `tp_free_string`.
#[no_mangle]
pub extern "C" fn tp_last_error() -> *mut c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by `tp_last_error`.
#[no_mangle]
pub unsafe extern "C" fn tp_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tp_model::testing::{write_bert_fixture, HIDDEN};
    use tp_tokenizer::testing::{bert_tokenizer_json, BERT_VOCAB};

    fn model_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), bert_tokenizer_json()).unwrap();
        write_bert_fixture(&dir.path().join("model.gguf"), BERT_VOCAB, true).unwrap();
        dir
    }

    fn cstring(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    fn last_error() -> String {
        let ptr = tp_last_error();
        assert!(!ptr.is_null());
        let msg = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        unsafe { tp_free_string(ptr) };
        msg
    }

    fn create_session() -> TpSession {
        let backend = cstring("cpu");
        let mut session = 0;
        let status = unsafe { tp_session_create(backend.as_ptr(), std::ptr::null(), &mut session) };
        assert_eq!(status, TP_OK);
        assert_ne!(session, 0);
        session
    }

    unsafe fn create(
        task: PipelineTask,
        session: TpSession,
        dir: &tempfile::TempDir,
        name: &str,
        options: &[(&str, &str)],
    ) -> (TpStatus, TpPipeline) {
        let path = cstring(dir.path().to_str().unwrap());
        let name = cstring(name);
        let owned: Vec<(CString, CString)> = options.iter().map(|(k, v)| (cstring(k), cstring(v))).collect();
        let raw: Vec<TpOption> = owned
            .iter()
            .map(|(k, v)| TpOption {
                key: k.as_ptr(),
                value: v.as_ptr(),
            })
            .collect();
        let mut pipeline = 0;
        let create: unsafe extern "C" fn(
            TpSession,
            *const c_char,
            *const c_char,
            *const TpOption,
            usize,
            *mut TpPipeline,
        ) -> TpStatus = match task {
            PipelineTask::FeatureExtraction => tp_feature_extraction_create,
            PipelineTask::TextClassification => tp_text_classification_create,
        };
        let status = create(session, path.as_ptr(), name.as_ptr(), raw.as_ptr(), raw.len(), &mut pipeline);
        (status, pipeline)
    }

    fn inputs(texts: &[&str]) -> (Vec<CString>, Vec<*const c_char>) {
        let owned: Vec<CString> = texts.iter().map(|t| cstring(t)).collect();
        let ptrs = owned.iter().map(|c| c.as_ptr()).collect();
        (owned, ptrs)
    }

    #[test]
    fn test_session_double_destroy() {
        let session = create_session();
        assert_eq!(tp_session_destroy(session), TP_OK);
        assert_eq!(tp_session_destroy(session), TP_ERROR_RESOURCE);
        assert!(last_error().contains("already destroyed"));
        assert_eq!(tp_session_destroy(u64::MAX), TP_ERROR_RESOURCE);
    }

    #[test]
    fn test_session_create_errors() {
        let mut session = 0;
        let backend = cstring("tpu");
        let status = unsafe { tp_session_create(backend.as_ptr(), std::ptr::null(), &mut session) };
        assert_eq!(status, TP_ERROR_CONFIGURATION);
        assert!(last_error().contains("tpu"));

        let backend = cstring("cpu");
        let options = cstring(r#"{"execution_provider": {"kind": "cuda"}}"#);
        let status = unsafe { tp_session_create(backend.as_ptr(), options.as_ptr(), &mut session) };
        assert_eq!(status, TP_ERROR_CONFIGURATION);

        let status = unsafe { tp_session_create(std::ptr::null(), std::ptr::null(), &mut session) };
        assert_eq!(status, TP_ERROR_INVALID_ARGUMENT);
    }

    #[test]
    fn test_feature_extraction() {
        let dir = model_dir();
        let session = create_session();
        let (status, pipeline) = unsafe {
            create(
                PipelineTask::FeatureExtraction,
                session,
                &dir,
                "embed",
                &[("normalize-embeddings", "true")],
            )
        };
        assert_eq!(status, TP_OK);

        let (_owned, ptrs) = inputs(&["the movie was great", "bad"]);
        let mut out = TpEmbeddings::default();
        let status = unsafe { tp_feature_extraction_run(pipeline, ptrs.as_ptr(), ptrs.len(), &mut out) };
        assert_eq!(status, TP_OK);
        assert_eq!((out.rows, out.dim), (2, HIDDEN));
        let data = unsafe { std::slice::from_raw_parts(out.data, out.rows * out.dim) };
        for row in data.chunks(out.dim) {
            let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);
        }
        unsafe {
            tp_embeddings_free(&mut out);
            tp_embeddings_free(&mut out);
        }
        assert!(out.data.is_null());

        assert_eq!(tp_pipeline_destroy(pipeline), TP_OK);
        assert_eq!(tp_pipeline_destroy(pipeline), TP_ERROR_RESOURCE);
        assert_eq!(tp_session_destroy(session), TP_OK);
    }

    #[test]
    fn test_text_classification() {
        let dir = model_dir();
        let session = create_session();
        let (status, pipeline) = unsafe { create(PipelineTask::TextClassification, session, &dir, "sentiment", &[]) };
        assert_eq!(status, TP_OK);

        let (_owned, ptrs) = inputs(&["good", "bad"]);
        let mut out = TpClassifications::default();
        let status = unsafe { tp_text_classification_run(pipeline, ptrs.as_ptr(), ptrs.len(), &mut out) };
        assert_eq!(status, TP_OK);
        assert_eq!((out.rows, out.total), (2, 2));
        let counts = unsafe { std::slice::from_raw_parts(out.counts, out.rows) };
        assert_eq!(counts, &[1, 1]);
        let scores = unsafe { std::slice::from_raw_parts(out.scores, out.total) };
        let labels: Vec<String> = scores
            .iter()
            .map(|s| unsafe { CStr::from_ptr(s.label) }.to_string_lossy().into_owned())
            .collect();
        assert_eq!(labels, ["positive", "negative"]);
        assert!(scores.iter().all(|s| s.score > 0.5 && s.score <= 1.0));
        unsafe { tp_classifications_free(&mut out) };
        assert!(out.scores.is_null());

        // A feature-extraction run on a classification handle is rejected.
        let mut embeddings = TpEmbeddings::default();
        let status = unsafe { tp_feature_extraction_run(pipeline, ptrs.as_ptr(), ptrs.len(), &mut embeddings) };
        assert_eq!(status, TP_ERROR_INVALID_ARGUMENT);

        assert_eq!(tp_session_destroy(session), TP_OK);
        let status = unsafe { tp_text_classification_run(pipeline, ptrs.as_ptr(), ptrs.len(), &mut out) };
        assert_eq!(status, TP_ERROR_RESOURCE);
        assert_eq!(tp_pipeline_destroy(pipeline), TP_OK);
    }

    #[test]
    fn test_pipeline_option_errors() {
        let dir = model_dir();
        let session = create_session();
        let cases: &[(&str, &str)] = &[("pooling", "cls"), ("label-mode", "multi"), ("tokenizer", "native")];
        for option in cases {
            let (status, _) = unsafe { create(PipelineTask::FeatureExtraction, session, &dir, "embed", &[*option]) };
            assert_eq!(status, TP_ERROR_CONFIGURATION, "{:?}", option);
        }
        let missing = tempfile::tempdir().unwrap();
        let (status, _) = unsafe { create(PipelineTask::FeatureExtraction, session, &missing, "embed", &[]) };
        assert_eq!(status, TP_ERROR_LOAD);
        assert_eq!(tp_session_destroy(session), TP_OK);

        let (status, _) = unsafe { create(PipelineTask::FeatureExtraction, session, &dir, "embed", &[]) };
        assert_eq!(status, TP_ERROR_RESOURCE);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        assert_eq!(tp_init_logging(), TP_OK);
        assert_eq!(tp_init_logging(), TP_OK);
    }
}
