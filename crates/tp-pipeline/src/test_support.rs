//! Fixture model directories for this crate's tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tp_model::testing::write_bert_fixture;
use tp_model::ModelMetadata;
use tp_tokenizer::testing::{bert_tokenizer_json, BERT_VOCAB};

use crate::engine::{EngineInputs, EngineOutputs, GraphInfo, InferenceEngine, ModelId};
use crate::error::Result;
use crate::options::BackendKind;
use crate::session::{CONFIG_FILE, TOKENIZER_FILE};

pub(crate) struct ModelDirOptions {
    pub classifier: bool,
    pub config_json: Option<String>,
}

impl ModelDirOptions {
    pub fn classifier() -> Self {
        ModelDirOptions {
            classifier: true,
            config_json: None,
        }
    }

    pub fn encoder() -> Self {
        ModelDirOptions {
            classifier: false,
            config_json: None,
        }
    }
}

/// A temporary directory holding `tokenizer.json`, `model.gguf` and
/// optionally `config.json`.
pub(crate) fn model_dir(options: ModelDirOptions) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(TOKENIZER_FILE), bert_tokenizer_json()).unwrap();
    write_bert_fixture(&dir.path().join("model.gguf"), BERT_VOCAB, options.classifier).unwrap();
    if let Some(config) = options.config_json {
        std::fs::write(dir.path().join(CONFIG_FILE), config).unwrap();
    }
    dir
}

/// Counts runs of a [`RecordingEngine`], shared across threads.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub finished: AtomicUsize,
}

impl RunCounters {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// An engine whose runs sleep for `delay` and record how many overlap.
/// It registers any weights file without reading it.
#[derive(Debug)]
pub(crate) struct RecordingEngine {
    pub thread_safe: bool,
    pub delay: Duration,
    pub counters: Arc<RunCounters>,
}

impl RecordingEngine {
    pub fn new(thread_safe: bool, delay: Duration, counters: &Arc<RunCounters>) -> Self {
        RecordingEngine {
            thread_safe,
            delay,
            counters: Arc::clone(counters),
        }
    }
}

impl InferenceEngine for RecordingEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    fn default_weights_file(&self) -> &'static str {
        "model.gguf"
    }

    fn load(&mut self, _weights: &Path, _metadata: Option<&ModelMetadata>) -> Result<(ModelId, GraphInfo)> {
        Ok((
            ModelId(0),
            GraphInfo {
                capacity: Some(16),
                labels: None,
                wants_type_ids: true,
            },
        ))
    }

    fn run(&self, _id: ModelId, _inputs: &EngineInputs) -> Result<EngineOutputs> {
        let c = &self.counters;
        let now = c.active.fetch_add(1, Ordering::SeqCst) + 1;
        c.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        c.active.fetch_sub(1, Ordering::SeqCst);
        c.finished.fetch_add(1, Ordering::SeqCst);
        Ok(EngineOutputs::new())
    }

    fn unload(&mut self, _id: ModelId) {}
}
