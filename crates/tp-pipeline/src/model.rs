use std::path::{Path, PathBuf};

use tp_model::ModelMetadata;
use tp_tokenizer::Tokenizer;

use crate::engine::{GraphInfo, ModelId};
use crate::options::BackendKind;

/// Model capacity used when neither `config.json` nor the graph states one.
pub const DEFAULT_CAPACITY: usize = 512;

/// Where a model's graph lives: engine handle, backend and owning session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Registration {
    pub id: ModelId,
    pub backend: BackendKind,
    pub session_id: u64,
}

/// A model directory loaded into one session: its tokenizer, metadata and
/// the engine's graph handle. Immutable after load.
#[derive(Debug)]
pub struct Model {
    pub(crate) path: PathBuf,
    pub(crate) tokenizer: Tokenizer,
    pub(crate) metadata: Option<ModelMetadata>,
    pub(crate) labels: Option<Vec<String>>,
    pub(crate) capacity: usize,
    pub(crate) wants_type_ids: bool,
    pub(crate) id: ModelId,
    pub(crate) backend: BackendKind,
    pub(crate) session_id: u64,
}

impl Model {
    pub(crate) fn new(
        path: PathBuf,
        tokenizer: Tokenizer,
        metadata: Option<ModelMetadata>,
        config_labels: Option<Vec<String>>,
        graph: GraphInfo,
        registration: Registration,
    ) -> Self {
        let capacity = metadata
            .as_ref()
            .and_then(|m| m.max_position_embeddings)
            .or(graph.capacity)
            .unwrap_or(DEFAULT_CAPACITY);
        Model {
            path,
            tokenizer,
            labels: config_labels.or(graph.labels),
            metadata,
            capacity,
            wants_type_ids: graph.wants_type_ids,
            id: registration.id,
            backend: registration.backend,
            session_id: registration.session_id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }

    /// Class labels from `config.json`, else from the weights.
    pub fn labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    /// Longest token sequence the model accepts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn is_multi_label(&self) -> bool {
        self.metadata.as_ref().is_some_and(ModelMetadata::is_multi_label)
    }
}
