use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use tp_model::ModelMetadata;
use tp_tokenizer::{Tokenizer, TokenizerError};

use crate::engine::{self, Engine, EngineInputs, EngineOutputs};
use crate::env::EnvGuard;
use crate::error::{PipelineError, ResourceError, Result, Stage};
use crate::model::{Model, Registration};
use crate::options::{BackendKind, ModelOptions, SessionOptions};

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// Lock helpers: a panic while a lock is held cannot leave the guarded
// state half-written, so poisoning is ignored.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug)]
struct SessionInner {
    id: u64,
    kind: BackendKind,
    /// `None` once destroyed.
    engine: RwLock<Option<Engine>>,
    /// Serializes runs on engines that are not thread-safe.
    run_gate: Mutex<()>,
    models: Mutex<HashMap<PathBuf, Arc<Model>>>,
    pipelines: Mutex<HashSet<String>>,
    /// Dropped after the engine.
    env: Mutex<Option<EnvGuard>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let engine = self.engine.get_mut().unwrap_or_else(|p| p.into_inner());
        if engine.take().is_some() {
            debug!(session = self.id, backend = %self.kind, "session dropped without destroy, engine released");
        }
    }
}

/// A backend engine plus the models loaded into it.
///
/// Cloning shares the session. The engine is released by [`Session::destroy`]
/// or when the last clone (including those held by pipelines) is dropped.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(kind: BackendKind, options: SessionOptions) -> Result<Session> {
        if !kind.is_compiled() {
            return Err(PipelineError::config(format!(
                "backend {} is not compiled in (enable the '{}' feature)",
                kind, kind
            )));
        }
        let env = EnvGuard::acquire(kind)?;
        let engine = Engine::new(kind, &options)?;
        debug!(backend = %kind, provider = %options.execution_provider, "engine ready");
        Ok(Session::from_engine(kind, env, engine))
    }

    fn from_engine(kind: BackendKind, env: EnvGuard, engine: Engine) -> Session {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            session = id,
            backend = %kind,
            thread_safe = engine.as_dyn().is_thread_safe(),
            "session created"
        );
        Session {
            inner: Arc::new(SessionInner {
                id,
                kind,
                engine: RwLock::new(Some(engine)),
                run_gate: Mutex::new(()),
                models: Mutex::new(HashMap::new()),
                pipelines: Mutex::new(HashSet::new()),
                env: Mutex::new(Some(env)),
            }),
        }
    }

    /// A session over a hand-built engine.
    #[cfg(test)]
    pub(crate) fn with_engine(engine: Engine) -> Result<Session> {
        let kind = engine.as_dyn().kind();
        Ok(Session::from_engine(kind, EnvGuard::acquire(kind)?, engine))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.kind
    }

    pub fn is_destroyed(&self) -> bool {
        read(&self.inner.engine).is_none()
    }

    /// Loads a model directory, or returns the already loaded one.
    ///
    /// Reads `tokenizer.json`, the optional `config.json` and the backend's
    /// weights file, and registers the graph with the engine. The tokenizer
    /// engine must be compatible with the backend.
    pub fn load_model(&self, path: impl AsRef<Path>, options: &ModelOptions) -> Result<Arc<Model>> {
        let path = path.as_ref();
        if self.is_destroyed() {
            return Err(ResourceError::UseAfterDestroy(Stage::Load).into());
        }
        let dir = std::fs::canonicalize(path).map_err(|e| PipelineError::load(path, e))?;
        if !dir.is_dir() {
            return Err(PipelineError::load(&dir, "not a model directory"));
        }

        let mut models = lock(&self.inner.models);
        if let Some(model) = models.get(&dir) {
            if let Some(requested) = options.tokenizer.filter(|r| *r != model.tokenizer.runtime()) {
                return Err(PipelineError::config(format!(
                    "{} is already loaded with the {} tokenizer, not {}",
                    dir.display(),
                    model.tokenizer.runtime(),
                    requested
                )));
            }
            return Ok(Arc::clone(model));
        }

        let runtime = engine::select_tokenizer(self.inner.kind, options.tokenizer)?;
        let tokenizer_path = dir.join(TOKENIZER_FILE);
        let tokenizer = Tokenizer::from_file(runtime, &tokenizer_path).map_err(|e| match e {
            TokenizerError::RuntimeUnavailable(_) => PipelineError::config(e.to_string()),
            other => PipelineError::load(&tokenizer_path, other),
        })?;

        let config_path = dir.join(CONFIG_FILE);
        let metadata = if config_path.is_file() {
            Some(ModelMetadata::from_file(&config_path).map_err(|e| PipelineError::load(&config_path, e))?)
        } else {
            None
        };
        let config_labels = match &metadata {
            Some(m) => m.labels().map_err(|e| PipelineError::load(&config_path, e))?,
            None => None,
        };

        let mut guard = write(&self.inner.engine);
        let engine = guard
            .as_mut()
            .ok_or(ResourceError::UseAfterDestroy(Stage::Load))?
            .as_dyn_mut();
        let weights = dir.join(
            options
                .weights_file
                .as_deref()
                .unwrap_or(engine.default_weights_file()),
        );
        if !weights.is_file() {
            return Err(PipelineError::load(&weights, "weights file not found"));
        }
        let (id, graph) = engine.load(&weights, metadata.as_ref())?;
        drop(guard);

        let model = Arc::new(Model::new(
            dir.clone(),
            tokenizer,
            metadata,
            config_labels,
            graph,
            Registration {
                id,
                backend: self.inner.kind,
                session_id: self.inner.id,
            },
        ));
        info!(
            session = self.inner.id,
            path = %dir.display(),
            tokenizer = %runtime,
            capacity = model.capacity(),
            labels = model.labels().map_or(0, <[String]>::len),
            "model loaded"
        );
        models.insert(dir, Arc::clone(&model));
        Ok(model)
    }

    /// Models currently loaded, in no particular order.
    pub fn models(&self) -> Vec<Arc<Model>> {
        lock(&self.inner.models).values().cloned().collect()
    }

    /// Runs one batch through a model's graph.
    ///
    /// Thread-safe engines run concurrently; others take the session's run
    /// gate. `destroy` waits for runs in flight.
    pub fn run(&self, model: &Model, inputs: &EngineInputs) -> Result<EngineOutputs> {
        if model.session_id != self.inner.id {
            return Err(PipelineError::config(format!(
                "model {} belongs to a different session",
                model.path().display()
            )));
        }
        let guard = read(&self.inner.engine);
        let engine = guard
            .as_ref()
            .ok_or(ResourceError::UseAfterDestroy(Stage::Infer))?
            .as_dyn();
        let _gate = (!engine.is_thread_safe()).then(|| lock(&self.inner.run_gate));
        engine.run(model.id, inputs)
    }

    /// Like [`Session::run`], but stops waiting after `timeout`.
    ///
    /// The engine call itself cannot be interrupted: it keeps running on
    /// its worker thread and its result is discarded.
    pub fn run_with_timeout(
        &self,
        model: &Arc<Model>,
        inputs: EngineInputs,
        timeout: Duration,
    ) -> Result<EngineOutputs> {
        let session = self.clone();
        let model = Arc::clone(model);
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name(format!("tp-session-{}", self.inner.id))
            .spawn(move || {
                // The receiver is gone when the caller timed out.
                let _ = tx.send(session.run(&model, &inputs));
            })
            .map_err(|e| PipelineError::inference(Stage::Infer, format!("spawning worker: {}", e)))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(session = self.inner.id, ?timeout, "inference timed out");
                Err(PipelineError::inference(Stage::Infer, format!("timed out after {:?}", timeout)))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::inference(
                Stage::Infer,
                "worker exited without a result",
            )),
        }
    }

    /// Releases the engine and every loaded model.
    pub fn destroy(&self) -> Result<()> {
        let Some(mut engine) = write(&self.inner.engine).take() else {
            return Err(ResourceError::AlreadyDestroyed.into());
        };
        let models: Vec<Arc<Model>> = lock(&self.inner.models).drain().map(|(_, m)| m).collect();
        for model in &models {
            engine.as_dyn_mut().unload(model.id);
        }
        drop(engine);
        lock(&self.inner.pipelines).clear();
        lock(&self.inner.env).take();
        info!(session = self.inner.id, backend = %self.inner.kind, models = models.len(), "session destroyed");
        Ok(())
    }

    pub(crate) fn register_pipeline(&self, name: &str) -> Result<()> {
        if self.is_destroyed() {
            return Err(ResourceError::UseAfterDestroy(Stage::Load).into());
        }
        if !lock(&self.inner.pipelines).insert(name.to_string()) {
            return Err(PipelineError::config(format!(
                "a pipeline named '{}' already exists in this session",
                name
            )));
        }
        Ok(())
    }

    pub(crate) fn release_pipeline(&self, name: &str) {
        lock(&self.inner.pipelines).remove(name);
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.pipelines).iter().cloned().collect();
        names.sort();
        names
    }
}
