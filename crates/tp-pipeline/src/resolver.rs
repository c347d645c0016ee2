//! Turning a model identifier into a local model directory.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::session::TOKENIZER_FILE;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Branch, tag or commit for resolvers that track versions.
    pub revision: Option<String>,
    /// Files that must exist in the resolved directory besides
    /// `tokenizer.json`.
    pub required_files: Vec<String>,
}

/// Locates (and for remote implementations, fetches) a model directory.
pub trait ModelResolver: Send + Sync {
    /// Resolves `id` to a directory, using `dest` as the directory that
    /// holds already acquired models.
    fn resolve(&self, id: &str, dest: &Path, options: &ResolveOptions) -> Result<PathBuf>;
}

/// Resolves ids naming directories that already exist: `id` itself, or
/// `dest/id`. Never downloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalResolver;

impl ModelResolver for LocalResolver {
    fn resolve(&self, id: &str, dest: &Path, options: &ResolveOptions) -> Result<PathBuf> {
        if let Some(revision) = &options.revision {
            return Err(PipelineError::config(format!(
                "local models have no revisions (asked for '{}')",
                revision
            )));
        }
        let candidates = [PathBuf::from(id), dest.join(id)];
        let dir = candidates
            .iter()
            .find(|p| p.is_dir())
            .ok_or_else(|| PipelineError::load(dest.join(id), "no such model directory"))?;

        let required = std::iter::once(TOKENIZER_FILE).chain(options.required_files.iter().map(String::as_str));
        for file in required {
            if !dir.join(file).is_file() {
                return Err(PipelineError::load(dir.join(file), "required model file missing"));
            }
        }
        debug!(id, dir = %dir.display(), "resolved local model");
        Ok(dir.clone())
    }
}
