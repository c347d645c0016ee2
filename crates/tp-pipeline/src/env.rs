//! Process-wide backend environments.
//!
//! Some engines keep global state (the ONNX Runtime environment). The first
//! session of a backend initializes it under the registry lock, later
//! sessions share it, and the last one to go tears it down.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use tracing::{debug, info};

use crate::error::Result;
use crate::options::BackendKind;

fn registry() -> &'static Mutex<HashMap<BackendKind, usize>> {
    static REGISTRY: OnceLock<Mutex<HashMap<BackendKind, usize>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock() -> std::sync::MutexGuard<'static, HashMap<BackendKind, usize>> {
    // A panic inside an init hook leaves the counts valid.
    registry().lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One session's share of a backend environment. Dropping it releases
/// the share.
#[derive(Debug)]
pub struct EnvGuard {
    kind: BackendKind,
}

impl EnvGuard {
    /// Takes a share, running the backend's init hook when this is the
    /// first one.
    pub fn acquire(kind: BackendKind) -> Result<EnvGuard> {
        let mut counts = lock();
        let refs = counts.entry(kind).or_insert(0);
        if *refs == 0 {
            init(kind)?;
            info!(backend = %kind, "backend environment initialized");
        }
        *refs += 1;
        debug!(backend = %kind, sessions = *refs, "backend environment acquired");
        Ok(EnvGuard { kind })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        let mut counts = lock();
        if let Some(refs) = counts.get_mut(&self.kind) {
            *refs = refs.saturating_sub(1);
            if *refs == 0 {
                counts.remove(&self.kind);
                teardown(self.kind);
                info!(backend = %self.kind, "backend environment released");
            }
        }
    }
}

/// Sessions currently sharing the environment of `kind`.
pub fn active_sessions(kind: BackendKind) -> usize {
    lock().get(&kind).copied().unwrap_or(0)
}

fn init(kind: BackendKind) -> Result<()> {
    match kind {
        #[cfg(feature = "ort")]
        BackendKind::Ort => crate::engine::ort::init_environment(),
        _ => Ok(()),
    }
}

fn teardown(kind: BackendKind) {
    match kind {
        #[cfg(feature = "ort")]
        BackendKind::Ort => crate::engine::ort::release_environment(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Candle needs no global state, so its counts are only touched here.
    #[test]
    fn test_refcounting() {
        let kind = BackendKind::Candle;
        let before = active_sessions(kind);
        let a = EnvGuard::acquire(kind).unwrap();
        let b = EnvGuard::acquire(kind).unwrap();
        assert_eq!(active_sessions(kind), before + 2);
        drop(a);
        assert_eq!(active_sessions(kind), before + 1);
        drop(b);
        assert_eq!(active_sessions(kind), before);
        assert_eq!(EnvGuard::acquire(kind).unwrap().kind(), kind);
    }
}
