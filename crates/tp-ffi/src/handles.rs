//! Handle tables for the objects C callers hold.
//!
//! Callers only ever see integer handles, so a stale or repeated handle is
//! a lookup miss reported as `TP_ERROR_RESOURCE`, never a dangling pointer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tp_pipeline::{FeatureExtractionPipeline, ResourceError, Session, Stage, TextClassificationPipeline};

use crate::error::{fail, set_last_error};
use crate::types::*;

pub enum PipelineHandle {
    FeatureExtraction(FeatureExtractionPipeline),
    TextClassification(TextClassificationPipeline),
}

/// Live objects by handle. Sessions and pipelines draw handles from
/// separate counters and a handle is never reused, so a session handle at
/// or below `last_session` that is missing from the table was destroyed.
#[derive(Default)]
struct Registry {
    last_session: TpSession,
    last_pipeline: TpPipeline,
    sessions: HashMap<TpSession, Session>,
    pipelines: HashMap<TpPipeline, Arc<PipelineHandle>>,
}

impl Registry {
    fn was_issued(&self, handle: TpSession) -> bool {
        handle != 0 && handle <= self.last_session
    }
}

fn registry() -> MutexGuard<'static, Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Mutex::new(Registry::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unknown(kind: &str, handle: u64) -> TpStatus {
    set_last_error(format!("unknown {} handle {}", kind, handle));
    TP_ERROR_RESOURCE
}

pub fn insert_session(session: Session) -> TpSession {
    let mut reg = registry();
    reg.last_session += 1;
    let handle = reg.last_session;
    reg.sessions.insert(handle, session);
    handle
}

pub fn session(handle: TpSession) -> Result<Session, TpStatus> {
    let reg = registry();
    match reg.sessions.get(&handle) {
        Some(session) => Ok(session.clone()),
        None if reg.was_issued(handle) => Err(fail(ResourceError::UseAfterDestroy(Stage::Load).into())),
        None => Err(unknown("session", handle)),
    }
}

pub fn destroy_session(handle: TpSession) -> TpStatus {
    let session = {
        let mut reg = registry();
        match reg.sessions.remove(&handle) {
            Some(session) => session,
            None if reg.was_issued(handle) => return fail(ResourceError::AlreadyDestroyed.into()),
            None => return unknown("session", handle),
        }
    };
    // Outside the registry lock: destroy waits for runs in flight.
    match session.destroy() {
        Ok(()) => TP_OK,
        Err(e) => fail(e),
    }
}

pub fn insert_pipeline(pipeline: PipelineHandle) -> TpPipeline {
    let mut reg = registry();
    reg.last_pipeline += 1;
    let handle = reg.last_pipeline;
    reg.pipelines.insert(handle, Arc::new(pipeline));
    handle
}

pub fn pipeline(handle: TpPipeline) -> Result<Arc<PipelineHandle>, TpStatus> {
    registry()
        .pipelines
        .get(&handle)
        .cloned()
        .ok_or_else(|| unknown("pipeline", handle))
}

pub fn remove_pipeline(handle: TpPipeline) -> TpStatus {
    let removed = registry().pipelines.remove(&handle);
    match removed {
        Some(_) => TP_OK,
        None => unknown("pipeline", handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::take_last_error;
    use tp_pipeline::{BackendKind, SessionOptions};

    fn cpu_session() -> Session {
        Session::new(BackendKind::Cpu, SessionOptions::default()).unwrap()
    }

    fn last_error() -> String {
        take_last_error().unwrap().into_string().unwrap()
    }

    #[test]
    fn test_destroyed_sessions_leave_no_entry() {
        let handles: Vec<TpSession> = (0..8).map(|_| insert_session(cpu_session())).collect();
        for &h in &handles {
            assert_eq!(destroy_session(h), TP_OK);
        }
        let reg = registry();
        assert!(handles.iter().all(|h| !reg.sessions.contains_key(h)));
    }

    #[test]
    fn test_destroyed_and_unknown_handles() {
        let h = insert_session(cpu_session());
        assert!(session(h).is_ok());
        assert_eq!(destroy_session(h), TP_OK);

        assert_eq!(destroy_session(h), TP_ERROR_RESOURCE);
        assert!(last_error().contains("already destroyed"));
        assert_eq!(session(h).unwrap_err(), TP_ERROR_RESOURCE);
        assert!(last_error().contains("after destroy"));

        assert_eq!(destroy_session(u64::MAX), TP_ERROR_RESOURCE);
        assert!(last_error().contains("unknown session handle"));
        assert_eq!(session(0).unwrap_err(), TP_ERROR_RESOURCE);
        assert!(last_error().contains("unknown"));
    }
}
