use std::sync::{Arc, RwLock};

use crate::pipeline::PipelineResult;

/// What a reader sees: either nothing yet, or one complete run.
#[derive(Debug, Clone)]
pub enum Snapshot {
    Initializing,
    Ready(Arc<PipelineResult>),
}

impl Snapshot {
    pub fn result(&self) -> Option<&Arc<PipelineResult>> {
        match self {
            Snapshot::Initializing => None,
            Snapshot::Ready(r) => Some(r),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Snapshot::Ready(_))
    }
}

/// Shared handle to the most recently published result.
///
/// The lock is only held to clone or replace the inner `Arc`, never while
/// computing, so readers do not wait on a running cycle. A published result
/// is replaced wholesale; it is never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Option<Arc<PipelineResult>>>>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Snapshot {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(r) => Snapshot::Ready(Arc::clone(r)),
            None => Snapshot::Initializing,
        }
    }

    /// Swap in a new result, returning the one it replaced.
    pub fn publish(&self, result: Arc<PipelineResult>) -> Option<Arc<PipelineResult>> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.replace(result)
    }

    pub fn is_ready(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}
