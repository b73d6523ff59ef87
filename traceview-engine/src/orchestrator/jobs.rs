//! Registry of in-flight orchestrator jobs (spec §4.6), so the view layer
//! can hand a small `JobId` around instead of holding every `JobHandle`
//! itself. Grounded on `cognitod::metrics`'s atomic-counter-keyed registry
//! style, generalized from counters to job handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::orchestrator::future::{JobHandle, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

/// Tracks every job spawned against one `Trace`, for lookup-by-id and for
/// sweeping finished entries so the table doesn't grow unbounded across a
/// long-lived session.
pub struct JobTable {
    next_id: AtomicU64,
    jobs: Mutex<HashMap<JobId, Arc<JobHandle>>>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable {
            next_id: AtomicU64::new(1),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, handle: JobHandle) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.jobs.lock().unwrap().insert(id, Arc::new(handle));
        id
    }

    pub fn get(&self, id: JobId) -> Option<Arc<JobHandle>> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    /// Drops every job whose last observed snapshot is terminal
    /// (`Success`/`Error`/`Cancelled`). Called opportunistically by the
    /// view layer, not on a timer.
    pub fn sweep_finished(&self) {
        self.jobs.lock().unwrap().retain(|_, handle| handle.snapshot().status == JobStatus::Busy);
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traceview_common::NodeId;

    #[tokio::test]
    async fn register_then_lookup_by_id_finds_handle() {
        let table = JobTable::new();
        let handle = crate::orchestrator::future::spawn_job(NodeId::new(0), "test", |_r| async { Ok(()) });
        let id = table.register(handle);
        assert!(table.get(id).is_some());
        assert!(table.get(JobId(9999)).is_none());
    }

    #[tokio::test]
    async fn sweep_finished_drops_completed_jobs() {
        let table = JobTable::new();
        let handle = crate::orchestrator::future::spawn_job(NodeId::new(0), "test", |_r| async { Ok(()) });
        let id = table.register(handle);
        table.get(id).unwrap().join().await.unwrap();
        table.sweep_finished();
        assert!(table.is_empty());
    }
}
