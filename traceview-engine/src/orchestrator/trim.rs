//! `save_trimmed` / export (spec §4.6 "Export / trim"). The orchestrator's
//! part is thin: the byte-level work of attaching the source database,
//! copying schema, and inserting only the rows inside `[start, end]` lives
//! in `BackingStore::save_trimmed` (spec §6.3), grounded on `SqliteStore`'s
//! `VACUUM INTO` based implementation. This module just turns that single
//! blocking-ish call into a cancellable, progress-reporting job.

use std::path::Path;
use std::sync::Arc;

use traceview_common::Timestamp;

use crate::model::trace::Trace;
use crate::orchestrator::future::{spawn_job, JobHandle};

/// Spawns a job that writes a trimmed copy of `trace`'s database,
/// containing only the time-carrying rows overlapping `[start, end]`, to
/// `dest_path` (spec §4.6 "Export / trim").
pub fn save_trimmed(trace: Arc<Trace>, start: Timestamp, end: Timestamp, dest_path: impl AsRef<Path>) -> JobHandle {
    let dest_path = dest_path.as_ref().to_path_buf();
    let node = trace.store().node_id();
    spawn_job(node, "trim", move |reporter| async move {
        reporter.report(0, "trimming database");
        trace.store().save_trimmed(start.as_nanos(), end.as_nanos(), &dest_path).await?;
        reporter.report(100, "trim complete");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::EngineContext;
    use crate::error::Result;
    use crate::interner::StringInterner;
    use crate::memory::MemoryManager;
    use crate::orchestrator::future::JobStatus;
    use crate::store::{BackingStore, ColumnDef, ColumnValue, RowControl, StoreKind};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use traceview_common::NodeId;

    struct RecordingStore {
        trimmed: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BackingStore for RecordingStore {
        fn kind(&self) -> StoreKind {
            StoreKind::Rocpd
        }
        fn node_id(&self) -> NodeId {
            NodeId::new(0)
        }
        async fn execute(&self, _sql: &str, _row_cb: &mut (dyn FnMut(&[ColumnValue]) -> RowControl + Send), _cancel: &AtomicBool) -> Result<()> {
            Ok(())
        }
        async fn create_table(&self, _name: &str, _columns: &[ColumnDef]) -> Result<()> {
            Ok(())
        }
        async fn drop_table(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn drop_index(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn run_transaction(&self, _stmts: &[String]) -> Result<()> {
            Ok(())
        }
        async fn save_trimmed(&self, _start_ns: i64, _end_ns: i64, _dest_path: &std::path::Path) -> Result<()> {
            self.trimmed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn save_trimmed_invokes_store_and_reports_success() {
        let ctx = Arc::new(EngineContext::with_fixed_phys_avail(EngineConfig::default(), 1_000_000_000));
        let memory = MemoryManager::new(ctx, 0);
        let store = Arc::new(RecordingStore { trimmed: AtomicUsize::new(0) });
        let trace = Arc::new(Trace::new(store.clone(), Arc::new(StringInterner::new()), memory));

        let handle = save_trimmed(trace, Timestamp::new(0), Timestamp::new(1_000), "/tmp/trimmed.rocpd");
        handle.join().await.unwrap();
        assert_eq!(handle.snapshot().status, JobStatus::Success);
        assert_eq!(store.trimmed.load(Ordering::SeqCst), 1);
    }
}
