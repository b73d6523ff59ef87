//! The `Future`/progress-callback contract every long-running orchestrator
//! operation returns (spec §4.6). Grounded on the progress-callback
//! vocabulary of `cognitod::runtime` (worker reports progress without
//! blocking on the consumer), reimplemented with a `tokio::sync::watch`
//! channel instead of a raw callback pointer so the consumer can poll or
//! await without the producer ever blocking on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use traceview_common::NodeId;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Busy,
    Success,
    Error,
    Cancelled,
}

/// One polled snapshot of a job's progress (spec's callback arguments,
/// minus `filename`/`user_data` which are the job's own closure state
/// rather than anything the channel needs to carry).
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub progress_percent: u8,
    pub status: JobStatus,
    pub message: String,
    pub rows_processed: u64,
    pub rows_estimate: u64,
}

impl ProgressSnapshot {
    fn starting() -> Self {
        ProgressSnapshot {
            progress_percent: 0,
            status: JobStatus::Busy,
            message: String::new(),
            rows_processed: 0,
            rows_estimate: 0,
        }
    }
}

/// Producer-side handle, held by the worker task, used to publish progress
/// and to check `interrupted_flag` between rows.
pub struct ProgressReporter {
    tx: watch::Sender<ProgressSnapshot>,
    interrupted: Arc<AtomicBool>,
}

impl ProgressReporter {
    pub fn report(&self, percent: u8, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|s| {
            s.progress_percent = percent;
            s.message = message;
        });
    }

    pub fn advance_rows(&self, rows_processed: u64, rows_estimate: u64) {
        self.tx.send_modify(|s| {
            s.rows_processed = rows_processed;
            s.rows_estimate = rows_estimate;
        });
    }

    /// Checked in row-streaming loops (spec §4.6 "workers to break out of
    /// row loops"); also passed straight through to `BackingStore::execute`'s
    /// `cancel` parameter.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn is_cancelled(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

/// Consumer-side handle returned to the view layer (spec's `Future`).
/// `link_to_db` names which store-node the job is bound to.
pub struct JobHandle {
    rx: watch::Receiver<ProgressSnapshot>,
    interrupted: Arc<AtomicBool>,
    link_to_db: NodeId,
    join: AsyncMutex<Option<JoinHandle<Result<()>>>>,
}

impl JobHandle {
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.rx.borrow().clone()
    }

    pub fn link_to_db(&self) -> NodeId {
        self.link_to_db
    }

    /// Requests cancellation (spec §4.6 "Cancellation"). Does not block;
    /// the worker observes `interrupted_flag` at its next row or segment
    /// boundary.
    pub fn cancel(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Awaits completion, returning the job's own result (spec's
    /// `promise`). Safe to call more than once; later calls see `Ok(())`
    /// since the task has already been reaped.
    pub async fn join(&self) -> Result<()> {
        let handle = self.join.lock().await.take();
        match handle {
            Some(h) => h.await.map_err(|e| EngineError::DbAbort(e.to_string()))?,
            None => Ok(()),
        }
    }
}

/// Spawns `work` on the tokio runtime, wiring a progress channel and
/// cancellation flag through to it, and returns the consumer-side handle
/// immediately without waiting for `work` to make any progress.
///
/// Opens a `tracing` span over the spawned task carrying `trace_id` (from
/// `link_to_db`) and `job_kind`, so a single trace's worker activity can be
/// correlated in the log output regardless of how many jobs run against it
/// concurrently.
pub fn spawn_job<F, Fut>(link_to_db: NodeId, job_kind: &'static str, work: F) -> JobHandle
where
    F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let (tx, rx) = watch::channel(ProgressSnapshot::starting());
    let interrupted = Arc::new(AtomicBool::new(false));
    let reporter = ProgressReporter {
        tx: tx.clone(),
        interrupted: Arc::clone(&interrupted),
    };

    let span = tracing::info_span!("orchestrator_job", trace_id = link_to_db.get(), job_kind);
    let join = tokio::spawn(
        async move {
            tracing::debug!("job started");
            let result = work(reporter).await;
            let (status, message) = match &result {
                Ok(()) => (JobStatus::Success, String::new()),
                Err(EngineError::DbAbort(m)) if m == "cancelled" => (JobStatus::Cancelled, m.clone()),
                Err(e) => (JobStatus::Error, e.to_string()),
            };
            tracing::debug!(?status, "job finished");
            tx.send_modify(|s| {
                s.status = status;
                s.progress_percent = 100;
                s.message = message;
            });
            result
        }
        .instrument(span),
    );

    JobHandle {
        rx,
        interrupted,
        link_to_db,
        join: AsyncMutex::new(Some(join)),
    }
}

/// The error a worker returns when it observes its own cancellation flag
/// mid-loop, so `spawn_job`'s completion handler reports `Cancelled`
/// instead of `Error`.
pub fn cancelled() -> EngineError {
    EngineError::DbAbort("cancelled".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_job_reports_success() {
        let handle = spawn_job(NodeId::new(0), "test", |reporter| async move {
            reporter.report(50, "halfway");
            Ok(())
        });
        handle.join().await.unwrap();
        let snap = handle.snapshot();
        assert_eq!(snap.status, JobStatus::Success);
        assert_eq!(snap.progress_percent, 100);
    }

    #[tokio::test]
    async fn cancel_sets_flag_observed_by_worker() {
        let handle = spawn_job(NodeId::new(0), "test", |reporter| async move {
            if reporter.is_cancelled() {
                return Err(cancelled());
            }
            Ok(())
        });
        handle.cancel();
        // the flag was set after spawn; this test only asserts the flag
        // itself propagates, not a race-free cancellation of in-flight work.
        assert!(handle.interrupted.load(Ordering::SeqCst));
        let _ = handle.join().await;
    }
}
