//! Trace Orchestrator & Async Jobs (spec §4.6): every long-running
//! operation on a `Trace` — metadata discovery, time-slice reads,
//! side-channel lookups, trimmed export — runs as a cancellable background
//! job rather than blocking the caller.

pub mod future;
pub mod jobs;
pub mod metadata;
pub mod sidechannel;
pub mod slice;
pub mod table;
pub mod trim;

pub use future::{spawn_job, JobHandle, JobStatus, ProgressReporter, ProgressSnapshot};
pub use jobs::{JobId, JobTable};
pub use metadata::read_metadata;
pub use slice::{read_slice, SliceOptions, SliceScope, TrackArray};
pub use table::{aggregate_table, execute_table_query, export_table_csv_async};
pub use trim::save_trimmed;
