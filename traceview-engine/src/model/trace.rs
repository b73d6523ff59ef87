//! `Trace`, the root aggregate (spec §3 "Trace", §6.1).
//!
//! Owns exactly one backing-store handle, the process-wide string
//! interner, the memory manager, and the ordered track list. Created empty
//! by `Trace::new`; populated by the orchestrator's read-metadata sequence
//! via `set_tracks`. Dropping a `Trace` drops its `Arc<MemoryManager>`,
//! which joins the eviction worker and releases every pool (spec §4.3
//! "destructor joins it and drains the pools").

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use traceview_common::{EventId, TrackId, Timestamp};

use crate::error::{EngineError, Result};
use crate::interner::StringInterner;
use crate::memory::MemoryManager;
use crate::model::event::StackFrame;
use crate::model::track::Track;
use crate::store::BackingStore;

/// The trace's overall `[min_ts, max_ts]`, spanning every track (spec §3
/// "Trace... a Timeline").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    pub min_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
}

impl Timeline {
    pub const EMPTY: Timeline = Timeline {
        min_timestamp: Timestamp::ZERO,
        max_timestamp: Timestamp::ZERO,
    };
}

struct TraceState {
    timeline: Timeline,
    tracks: Vec<Arc<Track>>,
    by_id: HashMap<TrackId, usize>,
    /// Per-category extended-data and stack-trace overlays loaded by the
    /// side-channel loaders (spec §4.9), keyed by the originating event.
    stack_frames: HashMap<EventId, Vec<StackFrame>>,
    /// Global event-density histogram computed once by the orchestrator's
    /// read-metadata sequence (spec §4.6 step 6), consumed by the external
    /// histogram widget.
    histogram: Vec<u64>,
}

/// The root aggregate a `Database` hands back from `read_metadata_async`
/// (spec §6.1). One instance per opened trace file.
pub struct Trace {
    store: Arc<dyn BackingStore>,
    interner: Arc<StringInterner>,
    memory: Arc<MemoryManager>,
    state: RwLock<TraceState>,
}

impl Trace {
    /// Constructs an empty trace bound to `store`. `memory` must already be
    /// sized with this trace's on-disk byte count (spec §4.3's `T` term) —
    /// the orchestrator does this with a single `stat()` before calling in.
    pub fn new(store: Arc<dyn BackingStore>, interner: Arc<StringInterner>, memory: Arc<MemoryManager>) -> Self {
        Trace {
            store,
            interner,
            memory,
            state: RwLock::new(TraceState {
                timeline: Timeline::EMPTY,
                tracks: Vec::new(),
                by_id: HashMap::new(),
                stack_frames: HashMap::new(),
                histogram: Vec::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    pub fn interner(&self) -> &Arc<StringInterner> {
        &self.interner
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn timeline(&self) -> Timeline {
        self.state.read().unwrap().timeline
    }

    /// Installs the tracks discovered by metadata loading, replacing any
    /// previous set, and recomputes the trace-wide timeline as the union
    /// of every track's `[min, max]` (spec §6.1 "read_metadata_async").
    pub fn set_tracks(&self, tracks: Vec<Arc<Track>>) {
        let mut min_timestamp = Timestamp::new(i64::MAX);
        let mut max_timestamp = Timestamp::new(i64::MIN);
        let mut by_id = HashMap::with_capacity(tracks.len());
        for (index, track) in tracks.iter().enumerate() {
            let props = track.properties();
            min_timestamp = min_timestamp.min(props.min_timestamp);
            max_timestamp = max_timestamp.max(props.max_timestamp);
            by_id.insert(track.id, index);
        }
        if tracks.is_empty() {
            min_timestamp = Timestamp::new(0);
            max_timestamp = Timestamp::new(0);
        }

        let mut state = self.state.write().unwrap();
        state.timeline = Timeline { min_timestamp, max_timestamp };
        state.tracks = tracks;
        state.by_id = by_id;
    }

    pub fn tracks(&self) -> Vec<Arc<Track>> {
        self.state.read().unwrap().tracks.clone()
    }

    pub fn track(&self, id: TrackId) -> Option<Arc<Track>> {
        let state = self.state.read().unwrap();
        state.by_id.get(&id).map(|&idx| Arc::clone(&state.tracks[idx]))
    }

    pub fn track_count(&self) -> usize {
        self.state.read().unwrap().tracks.len()
    }

    pub fn set_stack_frames(&self, event: EventId, frames: Vec<StackFrame>) {
        self.state.write().unwrap().stack_frames.insert(event, frames);
    }

    pub fn stack_frames(&self, event: EventId) -> Vec<StackFrame> {
        self.state.read().unwrap().stack_frames.get(&event).cloned().unwrap_or_default()
    }

    /// Removes every segment, at every LOD of every track's every graph,
    /// overlapping `[start, end]` (spec §6.1 `trace.delete_time_slice`).
    pub fn delete_time_slice(&self, start: Timestamp, end: Timestamp) {
        for track in self.state.read().unwrap().tracks.iter() {
            for graph in &track.graphs {
                graph.delete_time_slice(&self.memory, start, end);
            }
        }
    }

    /// Clears every track's graphs across the whole timeline (spec §6.1
    /// `trace.delete_all_slices`).
    pub fn delete_all_slices(&self) {
        let timeline = self.timeline();
        self.delete_time_slice(timeline.min_timestamp, timeline.max_timestamp);
    }

    /// Drops the cached side-channel overlay of `kind` for one event (spec
    /// §6.1 `trace.delete_event_property`). Only `StackFrame` overlays are
    /// modeled so far; other property kinds are no-ops until their
    /// side-channel loader exists.
    pub fn delete_event_property(&self, event: EventId) {
        self.state.write().unwrap().stack_frames.remove(&event);
    }

    pub fn delete_all_properties(&self) {
        self.state.write().unwrap().stack_frames.clear();
    }

    pub fn set_histogram(&self, histogram: Vec<u64>) {
        self.state.write().unwrap().histogram = histogram;
    }

    pub fn histogram(&self) -> Vec<u64> {
        self.state.read().unwrap().histogram.clone()
    }

    /// Drops an ad-hoc query-result table (spec §6.1 `trace.delete_table`,
    /// §6.3). Table lifecycle naming is owned by the orchestrator; this
    /// just forwards the drop to the backing store.
    pub async fn delete_table(&self, table_name: &str) -> Result<()> {
        self.store.drop_table(table_name).await
    }

    /// Re-binds this trace to a different open database connection (spec
    /// §6.1 `trace.bind_to_database`) — used when the view layer swaps in
    /// a freshly reopened handle after a schema-version bump.
    pub fn bind_to_database(&mut self, store: Arc<dyn BackingStore>) -> Result<()> {
        if !Arc::ptr_eq(&self.store, &store) && self.store.node_id() != store.node_id() {
            return Err(EngineError::InvalidParameter(
                "bind_to_database requires the same db-node".into(),
            ));
        }
        self.store = store;
        Ok(())
    }
}
