//! `Track` (spec §3, §4.5), grounded on `rocprof-visual-data-model/src/data/Track.{h,cpp}`
//! and the category-specific subclasses (`EventTrack`, `CpuTrack`, `GpuTrack`,
//! `MetricTrack`) collapsed into one `TrackCategory` enum (spec §9's general
//! preference for tagged data over a class hierarchy).

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use traceview_common::{AgentId, CounterId, EventId, NodeId, ProcessId, QueueId, ThreadId, Timestamp, TrackId};

use crate::model::event::DataFlowRecord;
use crate::model::graph::Graph;

/// Which physical-topology dimension a track is keyed on (spec §3 "Track",
/// closed set {Region, KernelDispatch, MemoryAllocation, MemoryCopy,
/// PerformanceCounter}).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackCategory {
    /// (node, process, thread) — CPU regions.
    Region,
    /// (node, agent, queue) — GPU kernel dispatches.
    KernelDispatch,
    /// (node, agent, queue) — device memory allocations.
    MemoryAllocation,
    /// (node, agent, queue) — host/device memory copies.
    MemoryCopy,
    /// (node, agent, counter) — performance-counter samples.
    PerformanceCounter,
}

/// Whether a graph's entries are discrete `Event`s or continuous `Sample`s
/// (the original's `rocprofvis_controller_track_type_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Events,
    Samples,
}

/// The (node, process/agent, thread/queue/counter) tuple a track is keyed
/// on. Fields not meaningful for a given `TrackCategory` stay `INVALID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackIdentity {
    pub node: NodeId,
    pub process: ProcessId,
    pub thread: ThreadId,
    pub agent: AgentId,
    pub queue: QueueId,
    pub counter: CounterId,
}

impl TrackIdentity {
    pub const fn region(node: NodeId, process: ProcessId, thread: ThreadId) -> Self {
        TrackIdentity {
            node,
            process,
            thread,
            agent: AgentId::INVALID,
            queue: QueueId::INVALID,
            counter: CounterId::INVALID,
        }
    }

    pub const fn device(node: NodeId, agent: AgentId, queue: QueueId) -> Self {
        TrackIdentity {
            node,
            process: ProcessId::INVALID,
            thread: ThreadId::INVALID,
            agent,
            queue,
            counter: CounterId::INVALID,
        }
    }

    pub const fn counter(node: NodeId, agent: AgentId, counter: CounterId) -> Self {
        TrackIdentity {
            node,
            process: ProcessId::INVALID,
            thread: ThreadId::INVALID,
            agent,
            queue: QueueId::INVALID,
            counter,
        }
    }
}

/// Cached, persistable track metadata (spec §4.5 "TrackProperties"). Restored
/// from `track_info_<hash>` on a fast-path open, recomputed on a
/// `track_config_version` mismatch.
#[derive(Debug, Clone)]
pub struct TrackProperties {
    pub min_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    pub max_level: u8,
    pub description: String,
    pub track_config_version: u32,
    pub num_entries: u64,
}

/// A semantic lane of events sharing one (node, process/agent,
/// thread/queue/counter) tuple. Immutable after metadata load except for its
/// graphs' internal LOD caches.
pub struct Track {
    pub id: TrackId,
    pub category: TrackCategory,
    pub kind: TrackKind,
    pub identity: TrackIdentity,
    /// Hint for the order tracks should be drawn in, independent of `id`.
    pub display_order: u32,
    properties: RwLock<TrackProperties>,
    /// Ordered collection of chart projections over this track — typically
    /// one, but e.g. a PMC track may expose several counters as separate
    /// graphs (spec §3 "Owns an ordered collection of Graphs").
    pub graphs: Vec<Graph>,
    /// Cross-track edges keyed by the source event id (spec §3
    /// "DataFlowRecord... Owned by the source track's flow map").
    flows: Mutex<HashMap<EventId, Vec<DataFlowRecord>>>,
}

impl Track {
    pub fn new(
        id: TrackId,
        category: TrackCategory,
        kind: TrackKind,
        identity: TrackIdentity,
        display_order: u32,
        properties: TrackProperties,
        graphs: Vec<Graph>,
    ) -> Self {
        assert!(!graphs.is_empty(), "a track must expose at least one graph");
        Track {
            id,
            category,
            kind,
            identity,
            display_order,
            properties: RwLock::new(properties),
            graphs,
            flows: Mutex::new(HashMap::new()),
        }
    }

    pub fn properties(&self) -> TrackProperties {
        self.properties.read().unwrap().clone()
    }

    /// A track's first (and usually only) graph — the one most callers want.
    pub fn primary_graph(&self) -> &Graph {
        &self.graphs[0]
    }

    /// True if `current_version` matches the persisted properties' version;
    /// false means the cache must be recomputed (spec §4.5).
    pub fn config_version_matches(&self, current_version: u32) -> bool {
        self.properties.read().unwrap().track_config_version == current_version
    }

    pub fn replace_properties(&self, properties: TrackProperties) {
        *self.properties.write().unwrap() = properties;
    }

    pub fn add_flow(&self, record: DataFlowRecord) {
        self.flows.lock().unwrap().entry(record.source_event).or_default().push(record);
    }

    pub fn flows_for(&self, source_event: EventId) -> Vec<DataFlowRecord> {
        self.flows.lock().unwrap().get(&source_event).cloned().unwrap_or_default()
    }

    pub fn clear_flows(&self) {
        self.flows.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> TrackProperties {
        TrackProperties {
            min_timestamp: Timestamp::new(0),
            max_timestamp: Timestamp::new(1_000),
            max_level: 0,
            description: "test".into(),
            track_config_version: 1,
            num_entries: 0,
        }
    }

    #[test]
    fn config_version_mismatch_is_detected() {
        let track = Track::new(
            TrackId::new(0),
            TrackCategory::Region,
            TrackKind::Events,
            TrackIdentity::region(NodeId::new(0), ProcessId::new(0), ThreadId::new(0)),
            0,
            props(),
            vec![Graph::new(0, TrackKind::Events, 10, 1_000_000_000, 60_000_000_000)],
        );
        assert!(track.config_version_matches(1));
        assert!(!track.config_version_matches(2));
    }
}
