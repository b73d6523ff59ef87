//! `Event` / `Sample` / `SampleLod` and the cross-track side-channel records
//! (spec §3). These are plain data — the polymorphic "getters by enum"
//! surface lives in `crate::api`, not here (spec §9's redesign note: tagged
//! variants instead of a virtual-dispatch hierarchy).

use traceview_common::{EventId, SampleId, StringId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub level: u8,
    pub category_id: StringId,
    pub name_id: StringId,
    /// Only populated on LOD events, which summarize ≥2 underlying events
    /// (spec §3 "Event").
    pub children: Vec<EventId>,
    /// On a combined-name LOD event, the name-id of whichever source name
    /// contributed the largest total duration (the generator's "top"
    /// name). `None` on raw events.
    pub top_name_id: Option<StringId>,
}

impl Event {
    pub fn is_lod(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start <= end && self.end >= start
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub id: SampleId,
    pub timestamp: Timestamp,
    pub next_timestamp: Timestamp,
    pub value: f64,
    pub next_value: f64,
}

/// A `Sample` plus aggregates over its children, computed once on
/// construction (spec §3 "SampleLOD").
#[derive(Debug, Clone, PartialEq)]
pub struct SampleLod {
    pub base: Sample,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min_ts: Timestamp,
    pub max_ts: Timestamp,
}

impl SampleLod {
    /// Builds a `SampleLod` summarizing `children`, which must be
    /// non-empty and already sorted by timestamp (the caller — the LOD
    /// generator — guarantees this since it consumes source order).
    pub fn from_children(id: SampleId, insert_ts: Timestamp, children: &[Sample]) -> Self {
        assert!(!children.is_empty(), "SampleLod requires at least one child");

        let mut values: Vec<f64> = children.iter().map(|s| s.value).collect();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = if values.len() % 2 == 1 {
            values[values.len() / 2]
        } else {
            let mid = values.len() / 2;
            (values[mid - 1] + values[mid]) / 2.0
        };

        let min_ts = children.iter().map(|s| s.timestamp).min().unwrap();
        let last = children.last().unwrap();

        SampleLod {
            base: Sample {
                id,
                timestamp: insert_ts,
                next_timestamp: last.next_timestamp,
                value: children[0].value,
                next_value: last.value,
            },
            min,
            mean,
            median,
            max,
            min_ts,
            max_ts: last.end_ts(),
        }
    }
}

impl Sample {
    pub fn end_ts(&self) -> Timestamp {
        self.next_timestamp
    }
}

/// A directed cross-track edge (spec §3 "DataFlowRecord"). The endpoint is
/// the tagged variant called for by spec §9's open-question resolution,
/// replacing the original's type-punned union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEndpoint {
    Cpu { endpoint_id: EventId },
    Gpu { last_timestamp: Timestamp },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFlowRecord {
    pub source_event: EventId,
    pub target_track: traceview_common::TrackId,
    pub target_event: EventId,
    pub target_timestamp: Timestamp,
    pub endpoint: FlowEndpoint,
}

/// One (symbol, args, line, depth) tuple in an event's call stack
/// (spec §3 "StackFrame").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    pub symbol_id: StringId,
    pub args_id: StringId,
    pub line: u32,
    pub depth: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(ts: i64, next_ts: i64, value: f64) -> Sample {
        Sample {
            id: SampleId::new(0),
            timestamp: Timestamp::new(ts),
            next_timestamp: Timestamp::new(next_ts),
            value,
            next_value: value,
        }
    }

    #[test]
    fn sample_lod_aggregates_match_children() {
        let children = vec![s(0, 10, 10.0), s(10, 20, 30.0), s(20, 30, 20.0)];
        let lod = SampleLod::from_children(SampleId::new(1), Timestamp::new(0), &children);
        assert_eq!(lod.min, 10.0);
        assert_eq!(lod.max, 30.0);
        assert_eq!(lod.median, 20.0);
        assert!((lod.mean - 20.0).abs() < 1e-9);
        assert_eq!(lod.max_ts, Timestamp::new(30));
    }

    #[test]
    fn event_overlap_is_inclusive() {
        let e = Event {
            id: EventId::new(0),
            start: Timestamp::new(10),
            end: Timestamp::new(20),
            level: 0,
            category_id: StringId::new(0),
            name_id: StringId::new(0),
            children: vec![],
            top_name_id: None,
        };
        assert!(e.overlaps(Timestamp::new(20), Timestamp::new(30)));
        assert!(!e.overlaps(Timestamp::new(21), Timestamp::new(30)));
    }
}
