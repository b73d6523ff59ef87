//! The property-enum vocabulary behind the "sole read path" of spec §6.1:
//! `get_property_as_{u64, i64, f64, string, handle}(handle, property, index)`.
//! Every attribute of every domain object is reachable through one of these
//! tags, so the view layer never depends on the engine's concrete struct
//! layouts — only on this closed enum plus an index for repeated fields.
//!
//! Grouped the way the original C++ model groups per-object-type property
//! enumerations (node / processor / thread / queue / counter / ...); here
//! it is one flat Rust enum instead of a family of C `enum : uint32_t`s; the
//! `index` argument (carried at the call site, not in this enum) plays the
//! role the original's `*Indexed` variants played.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Property {
    // Trace-level
    TraceMinTimestamp,
    TraceMaxTimestamp,
    TraceNumTracks,
    TraceTrackIndexed,

    // Track-level
    TrackId,
    TrackCategory,
    TrackNodeId,
    TrackProcessId,
    TrackThreadId,
    TrackAgentId,
    TrackQueueId,
    TrackCounterId,
    TrackMinTimestamp,
    TrackMaxTimestamp,
    TrackMaxLevel,
    TrackDisplayOrder,
    TrackNumGraphs,
    TrackGraphIndexed,

    // Graph-level
    GraphNumLods,
    GraphLodSegmentDuration,

    // Event-level
    EventId,
    EventStart,
    EventEnd,
    EventLevel,
    EventCategoryNameId,
    EventNameId,
    EventNumChildren,
    EventChildIndexed,

    // Sample-level
    SampleTimestamp,
    SampleNextTimestamp,
    SampleValue,
    SampleNextValue,

    // SampleLOD-level (all Sample properties plus these aggregates)
    SampleLodMin,
    SampleLodMean,
    SampleLodMedian,
    SampleLodMax,
    SampleLodMinTimestamp,
    SampleLodMaxTimestamp,

    // Flow record
    FlowSourceEventId,
    FlowTargetTrackId,
    FlowTargetEventId,
    FlowTargetTimestamp,
    FlowKind,

    // Stack frame
    StackFrameSymbolId,
    StackFrameArgsId,
    StackFrameLine,
    StackFrameDepth,

    // Table / row
    TableNumRows,
    TableNumColumns,
    TableColumnIndexed,
    RowCellIndexed,
}

/// The handle kind a `Property` is read against. Used to validate that a
/// caller isn't asking a `Track` handle for an `Event` property — returning
/// `InvalidParameter` (spec §7) rather than silently reading garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Trace,
    Track,
    Graph,
    Segment,
    Event,
    Sample,
    SampleLod,
    Flow,
    StackFrame,
    Table,
    TableRow,
}

impl Property {
    /// Which handle kind this property is legal to read from.
    pub const fn handle_kind(self) -> HandleKind {
        use Property::*;
        match self {
            TraceMinTimestamp | TraceMaxTimestamp | TraceNumTracks | TraceTrackIndexed => {
                HandleKind::Trace
            }
            TrackId
            | TrackCategory
            | TrackNodeId
            | TrackProcessId
            | TrackThreadId
            | TrackAgentId
            | TrackQueueId
            | TrackCounterId
            | TrackMinTimestamp
            | TrackMaxTimestamp
            | TrackMaxLevel
            | TrackDisplayOrder
            | TrackNumGraphs
            | TrackGraphIndexed => HandleKind::Track,
            GraphNumLods | GraphLodSegmentDuration => HandleKind::Graph,
            EventId
            | EventStart
            | EventEnd
            | EventLevel
            | EventCategoryNameId
            | EventNameId
            | EventNumChildren
            | EventChildIndexed => HandleKind::Event,
            SampleTimestamp | SampleNextTimestamp | SampleValue | SampleNextValue => {
                HandleKind::Sample
            }
            SampleLodMin
            | SampleLodMean
            | SampleLodMedian
            | SampleLodMax
            | SampleLodMinTimestamp
            | SampleLodMaxTimestamp => HandleKind::SampleLod,
            FlowSourceEventId | FlowTargetTrackId | FlowTargetEventId | FlowTargetTimestamp
            | FlowKind => HandleKind::Flow,
            StackFrameSymbolId | StackFrameArgsId | StackFrameLine | StackFrameDepth => {
                HandleKind::StackFrame
            }
            TableNumRows | TableNumColumns | TableColumnIndexed => HandleKind::Table,
            RowCellIndexed => HandleKind::TableRow,
        }
    }
}

/// The five accessor shapes of spec §6.1
/// (`get_property_as_{u64,i64,f64,string,handle}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    U64(u64),
    I64(i64),
    F64(f64),
    Str(String),
    Handle(u64),
}

impl PropertyValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PropertyValue::U64(v) => Some(*v),
            PropertyValue::Handle(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_kind_partitions_all_variants() {
        assert_eq!(Property::EventStart.handle_kind(), HandleKind::Event);
        assert_eq!(Property::TrackMaxLevel.handle_kind(), HandleKind::Track);
        assert_eq!(
            Property::SampleLodMedian.handle_kind(),
            HandleKind::SampleLod
        );
    }
}
