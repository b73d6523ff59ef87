//! The public property-by-enum accessor surface (spec §6.1):
//! `get_property_as_{u64,i64,f64,string,handle}(handle, property, index)`.
//! One closed `Handle` enum borrows into whatever engine object the caller
//! already has in hand — a fetched `Entry`, a looked-up `Track`, a query
//! result row — so the view layer never matches on the engine's internal
//! struct layouts directly.
//!
//! Grounded on `rocprofvis_controller_model.cpp`'s `GetPropertyAsXxx`
//! dispatch, collapsed from per-object-type functions into one dispatch
//! over `traceview_common::Property` (spec §9's tagged-enum redesign note).

use traceview_common::{HandleKind, Property, PropertyValue};

use crate::error::{EngineError, Result};
use crate::model::event::{DataFlowRecord, Event, Sample, SampleLod, StackFrame};
use crate::model::graph::Graph;
use crate::model::track::Track;
use crate::model::trace::Trace;
use crate::table::row::PackedTable;

/// A borrowed reference to one engine object, tagged by kind. The view
/// layer constructs these from whatever it already holds — a `Trace`, a
/// `Track` looked up by id, an `Entry` returned from `read_slice` — and
/// reads properties off them without ever matching the engine's internal
/// variants itself.
pub enum Handle<'a> {
    Trace(&'a Trace),
    Track(&'a Track),
    Graph(&'a Graph),
    Event(&'a Event),
    Sample(&'a Sample),
    SampleLod(&'a SampleLod),
    Flow(&'a DataFlowRecord),
    StackFrame(&'a StackFrame),
    Table(&'a PackedTable),
    TableRow(&'a PackedTable, usize),
}

impl Handle<'_> {
    fn kind(&self) -> HandleKind {
        match self {
            Handle::Trace(_) => HandleKind::Trace,
            Handle::Track(_) => HandleKind::Track,
            Handle::Graph(_) => HandleKind::Graph,
            Handle::Event(_) => HandleKind::Event,
            Handle::Sample(_) => HandleKind::Sample,
            Handle::SampleLod(_) => HandleKind::SampleLod,
            Handle::Flow(_) => HandleKind::Flow,
            Handle::StackFrame(_) => HandleKind::StackFrame,
            Handle::Table(_) => HandleKind::Table,
            Handle::TableRow(..) => HandleKind::TableRow,
        }
    }
}

fn check_kind(handle: &Handle, property: Property) -> Result<()> {
    if handle.kind() != property.handle_kind() {
        return Err(EngineError::InvalidParameter(format!(
            "{property:?} is not readable from a {:?} handle",
            handle.kind()
        )));
    }
    Ok(())
}

/// Dispatches `property` against `handle`, returning the widest value shape
/// that can hold it. Every `get_property_as_*` wrapper below calls this and
/// narrows the result, so there is exactly one place each property's field
/// mapping is written down.
fn read(handle: &Handle, property: Property, index: u64) -> Result<PropertyValue> {
    check_kind(handle, property)?;
    use Property::*;

    match (handle, property) {
        (Handle::Trace(trace), TraceMinTimestamp) => Ok(PropertyValue::I64(trace.timeline().min_timestamp.as_nanos())),
        (Handle::Trace(trace), TraceMaxTimestamp) => Ok(PropertyValue::I64(trace.timeline().max_timestamp.as_nanos())),
        (Handle::Trace(trace), TraceNumTracks) => Ok(PropertyValue::U64(trace.track_count() as u64)),
        (Handle::Trace(trace), TraceTrackIndexed) => {
            let tracks = trace.tracks();
            let track = tracks
                .get(index as usize)
                .ok_or_else(|| EngineError::InvalidParameter(format!("track index {index} out of range")))?;
            Ok(PropertyValue::Handle(track.id.get()))
        }

        (Handle::Track(track), TrackId) => Ok(PropertyValue::Handle(track.id.get())),
        (Handle::Track(track), TrackCategory) => Ok(PropertyValue::U64(track.category as u64)),
        (Handle::Track(track), TrackNodeId) => Ok(PropertyValue::Handle(track.identity.node.get())),
        (Handle::Track(track), TrackProcessId) => Ok(PropertyValue::Handle(track.identity.process.get())),
        (Handle::Track(track), TrackThreadId) => Ok(PropertyValue::Handle(track.identity.thread.get())),
        (Handle::Track(track), TrackAgentId) => Ok(PropertyValue::Handle(track.identity.agent.get())),
        (Handle::Track(track), TrackQueueId) => Ok(PropertyValue::Handle(track.identity.queue.get())),
        (Handle::Track(track), TrackCounterId) => Ok(PropertyValue::Handle(track.identity.counter.get())),
        (Handle::Track(track), TrackMinTimestamp) => Ok(PropertyValue::I64(track.properties().min_timestamp.as_nanos())),
        (Handle::Track(track), TrackMaxTimestamp) => Ok(PropertyValue::I64(track.properties().max_timestamp.as_nanos())),
        (Handle::Track(track), TrackMaxLevel) => Ok(PropertyValue::U64(track.properties().max_level as u64)),
        (Handle::Track(track), TrackDisplayOrder) => Ok(PropertyValue::U64(track.display_order as u64)),
        (Handle::Track(track), TrackNumGraphs) => Ok(PropertyValue::U64(track.graphs.len() as u64)),
        (Handle::Track(track), TrackGraphIndexed) => {
            if index as usize >= track.graphs.len() {
                return Err(EngineError::InvalidParameter(format!("graph index {index} out of range")));
            }
            Ok(PropertyValue::Handle(track.graphs[index as usize].id))
        }

        (Handle::Graph(graph), GraphNumLods) => Ok(PropertyValue::U64(graph.num_lods() as u64)),
        (Handle::Graph(graph), GraphLodSegmentDuration) => graph
            .lod_segment_duration(index as u32)
            .map(PropertyValue::I64)
            .ok_or_else(|| EngineError::InvalidParameter(format!("LOD {index} has not been materialized"))),

        (Handle::Event(event), EventId) => Ok(PropertyValue::Handle(event.id.get())),
        (Handle::Event(event), EventStart) => Ok(PropertyValue::I64(event.start.as_nanos())),
        (Handle::Event(event), EventEnd) => Ok(PropertyValue::I64(event.end.as_nanos())),
        (Handle::Event(event), EventLevel) => Ok(PropertyValue::U64(event.level as u64)),
        (Handle::Event(event), EventCategoryNameId) => Ok(PropertyValue::Handle(event.category_id.get())),
        (Handle::Event(event), EventNameId) => Ok(PropertyValue::Handle(
            event.top_name_id.unwrap_or(event.name_id).get(),
        )),
        (Handle::Event(event), EventNumChildren) => Ok(PropertyValue::U64(event.children.len() as u64)),
        (Handle::Event(event), EventChildIndexed) => {
            let child = event
                .children
                .get(index as usize)
                .ok_or_else(|| EngineError::InvalidParameter(format!("child index {index} out of range")))?;
            Ok(PropertyValue::Handle(child.get()))
        }

        (Handle::Sample(sample), SampleTimestamp) => Ok(PropertyValue::I64(sample.timestamp.as_nanos())),
        (Handle::Sample(sample), SampleNextTimestamp) => Ok(PropertyValue::I64(sample.next_timestamp.as_nanos())),
        (Handle::Sample(sample), SampleValue) => Ok(PropertyValue::F64(sample.value)),
        (Handle::Sample(sample), SampleNextValue) => Ok(PropertyValue::F64(sample.next_value)),

        (Handle::SampleLod(lod), SampleTimestamp) => Ok(PropertyValue::I64(lod.base.timestamp.as_nanos())),
        (Handle::SampleLod(lod), SampleNextTimestamp) => Ok(PropertyValue::I64(lod.base.next_timestamp.as_nanos())),
        (Handle::SampleLod(lod), SampleValue) => Ok(PropertyValue::F64(lod.base.value)),
        (Handle::SampleLod(lod), SampleNextValue) => Ok(PropertyValue::F64(lod.base.next_value)),
        (Handle::SampleLod(lod), SampleLodMin) => Ok(PropertyValue::F64(lod.min)),
        (Handle::SampleLod(lod), SampleLodMean) => Ok(PropertyValue::F64(lod.mean)),
        (Handle::SampleLod(lod), SampleLodMedian) => Ok(PropertyValue::F64(lod.median)),
        (Handle::SampleLod(lod), SampleLodMax) => Ok(PropertyValue::F64(lod.max)),
        (Handle::SampleLod(lod), SampleLodMinTimestamp) => Ok(PropertyValue::I64(lod.min_ts.as_nanos())),
        (Handle::SampleLod(lod), SampleLodMaxTimestamp) => Ok(PropertyValue::I64(lod.max_ts.as_nanos())),

        (Handle::Flow(flow), FlowSourceEventId) => Ok(PropertyValue::Handle(flow.source_event.get())),
        (Handle::Flow(flow), FlowTargetTrackId) => Ok(PropertyValue::Handle(flow.target_track.get())),
        (Handle::Flow(flow), FlowTargetEventId) => Ok(PropertyValue::Handle(flow.target_event.get())),
        (Handle::Flow(flow), FlowTargetTimestamp) => Ok(PropertyValue::I64(flow.target_timestamp.as_nanos())),
        (Handle::Flow(flow), FlowKind) => Ok(PropertyValue::U64(match flow.endpoint {
            crate::model::event::FlowEndpoint::Cpu { .. } => 0,
            crate::model::event::FlowEndpoint::Gpu { .. } => 1,
        })),

        (Handle::StackFrame(frame), StackFrameSymbolId) => Ok(PropertyValue::Handle(frame.symbol_id.get())),
        (Handle::StackFrame(frame), StackFrameArgsId) => Ok(PropertyValue::Handle(frame.args_id.get())),
        (Handle::StackFrame(frame), StackFrameLine) => Ok(PropertyValue::U64(frame.line as u64)),
        (Handle::StackFrame(frame), StackFrameDepth) => Ok(PropertyValue::U64(frame.depth as u64)),

        (Handle::Table(table), TableNumRows) => Ok(PropertyValue::U64(table.row_count() as u64)),
        (Handle::Table(table), TableNumColumns) => Ok(PropertyValue::U64(table.column_count() as u64)),
        (Handle::Table(table), TableColumnIndexed) => {
            let col = table
                .columns
                .get(index as usize)
                .ok_or_else(|| EngineError::InvalidParameter(format!("column index {index} out of range")))?;
            Ok(PropertyValue::Str(col.name.clone()))
        }

        (Handle::TableRow(table, row), RowCellIndexed) => {
            let row = table
                .rows
                .get(*row)
                .ok_or_else(|| EngineError::InvalidParameter(format!("row index {row} out of range")))?;
            let cell = row
                .cells
                .get(index as usize)
                .ok_or_else(|| EngineError::InvalidParameter(format!("cell index {index} out of range")))?;
            Ok(match cell {
                crate::store::ColumnValue::Integer(v) => PropertyValue::I64(*v),
                crate::store::ColumnValue::Real(v) => PropertyValue::F64(*v),
                crate::store::ColumnValue::Text(s) => PropertyValue::Str(s.clone()),
                crate::store::ColumnValue::Blob(_) => PropertyValue::Str(String::new()),
            })
        }

        _ => Err(EngineError::InvalidParameter(format!("{property:?} has no mapping for this handle"))),
    }
}

pub fn get_property_as_u64(handle: &Handle, property: Property, index: u64) -> Result<u64> {
    read(handle, property, index)?
        .as_u64()
        .ok_or_else(|| EngineError::InvalidParameter(format!("{property:?} is not a u64 property")))
}

pub fn get_property_as_i64(handle: &Handle, property: Property, index: u64) -> Result<i64> {
    read(handle, property, index)?
        .as_i64()
        .ok_or_else(|| EngineError::InvalidParameter(format!("{property:?} is not an i64 property")))
}

pub fn get_property_as_f64(handle: &Handle, property: Property, index: u64) -> Result<f64> {
    read(handle, property, index)?
        .as_f64()
        .ok_or_else(|| EngineError::InvalidParameter(format!("{property:?} is not an f64 property")))
}

pub fn get_property_as_string(handle: &Handle, property: Property, index: u64) -> Result<String> {
    read(handle, property, index)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| EngineError::InvalidParameter(format!("{property:?} is not a string property")))
}

pub fn get_property_as_handle(handle: &Handle, property: Property, index: u64) -> Result<u64> {
    read(handle, property, index)?
        .as_u64()
        .ok_or_else(|| EngineError::InvalidParameter(format!("{property:?} is not a handle property")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use traceview_common::{EventId, StringId};

    fn event() -> Event {
        Event {
            id: EventId::new(7),
            start: traceview_common::Timestamp::new(10),
            end: traceview_common::Timestamp::new(20),
            level: 2,
            category_id: StringId::new(1),
            name_id: StringId::new(2),
            children: vec![EventId::new(1), EventId::new(2)],
            top_name_id: None,
        }
    }

    #[test]
    fn event_properties_read_back_their_fields() {
        let e = event();
        let h = Handle::Event(&e);
        assert_eq!(get_property_as_handle(&h, Property::EventId, 0).unwrap(), 7);
        assert_eq!(get_property_as_i64(&h, Property::EventStart, 0).unwrap(), 10);
        assert_eq!(get_property_as_u64(&h, Property::EventNumChildren, 0).unwrap(), 2);
        assert_eq!(get_property_as_handle(&h, Property::EventChildIndexed, 1).unwrap(), 2);
    }

    #[test]
    fn mismatched_handle_kind_is_rejected() {
        let e = event();
        let h = Handle::Event(&e);
        let err = get_property_as_u64(&h, Property::TrackMaxLevel, 0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
    }

    #[test]
    fn out_of_range_child_index_is_rejected() {
        let e = event();
        let h = Handle::Event(&e);
        assert!(get_property_as_handle(&h, Property::EventChildIndexed, 99).is_err());
    }

    #[test]
    fn graph_lod_properties_read_back_materialized_lods() {
        use crate::model::segment::Entry;
        use crate::model::track::TrackKind;

        let graph = Graph::new(1, TrackKind::Events, 10, 100, 1_000_000);
        graph.insert_raw(
            traceview_common::Timestamp::new(0),
            traceview_common::Timestamp::new(1_000),
            traceview_common::Timestamp::new(10),
            0,
            Entry::Event(event()),
        );
        let h = Handle::Graph(&graph);
        assert_eq!(get_property_as_u64(&h, Property::GraphNumLods, 0).unwrap(), 1);
        assert_eq!(get_property_as_i64(&h, Property::GraphLodSegmentDuration, 0).unwrap(), 100);
        assert!(get_property_as_i64(&h, Property::GraphLodSegmentDuration, 5).is_err());
    }
}
