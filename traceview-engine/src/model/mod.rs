pub mod event;
pub mod graph;
pub mod segment;
pub mod track;
pub mod trace;

pub use event::{DataFlowRecord, Event, FlowEndpoint, Sample, SampleLod, StackFrame};
pub use graph::Graph;
pub use segment::{Entry, Segment, SegmentTimeline};
pub use track::{Track, TrackCategory, TrackIdentity, TrackKind, TrackProperties};
pub use trace::{Timeline, Trace};
