//! Shared wire types for the trace-viewer core engine.
//!
//! This crate holds the plain data shared between the backing-store adapter,
//! the packed-row table engine, and the public accessor surface: opaque ids,
//! the nanosecond timestamp newtype, the closed column schema, and the
//! property-enum tags used by the `get_property_as_*` accessors. Nothing
//! here owns a connection, a lock, or a thread — it is pure data plus the
//! enums that both ends of the API need to agree on.

pub mod ids;
pub mod property;
pub mod schema;
pub mod time;

pub use ids::{
    AgentId, CounterId, EventId, FlowId, NameId, NodeId, ProcessId, QueueId, SampleId, SegmentId,
    StackId, StringId, ThreadId, TrackId,
};
pub use property::{HandleKind, Property, PropertyValue};
pub use schema::{ColumnMask, ColumnType, QueryKind, SchemaIndex};
pub use time::Timestamp;
