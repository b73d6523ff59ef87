//! The closed column schema shared by the query builder (§4.8) and the
//! packed-row table engine (§4.7). `SchemaIndex` is the common contract: a
//! fixed enumeration of every logical column either module can ever produce
//! or consume, so adding a column is a one-place edit instead of a
//! string-keyed convention spread across both layers.

use serde::{Deserialize, Serialize};

/// Physical storage width/kind for one packed-row cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Byte,
    Word,
    Dword,
    Qword,
    Double,
}

impl ColumnType {
    /// Width in bytes of one cell of this type within a packed row.
    pub const fn byte_width(self) -> usize {
        match self {
            ColumnType::Byte => 1,
            ColumnType::Word => 2,
            ColumnType::Dword => 4,
            ColumnType::Qword => 8,
            ColumnType::Double => 8,
        }
    }

    /// Whether this column type compares numerically (`f64`/`u64`) rather
    /// than through the interner's insertion order (spec §4.7 sort rule).
    pub const fn is_numeric(self) -> bool {
        !matches!(self, ColumnType::Byte)
    }
}

/// The full, closed logical column schema (spec §4.8). Every name the query
/// builder can select and the packed-row engine can store is one of these
/// variants — there is no open string-keyed column space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SchemaIndex {
    Operation,
    Id,
    Category,
    Name,
    Symbol,
    StreamName,
    QueueName,
    ProcessId,
    ThreadId,
    AgentAbsIndex,
    AgentType,
    Start,
    End,
    Duration,
    GridSizeX,
    GridSizeY,
    GridSizeZ,
    WorkgroupSizeX,
    WorkgroupSizeY,
    WorkgroupSizeZ,
    LdsSize,
    ScratchSize,
    Address,
    CounterId,
    CounterValue,
    TrackId,
    StreamTrackId,
    Level,
}

impl SchemaIndex {
    /// The public, user-facing column name (what a table view would show as
    /// a header, and what `sort_by_column`/group-by clauses reference).
    pub const fn public_name(self) -> &'static str {
        match self {
            SchemaIndex::Operation => "op",
            SchemaIndex::Id => "id",
            SchemaIndex::Category => "category",
            SchemaIndex::Name => "name",
            SchemaIndex::Symbol => "symbol",
            SchemaIndex::StreamName => "stream",
            SchemaIndex::QueueName => "queue",
            SchemaIndex::ProcessId => "pid",
            SchemaIndex::ThreadId => "tid",
            SchemaIndex::AgentAbsIndex => "agent",
            SchemaIndex::AgentType => "agent_type",
            SchemaIndex::Start => "start",
            SchemaIndex::End => "end",
            SchemaIndex::Duration => "duration",
            SchemaIndex::GridSizeX => "grid_x",
            SchemaIndex::GridSizeY => "grid_y",
            SchemaIndex::GridSizeZ => "grid_z",
            SchemaIndex::WorkgroupSizeX => "wg_x",
            SchemaIndex::WorkgroupSizeY => "wg_y",
            SchemaIndex::WorkgroupSizeZ => "wg_z",
            SchemaIndex::LdsSize => "lds",
            SchemaIndex::ScratchSize => "scratch",
            SchemaIndex::Address => "address",
            SchemaIndex::CounterId => "counter_id",
            SchemaIndex::CounterValue => "counter_value",
            SchemaIndex::TrackId => "__trackId",
            SchemaIndex::StreamTrackId => "__streamTrackId",
            SchemaIndex::Level => "level",
        }
    }

    /// Storage type used when this column is packed into a `PackedRow`.
    pub const fn storage_type(self) -> ColumnType {
        match self {
            SchemaIndex::Operation => ColumnType::Byte,
            SchemaIndex::Id
            | SchemaIndex::TrackId
            | SchemaIndex::StreamTrackId
            | SchemaIndex::Start
            | SchemaIndex::End
            | SchemaIndex::Duration
            | SchemaIndex::Address
            | SchemaIndex::CounterValue => ColumnType::Qword,
            SchemaIndex::Category
            | SchemaIndex::Name
            | SchemaIndex::Symbol
            | SchemaIndex::StreamName
            | SchemaIndex::QueueName
            | SchemaIndex::CounterId => ColumnType::Dword,
            SchemaIndex::ProcessId
            | SchemaIndex::ThreadId
            | SchemaIndex::AgentAbsIndex
            | SchemaIndex::GridSizeX
            | SchemaIndex::GridSizeY
            | SchemaIndex::GridSizeZ
            | SchemaIndex::WorkgroupSizeX
            | SchemaIndex::WorkgroupSizeY
            | SchemaIndex::WorkgroupSizeZ
            | SchemaIndex::LdsSize
            | SchemaIndex::ScratchSize => ColumnType::Dword,
            SchemaIndex::AgentType | SchemaIndex::Level => ColumnType::Word,
        }
    }

    /// True for columns whose value is an interned-string id and therefore
    /// needs the table's string-projection pass before display (spec §4.7
    /// "String projection").
    pub const fn is_interned_name(self) -> bool {
        matches!(
            self,
            SchemaIndex::Category
                | SchemaIndex::Name
                | SchemaIndex::Symbol
                | SchemaIndex::StreamName
                | SchemaIndex::QueueName
        )
    }

    /// Reverse of `public_name`, for callers (a CLI flag, a saved query)
    /// that name a column by its user-facing string rather than the enum
    /// variant directly.
    pub fn from_public_name(name: &str) -> Option<Self> {
        // `SchemaIndex` is `#[non_exhaustive]`, so this list is grown
        // alongside new variants rather than derived.
        const ALL: &[SchemaIndex] = &[
            SchemaIndex::Operation,
            SchemaIndex::Id,
            SchemaIndex::Category,
            SchemaIndex::Name,
            SchemaIndex::Symbol,
            SchemaIndex::StreamName,
            SchemaIndex::QueueName,
            SchemaIndex::ProcessId,
            SchemaIndex::ThreadId,
            SchemaIndex::AgentAbsIndex,
            SchemaIndex::AgentType,
            SchemaIndex::Start,
            SchemaIndex::End,
            SchemaIndex::Duration,
            SchemaIndex::GridSizeX,
            SchemaIndex::GridSizeY,
            SchemaIndex::GridSizeZ,
            SchemaIndex::WorkgroupSizeX,
            SchemaIndex::WorkgroupSizeY,
            SchemaIndex::WorkgroupSizeZ,
            SchemaIndex::LdsSize,
            SchemaIndex::ScratchSize,
            SchemaIndex::Address,
            SchemaIndex::CounterId,
            SchemaIndex::CounterValue,
            SchemaIndex::TrackId,
            SchemaIndex::StreamTrackId,
            SchemaIndex::Level,
        ];
        ALL.iter().copied().find(|idx| idx.public_name() == name)
    }
}

/// Column visibility mask emitted by the query builder (spec §4.8) and
/// consumed by the backing-store adapter to hide columns that should never
/// reach a user-visible result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnMask {
    /// Ordinary, user-visible column.
    Visible,
    /// Present in the row for join/filter purposes only (e.g. `__trackId`).
    Service,
    /// A timestamp column, visible but formatted specially by callers.
    Timestamp,
}

/// Distinct query shapes the builder can emit (spec §4.8, and spec §9's
/// resolution of the "kernel-launch-record-all-tracks vs by-queue" open
/// question: these are separate variants with separate column layouts,
/// never one polymorphic row shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    /// Discover the unique (agent/queue/...) tuples for a track category.
    TrackDiscovery,
    /// Per-event level precomputation input.
    Level,
    /// LOD-0 slice for one specific track.
    SliceByTrack,
    /// LOD-0 slice for every track in one query, rows tagged by track id.
    SliceAllTracks,
    /// Ad-hoc tabular query (packed-row engine input).
    Table,
    /// Cross-track flow-record join.
    DataFlow,
    /// Per-category extended-data tuples for one event.
    EssentialData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_widths_match_storage_types() {
        assert_eq!(SchemaIndex::Id.storage_type().byte_width(), 8);
        assert_eq!(SchemaIndex::Operation.storage_type().byte_width(), 1);
        assert_eq!(SchemaIndex::Level.storage_type().byte_width(), 2);
    }

    #[test]
    fn interned_columns_are_exactly_the_name_like_ones() {
        assert!(SchemaIndex::Name.is_interned_name());
        assert!(!SchemaIndex::Start.is_interned_name());
    }

    #[test]
    fn from_public_name_round_trips_with_public_name() {
        assert_eq!(SchemaIndex::from_public_name("duration"), Some(SchemaIndex::Duration));
        assert_eq!(SchemaIndex::from_public_name("__trackId"), Some(SchemaIndex::TrackId));
        assert_eq!(SchemaIndex::from_public_name("not_a_column"), None);
    }
}
