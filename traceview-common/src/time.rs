use std::fmt;

/// A 64-bit integer nanosecond timestamp relative to trace start.
///
/// All timestamps in the data model (spec §3) are this type; there is no
/// wall-clock meaning attached until a caller joins against trace metadata.
#[repr(transparent)]
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    bytemuck::Pod,
    bytemuck::Zeroable,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn new(ns: i64) -> Self {
        Timestamp(ns)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// `self + delta`, saturating instead of overflowing. Segment boundary
    /// arithmetic never needs to panic on a corrupt trace.
    pub fn saturating_add(self, delta: i64) -> Timestamp {
        Timestamp(self.0.saturating_add(delta))
    }

    pub fn saturating_sub(self, other: Timestamp) -> i64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(ns: i64) -> Self {
        Timestamp(ns)
    }
}

/// A half-open or closed `[start, end]` time range, depending on call site.
/// Segment/timeline code treats these as closed ranges per spec §3 invariant 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub const fn new(start: Timestamp, end: Timestamp) -> Self {
        TimeRange { start, end }
    }

    pub fn duration_ns(self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    pub fn overlaps(self, other: TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }
}
