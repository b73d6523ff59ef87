//! Opaque, stable, non-reusable ids (spec §3: "All ids are stable, opaque,
//! non-reusable integers"). Each is a distinct type so a `TrackId` can never
//! be passed where an `EventId` is expected, even though both are `u64`
//! underneath.

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(
            Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            bytemuck::Pod, bytemuck::Zeroable,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub const INVALID: $name = $name(u64::MAX);

            pub const fn new(raw: u64) -> Self {
                $name(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }

            pub const fn is_valid(self) -> bool {
                self.0 != u64::MAX
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                $name(raw)
            }
        }
    };
}

opaque_id!(
    /// Identifies one db-node (a single backing trace file) in a federated
    /// multi-file trace (spec §4.1 "node-set federation").
    NodeId
);
opaque_id!(
    /// Identifies a `Track`: one semantic lane of events (spec §3).
    TrackId
);
opaque_id!(
    /// Identifies an `Event` within its owning track. Unique per track
    /// (spec §3 invariant 5), not globally.
    EventId
);
opaque_id!(
    /// Identifies a `Sample` (counter value pair) within its owning track.
    SampleId
);
opaque_id!(
    /// Identifies a materialized `Segment` (time-bounded LOD bucket).
    SegmentId
);
opaque_id!(
    /// Interned string id, dense and assigned in first-seen order
    /// (spec §4.2 — order is part of the contract).
    StringId
);
opaque_id!(
    /// Interned name id (event/sample name), a `StringId` at a different
    /// semantic layer so name-lookups can't be confused with arbitrary
    /// interned strings at the type level.
    NameId
);
opaque_id!(
    /// Identifies an OS process within a node.
    ProcessId
);
opaque_id!(
    /// Identifies an OS thread within a process.
    ThreadId
);
opaque_id!(
    /// Identifies a GPU/accelerator agent (device) within a node.
    AgentId
);
opaque_id!(
    /// Identifies a hardware queue within an agent.
    QueueId
);
opaque_id!(
    /// Identifies a performance-counter definition within an agent.
    CounterId
);
opaque_id!(
    /// Identifies a `DataFlowRecord` cross-track edge.
    FlowId
);
opaque_id!(
    /// Identifies a persisted `StackFrame` list for one event.
    StackId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sentinel_is_not_valid() {
        assert!(!TrackId::INVALID.is_valid());
        assert!(TrackId::new(0).is_valid());
    }

    #[test]
    fn distinct_types_do_not_compare() {
        let t = TrackId::new(5);
        let e = EventId::new(5);
        // Same underlying value, different types — this line exists to
        // document that the following would not compile:
        // assert_eq!(t, e);
        assert_eq!(t.get(), e.get());
    }
}
