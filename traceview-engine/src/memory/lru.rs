//! LRU bookkeeping for cached segments (spec §4.3 "LRU").
//!
//! The manager never calls back into `SegmentTimeline` concrete types
//! directly (that would invert the lock order in §5: MemoryManager sits
//! below SegmentTimeline). Instead each registered entry carries an
//! `Arc<dyn EvictionTarget>` the owning timeline installed when the segment
//! was created; eviction asks the target to drop the segment and report how
//! many bytes it freed.

use std::sync::Arc;

use traceview_common::SegmentId;

/// Anything that can have one of its segments evicted. `SegmentTimeline`
/// implements this so the memory manager can evict without knowing the
/// timeline's concrete type.
pub trait EvictionTarget: Send + Sync {
    /// Drops `segment`'s entries and clears its `valid` bit. Returns the
    /// number of bytes reclaimed.
    fn evict_segment(&self, segment: SegmentId) -> u64;
}

pub struct LruEntry {
    pub timestamp_ns: i64,
    pub owner: Arc<dyn EvictionTarget>,
    pub segment: SegmentId,
    pub lod: u32,
    pub bytes: u64,
    /// Correlates this entry with the in-use set: a live fetch holding this
    /// segment's output buffer registers the same token via
    /// `MemoryManager::enter_ownership`.
    pub array_token: u64,
}

impl LruEntry {
    /// Raw (LOD 0) entries are evicted before any higher LOD, and within
    /// the same tier, oldest-stamped first — matching the original's
    /// `(lod == 0) THEN timestamp` sort key.
    pub fn eviction_key(&self) -> (bool, i64) {
        (self.lod != 0, self.timestamp_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl EvictionTarget for Noop {
        fn evict_segment(&self, _segment: SegmentId) -> u64 {
            0
        }
    }

    #[test]
    fn lod_zero_sorts_before_higher_lods_at_same_age() {
        let target: Arc<dyn EvictionTarget> = Arc::new(Noop);
        let raw = LruEntry {
            timestamp_ns: 100,
            owner: Arc::clone(&target),
            segment: SegmentId::new(1),
            lod: 0,
            bytes: 10,
            array_token: 0,
        };
        let higher = LruEntry {
            timestamp_ns: 50,
            owner: target,
            segment: SegmentId::new(2),
            lod: 1,
            bytes: 10,
            array_token: 0,
        };
        // Even though `higher` is older by timestamp, LOD 0 must sort first.
        assert!(raw.eviction_key() < higher.eviction_key());
    }
}
