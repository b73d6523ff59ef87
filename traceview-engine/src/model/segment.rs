//! `Segment` and `SegmentTimeline` (spec §4.4), grounded on
//! `rocprofvis_controller_segment.cpp`.
//!
//! A `Segment` is a time-bounded bucket of entries at one LOD level, indexed
//! by per-level start timestamp so `fetch` can binary-search the overlap
//! range directly instead of scanning. `SegmentTimeline` owns a sequence of
//! segments at fixed spacing and tracks which are materialized (`valid`) and
//! which have already had graph construction run over them (`processed`).
//!
//! The timeline is the `EvictionTarget` the memory manager evicts through
//! (`crate::memory::lru`): eviction never reaches into segment internals
//! directly, it asks the owning timeline to drop one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Condvar, Mutex};

use traceview_common::{EventId, SegmentId, Timestamp};

use crate::error::{EngineError, Result};
use crate::memory::EvictionTarget;
use crate::model::event::{Event, Sample, SampleLod};

/// One stored record at a given level within a segment.
#[derive(Debug, Clone)]
pub enum Entry {
    Event(Event),
    Sample(Sample),
    SampleLod(SampleLod),
}

impl Entry {
    /// `[min_ts, max_ts]` span used for overlap tests (the original reads
    /// `EventEndTimestamp` for events and `SampleTimestamp` for samples —
    /// here that's just the natural span of each variant).
    pub fn span(&self) -> (Timestamp, Timestamp) {
        match self {
            Entry::Event(e) => (e.start, e.end),
            Entry::Sample(s) => (s.timestamp, s.end_ts()),
            Entry::SampleLod(s) => (s.min_ts, s.max_ts),
        }
    }

    pub fn event_id(&self) -> Option<EventId> {
        match self {
            Entry::Event(e) => Some(e.id),
            _ => None,
        }
    }

    /// Approximate resident size, used for the budget's byte accounting
    /// (`Segment::Insert`'s `m_memory_usage +=`).
    fn memory_size(&self) -> u64 {
        match self {
            Entry::Event(_) => std::mem::size_of::<Event>() as u64,
            Entry::Sample(_) => std::mem::size_of::<Sample>() as u64,
            Entry::SampleLod(_) => std::mem::size_of::<SampleLod>() as u64,
        }
    }
}

/// A time-bounded, per-level index of entries (spec §3 "Segment").
pub struct Segment {
    pub id: SegmentId,
    start_timestamp: Timestamp,
    end_timestamp: Timestamp,
    min_timestamp: Timestamp,
    max_timestamp: Timestamp,
    memory_usage: u64,
    entries: BTreeMap<u8, BTreeMap<Timestamp, Entry>>,
}

impl Segment {
    pub fn new(id: SegmentId, start_timestamp: Timestamp, end_timestamp: Timestamp) -> Self {
        Segment {
            id,
            start_timestamp,
            end_timestamp,
            min_timestamp: start_timestamp,
            max_timestamp: end_timestamp,
            memory_usage: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn start_timestamp(&self) -> Timestamp {
        self.start_timestamp
    }

    pub fn memory_usage(&self) -> u64 {
        self.memory_usage
    }

    pub fn num_entries(&self) -> usize {
        self.entries.values().map(|level| level.len()).sum()
    }

    /// Records widening of the segment's actual observed span, distinct from
    /// its nominal `[start, end)` slot (the original's `min`/`max`
    /// timestamps, updated as out-of-order LOD events land).
    pub fn widen_observed_span(&mut self, ts: Timestamp) {
        if ts < self.min_timestamp {
            self.min_timestamp = ts;
        }
        if ts > self.max_timestamp {
            self.max_timestamp = ts;
        }
    }

    pub fn insert(&mut self, timestamp: Timestamp, level: u8, entry: Entry) {
        let bucket = self.entries.entry(level).or_default();
        let had = bucket.len();
        let size = entry.memory_size();
        bucket.insert(timestamp, entry);
        if bucket.len() != had {
            self.memory_usage += size;
        }
    }

    /// Appends every entry overlapping `[start, end]` into `out`, optionally
    /// deduplicating events already seen via `dedup` (a query spanning
    /// multiple segments can otherwise double-count an event whose LOD
    /// parent straddles a boundary).
    pub fn fetch(
        &self,
        start: Timestamp,
        end: Timestamp,
        out: &mut Vec<Entry>,
        mut dedup: Option<&mut HashSet<EventId>>,
    ) -> Result<()> {
        let last_timestamp = self.end_timestamp.max(self.max_timestamp);
        if self.start_timestamp > end || last_timestamp < start {
            return Err(EngineError::OutOfRange(format!(
                "segment [{}, {}] does not overlap query [{start}, {end}]",
                self.start_timestamp, last_timestamp
            )));
        }

        for level in self.entries.values() {
            for entry in level.values() {
                let (min_ts, max_ts) = entry.span();
                if min_ts > end || max_ts < start {
                    continue;
                }
                if let Some(seen) = dedup.as_deref_mut() {
                    if let Some(id) = entry.event_id() {
                        if !seen.insert(id) {
                            continue;
                        }
                    }
                }
                out.push(entry.clone());
            }
        }
        Ok(())
    }

    /// Drops every entry and returns the bytes reclaimed.
    pub fn clear(&mut self) -> u64 {
        let freed = self.memory_usage;
        self.entries.clear();
        self.memory_usage = 0;
        freed
    }
}

struct TimelineState {
    segments: BTreeMap<Timestamp, Segment>,
    by_id: HashMap<SegmentId, Timestamp>,
    valid: Vec<bool>,
    processed: Vec<bool>,
}

/// An ordered sequence of fixed-width `Segment`s covering one track's whole
/// duration at one LOD (spec §3 "SegmentTimeline").
pub struct SegmentTimeline {
    segment_start: Timestamp,
    segment_duration: i64,
    num_segments: u32,
    state: Mutex<TimelineState>,
    /// Guards the `processed` announcements (spec §4.5 step 3: "waits on
    /// the CV until no processed[j] bit in range is set").
    cv: Condvar,
}

impl SegmentTimeline {
    pub fn new(segment_start: Timestamp, segment_duration: i64, num_segments: u32) -> Self {
        SegmentTimeline {
            segment_start,
            segment_duration,
            num_segments,
            state: Mutex::new(TimelineState {
                segments: BTreeMap::new(),
                by_id: HashMap::new(),
                valid: vec![false; num_segments as usize],
                processed: vec![false; num_segments as usize],
            }),
            cv: Condvar::new(),
        }
    }

    pub fn segment_duration(&self) -> i64 {
        self.segment_duration
    }

    pub fn num_segments(&self) -> u32 {
        self.num_segments
    }

    pub fn segment_start(&self) -> Timestamp {
        self.segment_start
    }

    /// The `[start, end)` bounds of the slot at `index`.
    pub fn segment_bounds(&self, index: u32) -> (Timestamp, Timestamp) {
        let start = self
            .segment_start
            .saturating_add((index as i64).saturating_mul(self.segment_duration));
        let end = start.saturating_add(self.segment_duration);
        (start, end)
    }

    /// Gets the segment starting at `start`, creating it via `make` if it
    /// doesn't exist yet, then runs `f` against it under the timeline's
    /// lock (spec §4.5 "Insert": find-or-create is one writer-held
    /// operation, not a racy check-then-insert).
    pub fn with_segment_mut<R>(
        &self,
        start: Timestamp,
        make: impl FnOnce() -> Segment,
        f: impl FnOnce(&mut Segment) -> R,
    ) -> R {
        let mut state = self.state.lock().unwrap();
        let segment = state.segments.entry(start).or_insert_with(make);
        let id = segment.id;
        let result = f(segment);
        state.by_id.insert(id, start);
        result
    }

    /// Index of the slot `ts` falls in, or `None` if outside the timeline's
    /// configured range.
    pub fn segment_index(&self, ts: Timestamp) -> Option<u32> {
        if self.segment_duration <= 0 {
            return None;
        }
        let offset = ts.saturating_sub(self.segment_start);
        if offset < 0 {
            return None;
        }
        let idx = (offset / self.segment_duration) as u32;
        if idx < self.num_segments {
            Some(idx)
        } else {
            None
        }
    }

    pub fn is_valid(&self, index: u32) -> bool {
        self.state
            .lock()
            .unwrap()
            .valid
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_valid(&self, index: u32, valid: bool) {
        if let Some(slot) = self.state.lock().unwrap().valid.get_mut(index as usize) {
            *slot = valid;
        }
    }

    pub fn is_processed(&self, index: u32) -> bool {
        self.state
            .lock()
            .unwrap()
            .processed
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_processed(&self, index: u32, processed: bool) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(slot) = state.processed.get_mut(index as usize) {
                *slot = processed;
            }
        }
        self.cv.notify_all();
    }

    /// Blocks until no index in `[lo, hi)` has its `processed` bit set —
    /// i.e. no other worker is currently generating LOD content for this
    /// range. Returns immediately if the range is already clear.
    pub fn wait_while_processed(&self, lo: u32, hi: u32) {
        let _state = self
            .cv
            .wait_while(self.state.lock().unwrap(), |state| {
                (lo..hi).any(|i| state.processed.get(i as usize).copied().unwrap_or(false))
            })
            .unwrap();
    }

    /// Returns the maximal contiguous runs of indices in `[lo, hi)` whose
    /// `valid` bit is unset, marking each covered index `processed` as it
    /// goes (spec §4.5 step 4: "collects runs of invalid indices... marks
    /// them processed").
    pub fn claim_invalid_runs(&self, lo: u32, hi: u32) -> Vec<(u32, u32)> {
        let mut state = self.state.lock().unwrap();
        let mut runs = Vec::new();
        let mut run_start: Option<u32> = None;
        for i in lo..hi {
            let invalid = !state.valid.get(i as usize).copied().unwrap_or(false);
            if invalid {
                if run_start.is_none() {
                    run_start = Some(i);
                }
                if let Some(slot) = state.processed.get_mut(i as usize) {
                    *slot = true;
                }
            } else if let Some(start) = run_start.take() {
                runs.push((start, i));
            }
        }
        if let Some(start) = run_start {
            runs.push((start, hi));
        }
        runs
    }

    /// Installs a newly built `Segment`. Does not mark it valid; the caller
    /// (graph construction) does that once the segment's content is final.
    pub fn insert(&self, segment: Segment) {
        let mut state = self.state.lock().unwrap();
        state.by_id.insert(segment.id, segment.start_timestamp);
        state.segments.insert(segment.start_timestamp, segment);
    }

    /// Visits every segment overlapping `[start, end]` in time order,
    /// calling `visit` on each. An `OutOfRange` from `visit` is tolerated
    /// (some segments legitimately contain nothing for the query) and
    /// treated as success for the purpose of continuing the scan; any other
    /// error aborts immediately.
    pub fn fetch_segments<F>(&self, start: Timestamp, end: Timestamp, mut visit: F) -> Result<()>
    where
        F: FnMut(&Segment) -> Result<()>,
    {
        let state = self.state.lock().unwrap();
        let mut found_any = false;
        for segment in state.segments.values() {
            let max_ts = segment.end_timestamp.max(segment.max_timestamp);
            if segment.start_timestamp > end {
                break;
            }
            if max_ts < start {
                continue;
            }
            match visit(segment) {
                Ok(()) => found_any = true,
                Err(EngineError::OutOfRange(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if found_any {
            Ok(())
        } else {
            Err(EngineError::OutOfRange(format!(
                "no segment in timeline overlaps [{start}, {end}]"
            )))
        }
    }

    /// Drops the segment starting at `segment_start` and clears its valid
    /// bit.
    pub fn remove(&self, segment_start: Timestamp) -> u64 {
        let mut state = self.state.lock().unwrap();
        let Some(mut segment) = state.segments.remove(&segment_start) else {
            return 0;
        };
        state.by_id.remove(&segment.id);
        let index = self.segment_index(segment_start);
        let freed = segment.clear();
        drop(state);
        if let Some(index) = index {
            self.set_valid(index, false);
        }
        freed
    }

    /// Removes every segment overlapping `[start, end]`, for an explicit
    /// delete (`Trace::delete_time_slice`) rather than LRU pressure.
    /// Returns each removed segment's id and freed bytes so the caller can
    /// reconcile the memory manager's bookkeeping.
    pub fn remove_range(&self, start: Timestamp, end: Timestamp) -> Vec<(SegmentId, u64)> {
        let starts: Vec<Timestamp> = {
            let state = self.state.lock().unwrap();
            state
                .segments
                .values()
                .filter(|seg| seg.start_timestamp <= end && seg.end_timestamp.max(seg.max_timestamp) >= start)
                .map(|seg| seg.start_timestamp)
                .collect()
        };
        starts
            .into_iter()
            .map(|segment_start| {
                let id = {
                    let state = self.state.lock().unwrap();
                    state.segments.get(&segment_start).map(|s| s.id)
                };
                let freed = self.remove(segment_start);
                (id.unwrap_or(SegmentId::INVALID), freed)
            })
            .collect()
    }
}

impl EvictionTarget for SegmentTimeline {
    fn evict_segment(&self, segment: SegmentId) -> u64 {
        let start = {
            let state = self.state.lock().unwrap();
            match state.by_id.get(&segment) {
                Some(&start) => start,
                None => return 0,
            }
        };
        self.remove(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traceview_common::StringId;

    fn event(id: u64, start: i64, end: i64) -> Entry {
        Entry::Event(Event {
            id: EventId::new(id),
            start: Timestamp::new(start),
            end: Timestamp::new(end),
            level: 0,
            category_id: StringId::new(0),
            name_id: StringId::new(0),
            children: vec![],
            top_name_id: None,
        })
    }

    #[test]
    fn fetch_returns_out_of_range_when_no_overlap() {
        let mut seg = Segment::new(SegmentId::new(0), Timestamp::new(0), Timestamp::new(100));
        seg.insert(Timestamp::new(10), 0, event(1, 10, 20));
        let mut out = Vec::new();
        let err = seg
            .fetch(Timestamp::new(200), Timestamp::new(300), &mut out, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange(_)));
    }

    #[test]
    fn fetch_dedups_events_across_calls() {
        let mut seg = Segment::new(SegmentId::new(0), Timestamp::new(0), Timestamp::new(100));
        seg.insert(Timestamp::new(10), 0, event(1, 10, 20));
        seg.insert(Timestamp::new(30), 0, event(1, 30, 40));

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seg.fetch(Timestamp::new(0), Timestamp::new(100), &mut out, Some(&mut seen))
            .unwrap();
        // Both entries are stored under event id 1; only the first survives dedup.
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn clear_reports_freed_bytes_and_empties_segment() {
        let mut seg = Segment::new(SegmentId::new(0), Timestamp::new(0), Timestamp::new(100));
        seg.insert(Timestamp::new(10), 0, event(1, 10, 20));
        assert!(seg.memory_usage() > 0);
        let freed = seg.clear();
        assert_eq!(freed, seg.memory_usage());
        assert_eq!(seg.num_entries(), 0);
    }

    #[test]
    fn segment_index_respects_bounds() {
        let timeline = SegmentTimeline::new(Timestamp::new(0), 100, 4);
        assert_eq!(timeline.segment_index(Timestamp::new(0)), Some(0));
        assert_eq!(timeline.segment_index(Timestamp::new(150)), Some(1));
        assert_eq!(timeline.segment_index(Timestamp::new(500)), None);
        assert_eq!(timeline.segment_index(Timestamp::new(-1)), None);
    }

    #[test]
    fn valid_and_processed_bits_round_trip() {
        let timeline = SegmentTimeline::new(Timestamp::new(0), 100, 4);
        assert!(!timeline.is_valid(2));
        timeline.set_valid(2, true);
        assert!(timeline.is_valid(2));
        timeline.set_processed(2, true);
        assert!(timeline.is_processed(2));
    }

    #[test]
    fn evict_segment_through_trait_object_clears_and_invalidates() {
        let timeline = std::sync::Arc::new(SegmentTimeline::new(Timestamp::new(0), 100, 4));
        let mut seg = Segment::new(SegmentId::new(7), Timestamp::new(0), Timestamp::new(100));
        seg.insert(Timestamp::new(10), 0, event(1, 10, 20));
        timeline.insert(seg);
        timeline.set_valid(0, true);

        let target: std::sync::Arc<dyn EvictionTarget> = timeline.clone();
        let freed = target.evict_segment(SegmentId::new(7));
        assert!(freed > 0);
        assert!(!timeline.is_valid(0));
    }

    #[test]
    fn claim_invalid_runs_finds_contiguous_gaps_and_marks_processed() {
        let timeline = SegmentTimeline::new(Timestamp::new(0), 100, 8);
        timeline.set_valid(2, true);
        timeline.set_valid(3, true);
        let runs = timeline.claim_invalid_runs(0, 8);
        assert_eq!(runs, vec![(0, 2), (4, 8)]);
        assert!(timeline.is_processed(0));
        assert!(!timeline.is_processed(2));
    }

    #[test]
    fn with_segment_mut_creates_once_and_reuses() {
        let timeline = SegmentTimeline::new(Timestamp::new(0), 100, 4);
        let mut next_id = 0u64;
        for _ in 0..3 {
            timeline.with_segment_mut(
                Timestamp::new(0),
                || {
                    next_id += 1;
                    Segment::new(SegmentId::new(next_id), Timestamp::new(0), Timestamp::new(100))
                },
                |segment| segment.insert(Timestamp::new(10), 0, event(1, 10, 20)),
            );
        }
        assert_eq!(next_id, 1, "segment should be created exactly once");
    }

    #[test]
    fn fetch_segments_visits_in_time_order() {
        let timeline = SegmentTimeline::new(Timestamp::new(0), 100, 4);
        timeline.insert(Segment::new(SegmentId::new(0), Timestamp::new(0), Timestamp::new(100)));
        timeline.insert(Segment::new(SegmentId::new(1), Timestamp::new(100), Timestamp::new(200)));

        let mut order = Vec::new();
        timeline
            .fetch_segments(Timestamp::new(0), Timestamp::new(200), |segment| {
                order.push(segment.id);
                Ok(())
            })
            .unwrap();
        assert_eq!(order, vec![SegmentId::new(0), SegmentId::new(1)]);
    }
}
