//! `Graph` (spec §4.5), grounded on `rocprofvis_controller_graph.cpp`.
//!
//! A `Graph` owns one `SegmentTimeline` per LOD. LOD 0 is populated directly
//! during metadata ingestion; every `k > 0` is materialized lazily by
//! `fetch`, which compresses LOD 0 entries through `crate::lod` into
//! whatever contiguous segment runs are missing for the requested range.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use traceview_common::{EventId, SampleId, SegmentId, Timestamp};

use crate::error::{EngineError, Result};
use crate::interner::StringInterner;
use crate::lod;
use crate::memory::MemoryManager;
use crate::model::event::{Event, Sample};
use crate::model::segment::{Entry, Segment, SegmentTimeline};
use crate::model::track::TrackKind;

pub struct Graph {
    pub id: u64,
    kind: TrackKind,
    /// LOD `k`'s segment duration is `base_segment_duration * scale^k`,
    /// capped by the track span and by `max_segment_duration` (spec §4.5).
    scale: i64,
    base_segment_duration: i64,
    max_segment_duration: i64,
    lods: Mutex<HashMap<u32, Arc<SegmentTimeline>>>,
    next_event_id: AtomicU64,
    next_sample_id: AtomicU64,
    next_segment_id: AtomicU64,
}

impl Graph {
    pub fn new(id: u64, kind: TrackKind, scale: i64, base_segment_duration: i64, max_segment_duration: i64) -> Self {
        Graph {
            id,
            kind,
            scale: scale.max(2),
            base_segment_duration: base_segment_duration.max(1),
            max_segment_duration: max_segment_duration.max(1),
            lods: Mutex::new(HashMap::new()),
            next_event_id: AtomicU64::new(1),
            next_sample_id: AtomicU64::new(1),
            next_segment_id: AtomicU64::new(1),
        }
    }

    /// The smallest LOD `k` such that `(end-start)/scale^k <= pixels*scale`
    /// (spec §4.5 "Graph.Fetch").
    pub fn target_lod(&self, pixels: u32, start: Timestamp, end: Timestamp) -> u32 {
        let threshold = pixels as f64 * self.scale as f64;
        let mut duration = end.saturating_sub(start) as f64;
        let mut lod = 0u32;
        while duration > threshold {
            duration /= self.scale as f64;
            lod += 1;
        }
        lod
    }

    /// Number of LODs materialized so far (spec §6.1 `GraphNumLods`). Grows
    /// lazily as `fetch` is called at finer zoom levels; LOD 0 exists once
    /// any raw entry has been ingested.
    pub fn num_lods(&self) -> usize {
        self.lods.lock().unwrap().len()
    }

    /// Segment duration of an already-materialized LOD, or `None` if `lod`
    /// hasn't been fetched/ingested yet (spec §6.1 `GraphLodSegmentDuration`).
    pub fn lod_segment_duration(&self, lod: u32) -> Option<i64> {
        self.lods.lock().unwrap().get(&lod).map(|t| t.segment_duration())
    }

    fn segment_duration_for(&self, lod: u32, track_span_ns: i64) -> i64 {
        let scale_pow = self.scale.saturating_pow(lod);
        self.base_segment_duration
            .saturating_mul(scale_pow)
            .min(track_span_ns.max(1))
            .min(self.max_segment_duration)
            .max(1)
    }

    fn ensure_timeline(&self, lod: u32, track_min: Timestamp, track_max: Timestamp) -> Arc<SegmentTimeline> {
        let mut lods = self.lods.lock().unwrap();
        if let Some(existing) = lods.get(&lod) {
            return Arc::clone(existing);
        }
        let span = track_max.saturating_sub(track_min).max(1);
        let segment_duration = self.segment_duration_for(lod, span);
        let num_segments = ((span as f64) / (segment_duration as f64)).ceil().max(1.0) as u32;
        let timeline = Arc::new(SegmentTimeline::new(track_min, segment_duration, num_segments));
        lods.insert(lod, Arc::clone(&timeline));
        timeline
    }

    fn alloc_event_id(&self) -> EventId {
        EventId::new(self.next_event_id.fetch_add(1, Ordering::SeqCst))
    }

    fn alloc_sample_id(&self) -> SampleId {
        SampleId::new(self.next_sample_id.fetch_add(1, Ordering::SeqCst))
    }

    fn alloc_segment_id(&self) -> SegmentId {
        SegmentId::new(self.next_segment_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Ingests one raw (LOD 0) entry (called during metadata load, spec
    /// §4.6 step 2b "slice query feeds the LOD 0 cache").
    pub fn insert_raw(&self, track_min: Timestamp, track_max: Timestamp, timestamp: Timestamp, level: u8, entry: Entry) {
        let timeline = self.ensure_timeline(0, track_min, track_max);
        let Some(index) = timeline.segment_index(timestamp) else {
            return;
        };
        let (seg_start, seg_end) = timeline.segment_bounds(index);
        let id = self.alloc_segment_id();
        timeline.with_segment_mut(
            seg_start,
            || Segment::new(id, seg_start, seg_end),
            |segment| {
                segment.widen_observed_span(timestamp);
                segment.insert(timestamp, level, entry);
            },
        );
        timeline.set_valid(index, true);
    }

    /// Fetches entries for `[start, end]` at the LOD appropriate for
    /// `pixels`, materializing any missing LOD-k segments first (spec §4.5
    /// "Graph.Fetch").
    pub fn fetch(
        &self,
        memory: &MemoryManager,
        interner: &StringInterner,
        pixels: u32,
        start: Timestamp,
        end: Timestamp,
        track_min: Timestamp,
        track_max: Timestamp,
    ) -> Result<Vec<Entry>> {
        let lod = self.target_lod(pixels, start, end);
        let start = start.max(track_min);
        let end = end.min(track_max);
        if end <= start {
            return Err(EngineError::OutOfRange(format!(
                "fetch range [{start}, {end}] does not intersect track span"
            )));
        }

        let timeline = self.ensure_timeline(lod, track_min, track_max);

        if lod > 0 {
            let lo = timeline.segment_index(start).unwrap_or(0);
            let hi = timeline
                .segment_index(end)
                .map(|i| i + 1)
                .unwrap_or(timeline.num_segments());

            timeline.wait_while_processed(lo, hi);
            let runs = timeline.claim_invalid_runs(lo, hi);

            let lod0 = self.ensure_timeline(0, track_min, track_max);
            for (run_lo, run_hi) in runs {
                let (sub_start, _) = timeline.segment_bounds(run_lo);
                let (_, sub_end) = timeline.segment_bounds(run_hi.saturating_sub(1));
                self.materialize_lod_run(memory, interner, &lod0, &timeline, lod, sub_start, sub_end);
                for i in run_lo..run_hi {
                    timeline.set_valid(i, true);
                    timeline.set_processed(i, false);
                }
            }
        }

        let mut out = Vec::new();
        timeline.fetch_segments(start, end, |segment| {
            segment.fetch(start, end, &mut out, None)?;
            memory.touch_segment(segment.id);
            Ok(())
        })?;
        Ok(out)
    }

    /// Pulls LOD 0 raw entries for `[sub_start, sub_end]`, compresses them
    /// through `crate::lod`, and inserts the results into `timeline`'s LOD
    /// `lod` segments (spec §4.5 step 5).
    fn materialize_lod_run(
        &self,
        memory: &MemoryManager,
        interner: &StringInterner,
        lod0: &Arc<SegmentTimeline>,
        timeline: &Arc<SegmentTimeline>,
        lod: u32,
        sub_start: Timestamp,
        sub_end: Timestamp,
    ) {
        let mut raw = Vec::new();
        let _ = lod0.fetch_segments(sub_start, sub_end, |segment| segment.fetch(sub_start, sub_end, &mut raw, None));

        match self.kind {
            TrackKind::Events => {
                let events: Vec<Event> = raw
                    .into_iter()
                    .filter_map(|e| match e {
                        Entry::Event(ev) => Some(ev),
                        _ => None,
                    })
                    .collect();
                let window_size = timeline.segment_duration();
                let generated = lod::generate_lod_events(interner, sub_start, window_size, &events, || self.alloc_event_id());
                for event in generated {
                    self.insert_generated(memory, timeline, lod, event.start, event.level, Entry::Event(event));
                }
            }
            TrackKind::Samples => {
                let samples: Vec<Sample> = raw
                    .into_iter()
                    .filter_map(|e| match e {
                        Entry::Sample(s) => Some(s),
                        Entry::SampleLod(s) => Some(s.base),
                        _ => None,
                    })
                    .collect();
                let window_size = timeline.segment_duration();
                let generated = lod::generate_lod_samples(sub_start, window_size, &samples, || self.alloc_sample_id());
                for sample_lod in generated {
                    let ts = sample_lod.base.timestamp;
                    self.insert_generated(memory, timeline, lod, ts, 0, Entry::SampleLod(sample_lod));
                }
            }
        }
    }

    fn insert_generated(&self, memory: &MemoryManager, timeline: &Arc<SegmentTimeline>, lod: u32, timestamp: Timestamp, level: u8, entry: Entry) {
        let Some(index) = timeline.segment_index(timestamp) else {
            return;
        };
        let (seg_start, seg_end) = timeline.segment_bounds(index);
        let segment_id = self.alloc_segment_id();
        let bytes = {
            let mut bytes = 0u64;
            timeline.with_segment_mut(
                seg_start,
                || Segment::new(segment_id, seg_start, seg_end),
                |segment| {
                    let before = segment.memory_usage();
                    segment.widen_observed_span(timestamp);
                    segment.insert(timestamp, level, entry);
                    bytes = segment.memory_usage() - before;
                },
            );
            bytes
        };
        if bytes > 0 {
            let owner: Arc<dyn crate::memory::EvictionTarget> = Arc::clone(timeline);
            memory.track_segment(segment_id, owner, lod, bytes);
        }
    }

    /// Drops every segment, at every LOD, overlapping `[start, end]`
    /// (spec §6.1 `trace.delete_time_slice`). Reconciles the memory
    /// manager's bookkeeping for each segment removed.
    pub fn delete_time_slice(&self, memory: &MemoryManager, start: Timestamp, end: Timestamp) {
        let timelines: Vec<Arc<SegmentTimeline>> = self.lods.lock().unwrap().values().cloned().collect();
        for timeline in timelines {
            for (segment_id, freed) in timeline.remove_range(start, end) {
                memory.forget_segment(segment_id, freed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::EngineContext;
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
    fn target_lod_steps_down_by_scale_until_within_pixel_budget() {
        let graph = Graph::new(0, TrackKind::Events, 10, 1, 1_000_000);
        assert_eq!(graph.target_lod(1000, Timestamp::new(0), Timestamp::new(500)), 0);
        assert_eq!(graph.target_lod(10, Timestamp::new(0), Timestamp::new(10_000)), 2);
    }

    #[test]
    fn fetch_materializes_lod_and_returns_merged_entries() {
        let ctx = Arc::new(EngineContext::with_fixed_phys_avail(EngineConfig::default(), 10_000_000_000));
        let memory = MemoryManager::new(ctx, 0);
        let interner = StringInterner::new();
        let name = interner.intern("op");

        let graph = Graph::new(0, TrackKind::Events, 10, 100, 1_000_000);
        let track_min = Timestamp::new(0);
        let track_max = Timestamp::new(1_000);

        for (id, start, end) in [(1u64, 0i64, 5i64), (2, 5, 9), (3, 500, 505)] {
            graph.insert_raw(
                track_min,
                track_max,
                Timestamp::new(start),
                0,
                Entry::Event(Event {
                    id: EventId::new(id),
                    start: Timestamp::new(start),
                    end: Timestamp::new(end),
                    level: 0,
                    category_id: StringId::new(0),
                    name_id: name,
                    children: vec![],
                    top_name_id: None,
                }),
            );
        }

        let out = graph
            .fetch(&memory, &interner, 1, track_min, track_max, track_min, track_max)
            .unwrap();
        assert!(!out.is_empty());
        memory.shutdown();
    }

    #[test]
    fn fetch_errors_out_of_range_when_window_outside_track_span() {
        let ctx = Arc::new(EngineContext::with_fixed_phys_avail(EngineConfig::default(), 10_000_000_000));
        let memory = MemoryManager::new(ctx, 0);
        let interner = StringInterner::new();
        let graph = Graph::new(0, TrackKind::Events, 10, 100, 1_000_000);
        let err = graph
            .fetch(
                &memory,
                &interner,
                100,
                Timestamp::new(10_000),
                Timestamp::new(20_000),
                Timestamp::new(0),
                Timestamp::new(1_000),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange(_)));
        memory.shutdown();
    }

    #[test]
    fn insert_raw_marks_segment_valid() {
        let graph = Graph::new(0, TrackKind::Events, 10, 100, 1_000_000);
        graph.insert_raw(Timestamp::new(0), Timestamp::new(1_000), Timestamp::new(10), 0, event(1, 10, 20));
        let lods = graph.lods.lock().unwrap();
        let timeline = lods.get(&0).unwrap();
        let index = timeline.segment_index(Timestamp::new(10)).unwrap();
        assert!(timeline.is_valid(index));
    }
}
