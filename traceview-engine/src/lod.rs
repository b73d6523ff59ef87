//! Level-of-detail generation (spec §4.5), grounded on
//! `rocprofvis_controller_graph.cpp`'s `CombineEventInfo`/`GenerateLODEvent`
//! and `rocprofvis_controller_sample_lod.cpp`'s child-aggregation.
//!
//! This module is pure: it takes already-fetched LOD `k-1` entries for one
//! window and produces the LOD `k` entries, with no knowledge of segments,
//! graphs, or storage. `Graph::fetch` (in `model::graph`) drives it per
//! contiguous invalid run.

use std::collections::{BTreeMap, HashMap};

use traceview_common::{EventId, SampleId, StringId, Timestamp};

use crate::interner::StringInterner;
use crate::model::event::{Event, Sample, SampleLod};

/// Builds the combined name string for a run of same-level, same-window
/// events and picks the "top" name (the one contributing the largest total
/// duration). A single event just keeps its own name, unmerged.
pub fn combine_event_info(interner: &StringInterner, events: &[Event]) -> (StringId, Option<StringId>) {
    assert!(!events.is_empty(), "combine_event_info requires at least one event");
    if events.len() == 1 {
        return (events[0].name_id, None);
    }

    let mut order: Vec<StringId> = Vec::new();
    let mut accum: HashMap<StringId, (u32, i64)> = HashMap::new();
    for event in events {
        let duration_ns = event.end.saturating_sub(event.start);
        let entry = accum.entry(event.name_id).or_insert_with(|| {
            order.push(event.name_id);
            (0, 0)
        });
        entry.0 += 1;
        entry.1 += duration_ns;
    }

    let mut combined_name = String::new();
    let mut top_name_id = None;
    let mut top_duration = i64::MIN;
    for name_id in order {
        let (count, total_duration_ns) = accum[&name_id];
        if !combined_name.is_empty() {
            combined_name.push('\n');
        }
        let name = interner.resolve(name_id).unwrap_or_else(|| "Unknown Name".to_string());
        combined_name.push_str(&format!("{count}|{total_duration_ns}|{name}"));
        if total_duration_ns > top_duration {
            top_duration = total_duration_ns;
            top_name_id = Some(name_id);
        }
    }

    (interner.intern(&combined_name), top_name_id)
}

fn window_index_for(window_start: Timestamp, window_size: i64, ts: Timestamp) -> i64 {
    if window_size <= 0 {
        return 0;
    }
    ts.saturating_sub(window_start).div_euclid(window_size)
}

fn window_bound(window_start: Timestamp, window_size: i64, index: i64) -> Timestamp {
    window_start.saturating_add(index.saturating_mul(window_size))
}

fn emit_combined_event(
    interner: &StringInterner,
    bucket: &[Event],
    start: Timestamp,
    end: Timestamp,
    level: u8,
    id: EventId,
) -> Event {
    let (name_id, top_name_id) = combine_event_info(interner, bucket);
    let category_id = bucket[0].category_id;
    let children = bucket.iter().map(|e| e.id).collect();
    Event {
        id,
        start,
        end,
        level,
        category_id,
        name_id,
        children,
        top_name_id,
    }
}

/// Merges `raw` (sorted by start timestamp, LOD `k-1`) into LOD `k` events.
/// Consecutive events at the same level that land in the same
/// `window_size`-wide window are combined into one synthetic event (spec
/// §4.5 "LOD generation rule for events"). `alloc_id` mints ids for the
/// synthesized events.
pub fn generate_lod_events<F: FnMut() -> EventId>(
    interner: &StringInterner,
    window_start: Timestamp,
    window_size: i64,
    raw: &[Event],
    mut alloc_id: F,
) -> Vec<Event> {
    let mut out = Vec::new();
    let Some(first) = raw.first() else {
        return out;
    };

    let mut window_index = window_index_for(window_start, window_size, first.start);
    let mut window_min = window_bound(window_start, window_size, window_index);
    let mut window_max = window_bound(window_start, window_size, window_index + 1);
    let mut current_level = first.level;
    let mut bucket: Vec<Event> = Vec::new();
    let mut bucket_min = first.start;
    let mut bucket_max = first.end;

    for event in raw {
        let outside_window = event.start < window_min || event.start > window_max;
        let level_changed = event.level != current_level;

        if (outside_window || level_changed) && !bucket.is_empty() {
            out.push(emit_combined_event(
                interner,
                &bucket,
                bucket_min,
                bucket_max,
                current_level,
                alloc_id(),
            ));
            bucket.clear();
        }

        if outside_window {
            window_index = window_index_for(window_start, window_size, event.start);
            window_min = window_bound(window_start, window_size, window_index);
            window_max = window_bound(window_start, window_size, window_index + 1);
        }

        if bucket.is_empty() {
            bucket_min = event.start;
            bucket_max = event.end;
        } else {
            bucket_max = bucket_max.max(event.end);
        }
        current_level = event.level;
        bucket.push(event.clone());
    }

    if !bucket.is_empty() {
        out.push(emit_combined_event(
            interner,
            &bucket,
            bucket_min,
            bucket_max,
            current_level,
            alloc_id(),
        ));
    }

    out
}

/// Merges `raw` samples (sorted by timestamp, LOD `k-1`) into LOD `k`
/// `SampleLod`s, one per `window_size`-wide window that contains at least
/// one sample (spec §4.5 "LOD generation rule for samples").
pub fn generate_lod_samples<F: FnMut() -> SampleId>(
    window_start: Timestamp,
    window_size: i64,
    raw: &[Sample],
    mut alloc_id: F,
) -> Vec<SampleLod> {
    let mut out = Vec::new();
    let Some(first) = raw.first() else {
        return out;
    };

    let mut window_max = {
        let index = window_index_for(window_start, window_size, first.timestamp);
        window_bound(window_start, window_size, index + 1)
    };
    let mut bucket: Vec<Sample> = Vec::new();

    for sample in raw {
        if sample.timestamp > window_max && !bucket.is_empty() {
            out.push(SampleLod::from_children(alloc_id(), bucket[0].timestamp, &bucket));
            bucket.clear();
        }
        if bucket.is_empty() {
            let index = window_index_for(window_start, window_size, sample.timestamp);
            window_max = window_bound(window_start, window_size, index + 1);
        }
        bucket.push(*sample);
    }

    if !bucket.is_empty() {
        out.push(SampleLod::from_children(alloc_id(), bucket[0].timestamp, &bucket));
    }

    out
}

/// Assigns each event's `level` in chronological order within its own key
/// group (e.g. `(node, process, thread)` for Region events, `(node, agent,
/// queue)` for KernelDispatch). The level is the smallest non-negative
/// integer not occupied by a still-active event in the same group at the
/// new event's start time (spec §4.5 "Event-level precomputation"). Events
/// not sorted by `start` on entry are sorted in place.
pub fn compute_levels<K: Eq + std::hash::Hash + Clone>(events: &mut [(K, Event)]) {
    events.sort_by_key(|(_, event)| event.start);

    let mut active: HashMap<K, BTreeMap<u8, Timestamp>> = HashMap::new();
    for (key, event) in events.iter_mut() {
        let levels = active.entry(key.clone()).or_default();
        levels.retain(|_, end| *end > event.start);

        let mut level: u8 = 0;
        while levels.contains_key(&level) {
            level += 1;
        }
        levels.insert(level, event.end);
        event.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traceview_common::StringId;

    fn ev(id: u64, start: i64, end: i64, level: u8, name: StringId) -> Event {
        Event {
            id: EventId::new(id),
            start: Timestamp::new(start),
            end: Timestamp::new(end),
            level,
            category_id: StringId::new(0),
            name_id: name,
            children: vec![],
            top_name_id: None,
        }
    }

    #[test]
    fn combine_single_event_keeps_its_own_name() {
        let interner = StringInterner::new();
        let name = interner.intern("kernel_a");
        let events = vec![ev(1, 0, 10, 0, name)];
        let (combined, top) = combine_event_info(&interner, &events);
        assert_eq!(combined, name);
        assert!(top.is_none());
    }

    #[test]
    fn combine_multiple_events_picks_top_by_total_duration() {
        let interner = StringInterner::new();
        let a = interner.intern("short_kernel");
        let b = interner.intern("long_kernel");
        let events = vec![ev(1, 0, 5, 0, a), ev(2, 5, 100, 0, b), ev(3, 100, 105, 0, a)];
        let (combined_id, top) = combine_event_info(&interner, &events);
        assert_eq!(top, Some(b));
        let combined = interner.resolve(combined_id).unwrap();
        assert!(combined.contains("2|10|short_kernel"));
        assert!(combined.contains("1|95|long_kernel"));
    }

    #[test]
    fn generate_lod_events_merges_within_window_and_splits_across() {
        let interner = StringInterner::new();
        let name = interner.intern("op");
        let raw = vec![
            ev(1, 0, 5, 0, name),
            ev(2, 5, 8, 0, name),
            ev(3, 50, 55, 0, name),
        ];
        let mut next_id = 100u64;
        let out = generate_lod_events(&interner, Timestamp::new(0), 10, &raw, || {
            next_id += 1;
            EventId::new(next_id)
        });
        // First window [0,10) merges events 1 and 2; the third event at
        // t=50 falls in a later window and stays separate.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].children, vec![EventId::new(1), EventId::new(2)]);
        assert_eq!(out[1].children, vec![EventId::new(3)]);
    }

    #[test]
    fn generate_lod_events_splits_on_level_change_within_same_window() {
        let interner = StringInterner::new();
        let name = interner.intern("op");
        let raw = vec![ev(1, 0, 2, 0, name), ev(2, 2, 4, 1, name), ev(3, 4, 6, 0, name)];
        let mut next_id = 0u64;
        let out = generate_lod_events(&interner, Timestamp::new(0), 100, &raw, || {
            next_id += 1;
            EventId::new(next_id)
        });
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].level, 0);
        assert_eq!(out[1].level, 1);
        assert_eq!(out[2].level, 0);
    }

    fn sample(ts: i64, next_ts: i64, value: f64) -> Sample {
        Sample {
            id: SampleId::new(0),
            timestamp: Timestamp::new(ts),
            next_timestamp: Timestamp::new(next_ts),
            value,
            next_value: value,
        }
    }

    #[test]
    fn generate_lod_samples_merges_by_window() {
        let raw = vec![sample(0, 10, 1.0), sample(10, 20, 2.0), sample(50, 60, 3.0)];
        let mut next_id = 0u64;
        let out = generate_lod_samples(Timestamp::new(0), 30, &raw, || {
            next_id += 1;
            SampleId::new(next_id)
        });
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].mean, 1.5);
        assert_eq!(out[1].mean, 3.0);
    }

    #[test]
    fn compute_levels_reuses_freed_levels() {
        let mut events = vec![
            ("k".to_string(), ev(1, 0, 10, 0, StringId::new(0))),
            ("k".to_string(), ev(2, 1, 5, 0, StringId::new(0))),
            ("k".to_string(), ev(3, 6, 9, 0, StringId::new(0))),
        ];
        compute_levels(&mut events);
        assert_eq!(events[0].1.level, 0);
        assert_eq!(events[1].1.level, 1); // overlaps event 1
        assert_eq!(events[2].1.level, 1); // event 2 ended by t=6, level 1 free
    }
}
