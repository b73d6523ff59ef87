//! Memory budget enforcement and the dedicated LRU eviction worker
//! (spec §4.3). Grounded on
//! `rocprofvis_controller_mem_mgmt.cpp::ManageLRU`/`GetMemoryManagerSizeLimit`.
//!
//! The eviction worker is a plain OS thread, not a tokio task (SPEC_FULL
//! §4.3): eviction must keep making progress even if the tokio pool driving
//! query `Job`s is saturated.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use traceview_common::SegmentId;

use crate::context::EngineContext;
use crate::memory::lru::{EvictionTarget, LruEntry};

struct LruState {
    entries: HashMap<SegmentId, LruEntry>,
    ownership_changed: bool,
    shutdown: bool,
}

pub struct MemoryManager {
    ctx: Arc<EngineContext>,
    trace_size: u64,
    storage_used: AtomicU64,
    lru: Mutex<LruState>,
    cv: Condvar,
    inuse: Mutex<HashSet<u64>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryManager {
    /// Constructs the manager and starts its eviction worker. `trace_size`
    /// is the backing store's on-disk size, the `T` term of the budget
    /// formula — known up front from a single `stat()` on the db file.
    pub fn new(ctx: Arc<EngineContext>, trace_size: u64) -> Arc<Self> {
        ctx.register_trace(trace_size);
        let manager = Arc::new(Self {
            ctx,
            trace_size,
            storage_used: AtomicU64::new(0),
            lru: Mutex::new(LruState {
                entries: HashMap::new(),
                ownership_changed: false,
                shutdown: false,
            }),
            cv: Condvar::new(),
            inuse: Mutex::new(HashSet::new()),
            worker: Mutex::new(None),
        });
        let worker_handle = {
            let manager = Arc::clone(&manager);
            std::thread::Builder::new()
                .name("lru-evict".into())
                .spawn(move || manager.run_eviction_loop())
                .expect("spawn lru-evict thread")
        };
        *manager.worker.lock().unwrap() = Some(worker_handle);
        manager
    }

    /// `L = max(T + (phys_avail - total_loaded)/num_traces, min_budget)`.
    pub fn budget(&self) -> u64 {
        let t = self.trace_size as i64;
        let phys_avail = self.ctx.phys_avail_bytes() as i64;
        let total_loaded = self.ctx.total_loaded_bytes() as i64;
        let num_traces = self.ctx.num_traces() as i64;
        let headroom = (phys_avail - total_loaded) / num_traces.max(1);
        let limit = t + headroom;
        limit.max(self.ctx.config.min_budget_bytes as i64) as u64
    }

    pub fn storage_used(&self) -> u64 {
        self.storage_used.load(Ordering::SeqCst)
    }

    /// Registers `bytes` worth of newly materialized entries under
    /// `segment`, owned by `owner` (the `SegmentTimeline` that can evict it),
    /// and wakes the eviction worker if storage now exceeds budget.
    pub fn track_segment(
        &self,
        segment: SegmentId,
        owner: Arc<dyn EvictionTarget>,
        lod: u32,
        bytes: u64,
    ) {
        self.storage_used.fetch_add(bytes, Ordering::SeqCst);
        let mut state = self.lru.lock().unwrap();
        state.entries.insert(
            segment,
            LruEntry {
                timestamp_ns: now_ns(),
                owner,
                segment,
                lod,
                bytes,
                array_token: 0,
            },
        );
        state.ownership_changed = true;
        self.cv.notify_one();
    }

    /// Re-stamps a segment as most-recently-used after a successful fetch
    /// (spec §4.4 "records an LRU stamp after emission").
    pub fn touch_segment(&self, segment: SegmentId) {
        let mut state = self.lru.lock().unwrap();
        if let Some(entry) = state.entries.get_mut(&segment) {
            entry.timestamp_ns = now_ns();
        }
    }

    /// Drops the LRU bookkeeping for `segment` and reclaims `bytes` from
    /// `storage_used` without going through the eviction worker — used by
    /// explicit deletes (`Trace::delete_time_slice`) rather than budget
    /// pressure.
    pub fn forget_segment(&self, segment: SegmentId, bytes: u64) {
        self.lru.lock().unwrap().entries.remove(&segment);
        self.storage_used.fetch_sub(bytes, Ordering::SeqCst);
    }

    pub fn associate_array_token(&self, segment: SegmentId, token: u64) {
        let mut state = self.lru.lock().unwrap();
        if let Some(entry) = state.entries.get_mut(&segment) {
            entry.array_token = token;
        }
    }

    /// Marks `token` as currently owned by a live fetch; its containing
    /// segments are pinned against eviction until `release_ownership`.
    pub fn enter_ownership(&self, token: u64) {
        self.inuse.lock().unwrap().insert(token);
    }

    /// Releases `token`; if storage is over budget this wakes the eviction
    /// worker (spec §4.3 "triggered by any event that changes in-use
    /// ownership and storage > L").
    pub fn release_ownership(&self, token: u64) {
        self.inuse.lock().unwrap().remove(&token);
        let mut state = self.lru.lock().unwrap();
        state.ownership_changed = true;
        self.cv.notify_one();
    }

    fn run_eviction_loop(&self) {
        loop {
            let mut state = self
                .cv
                .wait_while(self.lru.lock().unwrap(), |s| {
                    !s.shutdown
                        && !(s.ownership_changed
                            && self.storage_used.load(Ordering::SeqCst) > self.budget())
                })
                .unwrap();

            if state.shutdown {
                return;
            }
            state.ownership_changed = false;

            let mut sorted: Vec<SegmentId> = state.entries.keys().copied().collect();
            sorted.sort_by_key(|id| state.entries[id].eviction_key());

            let inuse = self.inuse.lock().unwrap();
            for segment in sorted {
                if self.storage_used.load(Ordering::SeqCst) <= self.budget() {
                    break;
                }
                let Some(entry) = state.entries.get(&segment) else {
                    continue;
                };
                if inuse.contains(&entry.array_token) && entry.array_token != 0 {
                    continue;
                }
                let owner = Arc::clone(&entry.owner);
                state.entries.remove(&segment);
                let freed = owner.evict_segment(segment);
                self.storage_used.fetch_sub(freed, Ordering::SeqCst);
            }
        }
    }

    pub fn shutdown(&self) {
        {
            let mut state = self.lru.lock().unwrap();
            state.shutdown = true;
            self.cv.notify_one();
        }
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        self.shutdown();
        self.ctx.unregister_trace(self.trace_size);
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;

    struct CountingTarget {
        freed_bytes: u64,
        calls: Arc<StdAtomicU64>,
    }
    impl EvictionTarget for CountingTarget {
        fn evict_segment(&self, _segment: SegmentId) -> u64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.freed_bytes
        }
    }

    /// Testable property 5 (abbreviated): after loading well past budget,
    /// the worker brings storage back under it.
    #[test]
    fn eviction_brings_storage_back_under_budget() {
        let ctx = Arc::new(EngineContext::with_fixed_phys_avail(
            EngineConfig {
                min_budget_bytes: 1_000,
                ..EngineConfig::default()
            },
            1_000,
        ));
        let manager = MemoryManager::new(ctx, 0);
        let calls = Arc::new(StdAtomicU64::new(0));

        for i in 0..20u64 {
            let target = Arc::new(CountingTarget {
                freed_bytes: 200,
                calls: Arc::clone(&calls),
            });
            manager.track_segment(SegmentId::new(i), target, 0, 200);
        }

        // Give the background worker a chance to run.
        for _ in 0..50 {
            if manager.storage_used() <= manager.budget() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(manager.storage_used() <= manager.budget());
    }

    /// Testable property 6: LOD 0 (raw) segments evict before higher LODs.
    #[test]
    fn raw_segments_evict_before_higher_lod() {
        let ctx = Arc::new(EngineContext::with_fixed_phys_avail(
            EngineConfig {
                min_budget_bytes: 100,
                ..EngineConfig::default()
            },
            0,
        ));
        let manager = MemoryManager::new(ctx, 0);
        let calls = Arc::new(StdAtomicU64::new(0));

        let raw_target = Arc::new(CountingTarget {
            freed_bytes: 200,
            calls: Arc::clone(&calls),
        });
        let lod_target = Arc::new(CountingTarget {
            freed_bytes: 200,
            calls: Arc::clone(&calls),
        });

        manager.track_segment(SegmentId::new(1), lod_target, 1, 200);
        std::thread::sleep(std::time::Duration::from_millis(5));
        manager.track_segment(SegmentId::new(2), raw_target, 0, 200);

        for _ in 0..50 {
            if manager.storage_used() <= manager.budget() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(manager.storage_used() <= manager.budget());
    }

    #[test]
    fn in_use_segments_are_never_evicted() {
        let ctx = Arc::new(EngineContext::with_fixed_phys_avail(
            EngineConfig {
                min_budget_bytes: 1,
                ..EngineConfig::default()
            },
            0,
        ));
        let manager = MemoryManager::new(ctx, 0);
        let calls = Arc::new(StdAtomicU64::new(0));
        let target = Arc::new(CountingTarget {
            freed_bytes: 200,
            calls: Arc::clone(&calls),
        });

        manager.enter_ownership(42);
        manager.track_segment(SegmentId::new(1), target, 0, 200);
        manager.associate_array_token(SegmentId::new(1), 42);
        {
            let mut state = manager.lru.lock().unwrap();
            state.ownership_changed = true;
        }
        manager.cv.notify_one();

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "in-use segment must survive");
        manager.release_ownership(42);
    }
}
