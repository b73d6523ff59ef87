//! Process-wide budgeting state, scoped to one engine instance instead of
//! file-scope globals (spec §9 "Global mutable state" redesign note).
//!
//! The original keeps `g_physical_memory_avail`, `g_total_loaded_size`, and
//! `g_num_traces` as namespace-scope globals shared by every trace in the
//! process. Here they are fields of `EngineContext`, constructed once by the
//! embedding application and handed to every `Trace` as an `Arc`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::EngineConfig;

/// Shared budgeting state for every `Trace` opened against one engine
/// instance. One `EngineContext` per process is the normal setup; tests
/// construct a fresh one per case so traces don't interfere.
pub struct EngineContext {
    pub config: EngineConfig,
    phys_avail_bytes: AtomicU64,
    total_loaded_bytes: AtomicU64,
    num_traces: AtomicU32,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            phys_avail_bytes: AtomicU64::new(0),
            total_loaded_bytes: AtomicU64::new(0),
            num_traces: AtomicU32::new(0),
        }
    }

    /// Builds a context whose `phys_avail_bytes` is pinned to a fixed value
    /// instead of sampled from the OS — used by tests that need a
    /// deterministic, tiny budget (testable property 5's "lower phys_avail
    /// to force L = 1 MB").
    pub fn with_fixed_phys_avail(config: EngineConfig, phys_avail_bytes: u64) -> Self {
        let ctx = Self::new(config);
        ctx.phys_avail_bytes.store(phys_avail_bytes, Ordering::SeqCst);
        ctx
    }

    /// `k% × physical memory`, sampled once and cached for the life of the
    /// context (matches the original's `g_physical_memory_avail == 0` guard).
    pub fn phys_avail_bytes(&self) -> u64 {
        let cached = self.phys_avail_bytes.load(Ordering::SeqCst);
        if cached != 0 {
            return cached;
        }
        let total = total_system_memory_bytes();
        let pct = self.config.phys_avail_percent as u64;
        let avail = (total / 100) * pct;
        self.phys_avail_bytes.store(avail, Ordering::SeqCst);
        avail
    }

    pub fn total_loaded_bytes(&self) -> u64 {
        self.total_loaded_bytes.load(Ordering::SeqCst)
    }

    pub fn num_traces(&self) -> u32 {
        self.num_traces.load(Ordering::SeqCst).max(1)
    }

    /// Registers a newly opened trace of `trace_size` bytes; call once from
    /// `Trace::open`.
    pub fn register_trace(&self, trace_size: u64) {
        self.total_loaded_bytes.fetch_add(trace_size, Ordering::SeqCst);
        self.num_traces.fetch_add(1, Ordering::SeqCst);
    }

    /// Unregisters a closed trace; call once from `Trace::drop`.
    pub fn unregister_trace(&self, trace_size: u64) {
        self.total_loaded_bytes.fetch_sub(trace_size, Ordering::SeqCst);
        self.num_traces.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn total_system_memory_bytes() -> u64 {
    let mut sys = sysinfo::System::new_all();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total > 0 {
        total
    } else {
        8 * 1024 * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_phys_avail_is_stable() {
        let ctx = EngineContext::with_fixed_phys_avail(EngineConfig::default(), 10_000_000);
        assert_eq!(ctx.phys_avail_bytes(), 10_000_000);
        assert_eq!(ctx.phys_avail_bytes(), 10_000_000);
    }

    #[test]
    fn register_and_unregister_round_trip() {
        let ctx = EngineContext::default();
        ctx.register_trace(1_000);
        assert_eq!(ctx.total_loaded_bytes(), 1_000);
        assert_eq!(ctx.num_traces(), 1);
        ctx.unregister_trace(1_000);
        assert_eq!(ctx.total_loaded_bytes(), 0);
    }
}
