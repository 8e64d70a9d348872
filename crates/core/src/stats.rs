//! The statistics record (spec §6.2): counts of freezes, thaws, deep-clones,
//! allocations, GC cycles, peak heap footprint, cumulative allocated bytes,
//! region counts, and freeze/thaw/gc wall-clock timings.
//!
//! Grounded directly on the teacher's
//! `runtime::memory_stats::MemoryStatsRegistry` (an atomics-based registry
//! readable cross-thread without locking the writer), collapsed here to a
//! single process-wide aggregate since Lattice's scheduling is
//! single-OS-thread (spec §5) and there is no per-OS-thread slot to
//! register.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct StatsInner {
    freezes: AtomicU64,
    thaws: AtomicU64,
    deep_clones: AtomicU64,
    allocations: AtomicU64,
    gc_cycles: AtomicU64,
    peak_heap_bytes: AtomicU64,
    cumulative_bytes: AtomicU64,
    region_count: AtomicU64,
    freeze_nanos: AtomicU64,
    thaw_nanos: AtomicU64,
    gc_nanos: AtomicU64,
}

/// A cheaply-`Clone`-able handle onto the shared statistics record.
#[derive(Clone)]
pub struct Stats {
    inner: Arc<StatsInner>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            inner: Arc::new(StatsInner::default()),
        }
    }

    pub fn record_allocation(&self) {
        self.inner.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allocation_bytes(&self, bytes: u64) {
        self.record_allocation();
        self.inner
            .cumulative_bytes
            .fetch_add(bytes, Ordering::Relaxed);
        let new_total = self.inner.cumulative_bytes.load(Ordering::Relaxed);
        self.inner
            .peak_heap_bytes
            .fetch_max(new_total, Ordering::Relaxed);
    }

    pub fn record_gc_cycle(&self) {
        self.inner.gc_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gc_time(&self, d: Duration) {
        self.inner
            .gc_nanos
            .fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_freeze(&self, d: Duration) {
        self.inner.freezes.fetch_add(1, Ordering::Relaxed);
        self.inner
            .freeze_nanos
            .fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_thaw(&self, d: Duration) {
        self.inner.thaws.fetch_add(1, Ordering::Relaxed);
        self.inner
            .thaw_nanos
            .fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_deep_clone(&self) {
        self.inner.deep_clones.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_created(&self) {
        self.inner.region_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_freed(&self) {
        self.inner.region_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            freezes: self.inner.freezes.load(Ordering::Relaxed),
            thaws: self.inner.thaws.load(Ordering::Relaxed),
            deep_clones: self.inner.deep_clones.load(Ordering::Relaxed),
            allocations: self.inner.allocations.load(Ordering::Relaxed),
            gc_cycles: self.inner.gc_cycles.load(Ordering::Relaxed),
            peak_heap_bytes: self.inner.peak_heap_bytes.load(Ordering::Relaxed),
            cumulative_bytes: self.inner.cumulative_bytes.load(Ordering::Relaxed),
            region_count: self.inner.region_count.load(Ordering::Relaxed),
            freeze_nanos: self.inner.freeze_nanos.load(Ordering::Relaxed),
            thaw_nanos: self.inner.thaw_nanos.load(Ordering::Relaxed),
            gc_nanos: self.inner.gc_nanos.load(Ordering::Relaxed),
        }
    }
}

/// An immutable point-in-time read of `Stats`, retrievable on demand (spec §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub freezes: u64,
    pub thaws: u64,
    pub deep_clones: u64,
    pub allocations: u64,
    pub gc_cycles: u64,
    pub peak_heap_bytes: u64,
    pub cumulative_bytes: u64,
    pub region_count: u64,
    pub freeze_nanos: u64,
    pub thaw_nanos: u64,
    pub gc_nanos: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_clones() {
        let stats = Stats::new();
        let handle = stats.clone();
        stats.record_freeze(Duration::from_millis(1));
        handle.record_freeze(Duration::from_millis(1));
        assert_eq!(stats.snapshot().freezes, 2);
    }

    #[test]
    fn peak_heap_bytes_tracks_the_running_maximum() {
        let stats = Stats::new();
        stats.record_allocation_bytes(100);
        stats.record_allocation_bytes(50);
        assert_eq!(stats.snapshot().peak_heap_bytes, 150);
    }
}
