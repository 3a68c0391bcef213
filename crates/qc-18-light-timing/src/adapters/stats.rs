//! Atomic in-process counters for the light timing engines.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::CacheKind;
use crate::ports::TimingStats;

/// Light timing counters
#[derive(Default)]
pub struct AtomicTimingStats {
    // Cache counters
    delay_cache_hits: AtomicU64,
    delay_cache_misses: AtomicU64,
    timing_cache_hits: AtomicU64,
    timing_cache_misses: AtomicU64,
    offset_cache_hits: AtomicU64,
    offset_cache_misses: AtomicU64,

    delays_computed: AtomicU64,

    // Validation verdicts
    validations_accepted: AtomicU64,
    validations_rejected: AtomicU64,

    // Fan-out items
    batch_items_ok: AtomicU64,
    batch_items_failed: AtomicU64,

    // Synchronizer
    syncs_ok: AtomicU64,
    syncs_failed: AtomicU64,
}

/// Point-in-time copy of [`AtomicTimingStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TimingStatsSnapshot {
    pub delay_cache_hits: u64,
    pub delay_cache_misses: u64,
    pub timing_cache_hits: u64,
    pub timing_cache_misses: u64,
    pub offset_cache_hits: u64,
    pub offset_cache_misses: u64,
    pub delays_computed: u64,
    pub validations_accepted: u64,
    pub validations_rejected: u64,
    pub batch_items_ok: u64,
    pub batch_items_failed: u64,
    pub syncs_ok: u64,
    pub syncs_failed: u64,
}

impl AtomicTimingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TimingStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        TimingStatsSnapshot {
            delay_cache_hits: load(&self.delay_cache_hits),
            delay_cache_misses: load(&self.delay_cache_misses),
            timing_cache_hits: load(&self.timing_cache_hits),
            timing_cache_misses: load(&self.timing_cache_misses),
            offset_cache_hits: load(&self.offset_cache_hits),
            offset_cache_misses: load(&self.offset_cache_misses),
            delays_computed: load(&self.delays_computed),
            validations_accepted: load(&self.validations_accepted),
            validations_rejected: load(&self.validations_rejected),
            batch_items_ok: load(&self.batch_items_ok),
            batch_items_failed: load(&self.batch_items_failed),
            syncs_ok: load(&self.syncs_ok),
            syncs_failed: load(&self.syncs_failed),
        }
    }

    fn hit_counter(&self, kind: CacheKind) -> &AtomicU64 {
        match kind {
            CacheKind::Delay => &self.delay_cache_hits,
            CacheKind::Timing => &self.timing_cache_hits,
            CacheKind::Offset => &self.offset_cache_hits,
        }
    }

    fn miss_counter(&self, kind: CacheKind) -> &AtomicU64 {
        match kind {
            CacheKind::Delay => &self.delay_cache_misses,
            CacheKind::Timing => &self.timing_cache_misses,
            CacheKind::Offset => &self.offset_cache_misses,
        }
    }
}

impl TimingStatsSnapshot {
    /// Hit ratio for one cache, 0.0 before any lookup.
    pub fn hit_ratio(&self, kind: CacheKind) -> f64 {
        let (hits, misses) = match kind {
            CacheKind::Delay => (self.delay_cache_hits, self.delay_cache_misses),
            CacheKind::Timing => (self.timing_cache_hits, self.timing_cache_misses),
            CacheKind::Offset => (self.offset_cache_hits, self.offset_cache_misses),
        };
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl TimingStats for AtomicTimingStats {
    fn cache_hit(&self, kind: CacheKind) {
        self.hit_counter(kind).fetch_add(1, Ordering::Relaxed);
    }

    fn cache_miss(&self, kind: CacheKind) {
        self.miss_counter(kind).fetch_add(1, Ordering::Relaxed);
    }

    fn delay_computed(&self) {
        self.delays_computed.fetch_add(1, Ordering::Relaxed);
    }

    fn validation(&self, accepted: bool) {
        if accepted {
            self.validations_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.validations_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn batch_item(&self, ok: bool) {
        if ok {
            self.batch_items_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.batch_items_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn sync_result(&self, ok: bool) {
        if ok {
            self.syncs_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.syncs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
