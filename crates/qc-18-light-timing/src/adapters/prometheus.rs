//! # Prometheus Stats Sink
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-18-light-timing = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `light_timing_cache_lookups_total{cache, result}` - cache hits and misses
//! - `light_timing_delays_computed_total` - delays computed (cache misses that succeeded)
//! - `light_timing_validations_total{verdict}` - timestamp validation verdicts
//! - `light_timing_batch_items_total{result}` - fan-out batch items
//! - `light_timing_syncs_total{result}` - synchronizer offset recomputations
//!
//! Counters are registered into a caller-owned [`Registry`], so several
//! engines can run in one process with separate registries.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

use crate::domain::{CacheKind, TimingError, TimingResult};
use crate::ports::TimingStats;

pub struct PrometheusTimingStats {
    cache_lookups: IntCounterVec,
    delays_computed: IntCounter,
    validations: IntCounterVec,
    batch_items: IntCounterVec,
    syncs: IntCounterVec,
}

fn metrics_error(e: prometheus::Error) -> TimingError {
    TimingError::Config(format!("metrics registration failed: {e}"))
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "failed"
    }
}

impl PrometheusTimingStats {
    pub fn register(registry: &Registry) -> TimingResult<Self> {
        let cache_lookups = IntCounterVec::new(
            Opts::new("light_timing_cache_lookups_total", "Cache lookups by cache and result"),
            &["cache", "result"],
        )
        .map_err(metrics_error)?;
        let delays_computed = IntCounter::new(
            "light_timing_delays_computed_total",
            "Pairwise delays computed",
        )
        .map_err(metrics_error)?;
        let validations = IntCounterVec::new(
            Opts::new("light_timing_validations_total", "Timestamp validations by verdict"),
            &["verdict"],
        )
        .map_err(metrics_error)?;
        let batch_items = IntCounterVec::new(
            Opts::new("light_timing_batch_items_total", "Fan-out batch items by result"),
            &["result"],
        )
        .map_err(metrics_error)?;
        let syncs = IntCounterVec::new(
            Opts::new("light_timing_syncs_total", "Synchronizer offset recomputations by result"),
            &["result"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(cache_lookups.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(delays_computed.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(validations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(batch_items.clone()))
            .map_err(metrics_error)?;
        registry.register(Box::new(syncs.clone())).map_err(metrics_error)?;

        Ok(Self {
            cache_lookups,
            delays_computed,
            validations,
            batch_items,
            syncs,
        })
    }
}

impl TimingStats for PrometheusTimingStats {
    fn cache_hit(&self, kind: CacheKind) {
        self.cache_lookups
            .with_label_values(&[kind.label(), "hit"])
            .inc();
    }

    fn cache_miss(&self, kind: CacheKind) {
        self.cache_lookups
            .with_label_values(&[kind.label(), "miss"])
            .inc();
    }

    fn delay_computed(&self) {
        self.delays_computed.inc();
    }

    fn validation(&self, accepted: bool) {
        let verdict = if accepted { "accepted" } else { "rejected" };
        self.validations.with_label_values(&[verdict]).inc();
    }

    fn batch_item(&self, ok: bool) {
        self.batch_items.with_label_values(&[outcome(ok)]).inc();
    }

    fn sync_result(&self, ok: bool) {
        self.syncs.with_label_values(&[outcome(ok)]).inc();
    }
}
