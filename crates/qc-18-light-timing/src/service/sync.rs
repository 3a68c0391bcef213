//! # Synchronizer
//!
//! Background loop that recomputes every known node's offset on a fixed
//! interval and tracks per-node sync status.
//!
//! ## State Machine
//!
//! ```text
//! pending ──ok──► synced ◄──ok──┐
//!    │              │           │
//!    └──err──► failed ──────────┘
//! ```
//!
//! `synced` and `failed` are re-entered on every cycle. Each tick also runs
//! maintenance: stale offsets, expired delay/timing cache entries and
//! status records untouched for `status_retention` are removed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::offset::OffsetEstimator;
use super::propagation::PropagationEngine;
use super::timing::TimingCalculator;
use crate::domain::{SyncConfig, SyncStatus};
use crate::ports::{NodeDirectory, TimeSource, TimingStats};

/// Shortest period the background loop will tick at.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(1);

/// Summary of one sync cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub synced: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
}

/// Entries removed by one maintenance pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub statuses_removed: usize,
    pub offsets_removed: usize,
    pub delays_purged: usize,
    pub timings_purged: usize,
}

pub struct Synchronizer<D> {
    directory: Arc<D>,
    estimator: OffsetEstimator<D>,
    engine: PropagationEngine<D>,
    timing: Arc<TimingCalculator<D>>,
    statuses: DashMap<String, SyncStatus>,
    config: SyncConfig,
    time_source: Arc<dyn TimeSource>,
    stats: Arc<dyn TimingStats>,
}

/// Collaborators for [`Synchronizer`]
pub struct SyncDependencies<D> {
    pub directory: Arc<D>,
    pub estimator: OffsetEstimator<D>,
    pub engine: PropagationEngine<D>,
    pub timing: Arc<TimingCalculator<D>>,
    pub config: SyncConfig,
    pub time_source: Arc<dyn TimeSource>,
    pub stats: Arc<dyn TimingStats>,
}

impl<D: NodeDirectory + 'static> Synchronizer<D> {
    pub fn new(deps: SyncDependencies<D>) -> Self {
        Self {
            directory: deps.directory,
            estimator: deps.estimator,
            engine: deps.engine,
            timing: deps.timing,
            statuses: DashMap::new(),
            config: deps.config,
            time_source: deps.time_source,
            stats: deps.stats,
        }
    }

    pub async fn sync_all_nodes(&self) -> SyncReport {
        self.sync_all_nodes_with_cancel(&CancellationToken::new())
            .await
    }

    /// Recompute the offset of every known node against the active set.
    #[instrument(skip_all)]
    pub async fn sync_all_nodes_with_cancel(&self, cancel: &CancellationToken) -> SyncReport {
        let started_at = self.time_source.now();
        let node_ids: Vec<String> = self
            .directory
            .get_all_nodes()
            .await
            .into_iter()
            .map(|n| n.id)
            .collect();
        let references: Vec<String> = self
            .directory
            .get_active_nodes()
            .await
            .into_iter()
            .map(|n| n.id)
            .collect();

        for id in &node_ids {
            self.statuses
                .entry(id.clone())
                .or_insert_with(|| SyncStatus::pending(id.clone(), started_at));
        }

        let outcome = self
            .estimator
            .batch_offsets_with_cancel(&node_ids, &references, cancel)
            .await;

        let now = self.time_source.now();
        let synced = outcome.results.len();
        let failed = outcome.failures.len();
        for (id, offset) in outcome.results {
            self.stats.sync_result(true);
            if let Some(mut status) = self.statuses.get_mut(&id) {
                status.record_success(offset.offset, now, self.config.history_len);
            }
        }
        for (id, error) in outcome.failures {
            self.stats.sync_result(false);
            if let Some(mut status) = self.statuses.get_mut(&id) {
                status.record_failure(error.to_string(), now);
            }
        }

        let report = SyncReport {
            total: outcome.total,
            synced,
            failed,
            cancelled: outcome.cancelled,
            started_at,
        };
        if report.failed > 0 {
            warn!(
                synced = report.synced,
                failed = report.failed,
                "Sync cycle finished with failures"
            );
        } else {
            info!(synced = report.synced, "Sync cycle finished");
        }
        report
    }

    /// Remove status records untouched for longer than the retention window.
    pub fn cleanup_statuses(&self) -> usize {
        let now = self.time_source.now();
        let retention = self.config.status_retention;
        let before = self.statuses.len();
        self.statuses.retain(|_, status| {
            now.signed_duration_since(status.updated_at)
                .to_std()
                .map(|age| age <= retention)
                .unwrap_or(true)
        });
        before.saturating_sub(self.statuses.len())
    }

    /// Sweep every expiring store once.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let report = MaintenanceReport {
            statuses_removed: self.cleanup_statuses(),
            offsets_removed: self.estimator.cleanup_stale(),
            delays_purged: self.engine.purge_expired(),
            timings_purged: self.timing.purge_expired(),
        };
        if report != MaintenanceReport::default() {
            debug!(?report, "Maintenance pass removed entries");
        }
        report
    }

    pub fn sync_status(&self, node_id: &str) -> Option<SyncStatus> {
        self.statuses.get(node_id).map(|s| s.value().clone())
    }

    /// Every status record, sorted by node id.
    pub fn sync_statuses(&self) -> Vec<SyncStatus> {
        let mut statuses: Vec<SyncStatus> =
            self.statuses.iter().map(|s| s.value().clone()).collect();
        statuses.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        statuses
    }

    /// Spawn the periodic sync loop. The first cycle runs immediately.
    ///
    /// Cancelling `shutdown` stops the loop and aborts an in-flight cycle.
    /// Intervals below [`MIN_SYNC_INTERVAL`] are raised to it.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.interval.max(MIN_SYNC_INTERVAL);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_ms = period.as_millis() as u64, "Synchronizer started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sync_all_nodes_with_cancel(&shutdown).await;
                        self.run_maintenance();
                    }
                }
            }
            info!("Synchronizer stopped");
        })
    }
}
