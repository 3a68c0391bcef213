//! Light Timing Service - wiring and the public facade
//!
//! # Architecture
//! - [`PropagationEngine`]: pairwise delays, batch delays, timestamp validation
//! - [`TimingCalculator`]: consensus timing and fault tolerance per validator set
//! - [`OffsetEstimator`]: per-node and global clock offsets
//! - [`Synchronizer`]: periodic offset refresh and maintenance
//!
//! All four share one node directory, one clock and one stats sink.
//! [`LightTimingService`] builds them and implements [`LightTimingApi`].

mod batch;
pub mod offset;
pub mod propagation;
pub mod sync;
pub mod timing;

#[cfg(test)]
mod tests;

pub use offset::OffsetEstimator;
pub use propagation::PropagationEngine;
pub use sync::{MaintenanceReport, SyncDependencies, SyncReport, Synchronizer};
pub use timing::TimingCalculator;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapters::AtomicTimingStats;
use crate::domain::{
    BatchOutcome, ConsensusTiming, DelayResult, FaultTolerance, GeoPosition, LightTimingConfig,
    NodeOffset, NodeRef, PairKey, SyncStatus, TimeoutParameters, TimingResult, ValidationResult,
};
use crate::ports::{LightTimingApi, NodeDirectory, SystemTimeSource, TimeSource, TimingStats};

/// Dependencies for LightTimingService
pub struct LightTimingDependencies<D> {
    pub directory: Arc<D>,
    pub config: LightTimingConfig,
    pub time_source: Arc<dyn TimeSource>,
    pub stats: Arc<dyn TimingStats>,
}

/// Light Timing Service
pub struct LightTimingService<D> {
    engine: PropagationEngine<D>,
    timing: Arc<TimingCalculator<D>>,
    offsets: OffsetEstimator<D>,
    synchronizer: Arc<Synchronizer<D>>,
}

impl<D: NodeDirectory + 'static> LightTimingService<D> {
    /// Wire every component. Fails if the configuration does not validate.
    pub fn new(deps: LightTimingDependencies<D>) -> TimingResult<Self> {
        let LightTimingDependencies {
            directory,
            config,
            time_source,
            stats,
        } = deps;
        config.validate()?;

        let engine = PropagationEngine::new(
            Arc::clone(&directory),
            config.propagation,
            Arc::clone(&time_source),
            Arc::clone(&stats),
        );
        let timing = Arc::new(TimingCalculator::new(
            engine.clone(),
            Arc::clone(&directory),
            config.consensus,
            Arc::clone(&time_source),
            Arc::clone(&stats),
        ));
        let offsets = OffsetEstimator::new(
            engine.clone(),
            Arc::clone(&directory),
            config.offsets,
            Arc::clone(&time_source),
            Arc::clone(&stats),
        );
        let synchronizer = Arc::new(Synchronizer::new(SyncDependencies {
            directory,
            estimator: offsets.clone(),
            engine: engine.clone(),
            timing: Arc::clone(&timing),
            config: config.sync,
            time_source,
            stats,
        }));

        Ok(Self {
            engine,
            timing,
            offsets,
            synchronizer,
        })
    }

    /// System clock and in-process atomic counters.
    pub fn with_defaults(
        directory: Arc<D>,
        config: LightTimingConfig,
    ) -> TimingResult<(Self, Arc<AtomicTimingStats>)> {
        let stats = Arc::new(AtomicTimingStats::new());
        let service = Self::new(LightTimingDependencies {
            directory,
            config,
            time_source: Arc::new(SystemTimeSource),
            stats: stats.clone(),
        })?;
        Ok((service, stats))
    }

    pub fn engine(&self) -> &PropagationEngine<D> {
        &self.engine
    }

    pub fn timing(&self) -> &TimingCalculator<D> {
        &self.timing
    }

    pub fn offsets(&self) -> &OffsetEstimator<D> {
        &self.offsets
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer<D>> {
        &self.synchronizer
    }

    /// Start the background synchronizer.
    pub fn start_sync(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.synchronizer).start(shutdown)
    }

    pub fn adjust_timestamp(
        &self,
        timestamp: DateTime<Utc>,
        node_id: &str,
    ) -> TimingResult<DateTime<Utc>> {
        self.offsets.adjust_timestamp(timestamp, node_id)
    }

    pub fn sync_status(&self, node_id: &str) -> Option<SyncStatus> {
        self.synchronizer.sync_status(node_id)
    }
}

#[async_trait]
impl<D: NodeDirectory + 'static> LightTimingApi for LightTimingService<D> {
    async fn delay(&self, source_id: &str, target_id: &str) -> TimingResult<DelayResult> {
        self.engine.delay_by_id(source_id, target_id).await
    }

    async fn batch_delays(&self, nodes: Vec<NodeRef>) -> BatchOutcome<PairKey, Duration> {
        self.engine.batch_delays(&nodes).await
    }

    async fn validate_timestamp(
        &self,
        claimed_time: DateTime<Utc>,
        claimed_position: GeoPosition,
        reference_id: &str,
    ) -> ValidationResult {
        self.engine
            .validate_timestamp(claimed_time, claimed_position, reference_id)
            .await
    }

    async fn consensus_timing(&self, validator_ids: &[String]) -> TimingResult<ConsensusTiming> {
        self.timing.consensus_timing(validator_ids).await
    }

    async fn timeout_parameters(
        &self,
        validator_ids: &[String],
    ) -> TimingResult<TimeoutParameters> {
        self.timing.timeout_parameters(validator_ids).await
    }

    async fn fault_tolerance(&self, validator_ids: &[String]) -> TimingResult<FaultTolerance> {
        self.timing.fault_tolerance(validator_ids)
    }

    async fn voting_window(&self, validator_ids: &[String]) -> TimingResult<Duration> {
        self.timing.voting_window(validator_ids).await
    }

    async fn optimal_block_interval(
        &self,
        validator_ids: &[String],
        network_load: f64,
    ) -> TimingResult<Duration> {
        self.timing
            .optimal_block_interval(validator_ids, network_load)
            .await
    }

    async fn node_offset(&self, node_id: &str) -> TimingResult<NodeOffset> {
        self.offsets.current_offset(node_id).await
    }

    async fn global_offset(&self) -> Duration {
        self.offsets.global_offset()
    }

    async fn clear_caches(&self) {
        let delays = self.engine.clear_cache();
        let timings = self.timing.clear_cache();
        let offsets = self.offsets.clear();
        info!(delays, timings, offsets, "Caches cleared");
    }
}
