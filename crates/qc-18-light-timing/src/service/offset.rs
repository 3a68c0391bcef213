//! # Offset Estimator
//!
//! Per-node clock offsets estimated against a reference set, the
//! network-wide global offset, and timestamp adjustment.
//!
//! Stored offsets go stale after `OffsetConfig::staleness`. A stale offset
//! is reported as [`TimingError::StaleOffset`] by
//! [`get_node_offset`](OffsetEstimator::get_node_offset) and is never used
//! for adjustment or the global offset.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::batch::fan_out;
use super::propagation::PropagationEngine;
use crate::domain::{
    unique_ids, weighted_global_offset, weighted_half_delay, BatchOutcome, CacheKind,
    CacheLookup, NodeOffset, OffsetConfig, PairMeasurement, Region, TimingError, TimingResult,
    TtlCache,
};
use crate::ports::{NodeDirectory, TimeSource, TimingStats};

/// Clock offset estimation. Cloning is cheap and clones share the offset table.
pub struct OffsetEstimator<D> {
    engine: PropagationEngine<D>,
    directory: Arc<D>,
    config: Arc<OffsetConfig>,
    offsets: Arc<TtlCache<String, NodeOffset>>,
    time_source: Arc<dyn TimeSource>,
    stats: Arc<dyn TimingStats>,
}

impl<D> Clone for OffsetEstimator<D> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            directory: Arc::clone(&self.directory),
            config: Arc::clone(&self.config),
            offsets: Arc::clone(&self.offsets),
            time_source: Arc::clone(&self.time_source),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<D: NodeDirectory + 'static> OffsetEstimator<D> {
    pub fn new(
        engine: PropagationEngine<D>,
        directory: Arc<D>,
        config: OffsetConfig,
        time_source: Arc<dyn TimeSource>,
        stats: Arc<dyn TimingStats>,
    ) -> Self {
        let offsets = Arc::new(TtlCache::new(config.staleness));
        Self {
            engine,
            directory,
            config: Arc::new(config),
            offsets,
            time_source,
            stats,
        }
    }

    /// Estimate a node's offset against `reference_ids` and store it.
    ///
    /// The node itself and references that cannot be resolved or measured
    /// are skipped.
    #[instrument(skip(self, reference_ids), fields(references = reference_ids.len()))]
    pub async fn node_offset(
        &self,
        node_id: &str,
        reference_ids: &[String],
    ) -> TimingResult<NodeOffset> {
        let node = self.directory.get_node(node_id).await?;

        let mut measurements = Vec::new();
        for reference_id in unique_ids(reference_ids) {
            if reference_id == node_id {
                continue;
            }
            let reference = match self.directory.get_node(&reference_id).await {
                Ok(reference) => reference,
                Err(e) => {
                    debug!(reference = %reference_id, error = %e, "Skipping reference");
                    continue;
                }
            };
            match self.engine.delay(&node, &reference) {
                Ok(result) => measurements.push(PairMeasurement::new(
                    reference_id,
                    result.distance_m,
                    result.delay,
                )),
                Err(e) => {
                    warn!(reference = %reference_id, error = %e, "Reference measurement failed")
                }
            }
        }

        let (offset, confidence) = weighted_half_delay(&measurements)
            .ok_or_else(|| TimingError::NoValidMeasurements(node_id.to_string()))?;
        let now = self.time_source.now();

        let record = NodeOffset {
            node_id: node_id.to_string(),
            offset,
            confidence,
            measurement_count: measurements.len(),
            region: Region::from_position(&node.position),
            calculated_at: now,
        };
        self.offsets.insert(node_id.to_string(), record.clone(), now);

        debug!(
            node_id = %node_id,
            offset_us = offset.as_micros() as u64,
            confidence,
            measurements = record.measurement_count,
            "Node offset calculated"
        );
        Ok(record)
    }

    /// Stored offset, failing if absent or stale.
    pub fn get_node_offset(&self, node_id: &str) -> TimingResult<NodeOffset> {
        match self.offsets.lookup(&node_id.to_string(), self.time_source.now()) {
            CacheLookup::Fresh(offset) => {
                self.stats.cache_hit(CacheKind::Offset);
                Ok(offset)
            }
            CacheLookup::Expired { age, .. } => {
                self.stats.cache_miss(CacheKind::Offset);
                Err(TimingError::StaleOffset {
                    node_id: node_id.to_string(),
                    age,
                })
            }
            CacheLookup::Missing => {
                self.stats.cache_miss(CacheKind::Offset);
                Err(TimingError::OffsetNotFound(node_id.to_string()))
            }
        }
    }

    /// Stored offset if fresh, otherwise recomputed against every active node.
    pub async fn current_offset(&self, node_id: &str) -> TimingResult<NodeOffset> {
        match self.get_node_offset(node_id) {
            Ok(offset) => Ok(offset),
            Err(TimingError::StaleOffset { .. }) | Err(TimingError::OffsetNotFound(_)) => {
                let references: Vec<String> = self
                    .directory
                    .get_active_nodes()
                    .await
                    .into_iter()
                    .map(|n| n.id)
                    .collect();
                self.node_offset(node_id, &references).await
            }
            Err(e) => Err(e),
        }
    }

    /// Confidence-weighted mean of every fresh offset above the confidence floor.
    pub fn global_offset(&self) -> std::time::Duration {
        let offsets = self
            .offsets
            .fresh_entries(self.time_source.now())
            .into_iter()
            .map(|(_, record)| (record.offset, record.confidence));
        weighted_global_offset(offsets, self.config.global_min_confidence)
    }

    /// Shift `timestamp` by the node's stored offset.
    pub fn adjust_timestamp(
        &self,
        timestamp: DateTime<Utc>,
        node_id: &str,
    ) -> TimingResult<DateTime<Utc>> {
        let record = self.get_node_offset(node_id)?;
        let delta = chrono::Duration::from_std(record.offset)
            .map_err(|e| TimingError::ComputationFailed(format!("offset out of range: {e}")))?;
        timestamp.checked_add_signed(delta).ok_or_else(|| {
            TimingError::ComputationFailed(format!("adjusted timestamp for {node_id} overflows"))
        })
    }

    /// Offsets for every id in `node_ids`, best effort.
    pub async fn batch_offsets(
        &self,
        node_ids: &[String],
        reference_ids: &[String],
    ) -> BatchOutcome<String, NodeOffset> {
        self.batch_offsets_with_cancel(node_ids, reference_ids, &CancellationToken::new())
            .await
    }

    #[instrument(skip_all, fields(nodes = node_ids.len()))]
    pub async fn batch_offsets_with_cancel(
        &self,
        node_ids: &[String],
        reference_ids: &[String],
        cancel: &CancellationToken,
    ) -> BatchOutcome<String, NodeOffset> {
        let references: Arc<[String]> = reference_ids.into();
        let jobs = unique_ids(node_ids)
            .into_iter()
            .map(|id| {
                let estimator = self.clone();
                let references = Arc::clone(&references);
                let node_id = id.clone();
                (id, async move {
                    estimator.node_offset(&node_id, &references).await
                })
            })
            .collect();

        fan_out(jobs, cancel, &self.stats).await
    }

    /// Evict offsets past the staleness bound. Returns how many were removed.
    pub fn cleanup_stale(&self) -> usize {
        let removed = self.offsets.purge_expired(self.time_source.now());
        if removed > 0 {
            debug!(removed, "Evicted stale offsets");
        }
        removed
    }

    pub fn clear(&self) -> usize {
        self.offsets.clear()
    }

    /// Fresh offsets, sorted by node id.
    pub fn known_offsets(&self) -> Vec<NodeOffset> {
        let mut offsets: Vec<NodeOffset> = self
            .offsets
            .fresh_entries(self.time_source.now())
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        offsets.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        offsets
    }
}
