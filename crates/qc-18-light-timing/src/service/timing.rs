//! # Timing Calculator
//!
//! Consensus timing for a validator set: the worst pairwise delay across
//! the resolved validators and every parameter derived from it.
//!
//! Results are cached per validator-set fingerprint, so the same set in a
//! different order (or with duplicates) reuses one entry.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::propagation::PropagationEngine;
use crate::domain::timing::{
    derive_consensus_timing, scale_block_interval, timeout_parameters, voting_window,
};
use crate::domain::{
    unique_ids, validator_set_fingerprint, CacheKind, ConsensusTiming, ConsensusTimingConfig,
    FaultTolerance, NodeRef, TimeoutParameters, TimingError, TimingResult, TtlCache,
};
use crate::ports::{NodeDirectory, TimeSource, TimingStats};

/// Validators that must resolve before timing can be derived
pub const MIN_RESOLVED_VALIDATORS: usize = 2;

pub struct TimingCalculator<D> {
    engine: PropagationEngine<D>,
    directory: Arc<D>,
    config: ConsensusTimingConfig,
    cache: TtlCache<String, ConsensusTiming>,
    time_source: Arc<dyn TimeSource>,
    stats: Arc<dyn TimingStats>,
}

impl<D: NodeDirectory + 'static> TimingCalculator<D> {
    pub fn new(
        engine: PropagationEngine<D>,
        directory: Arc<D>,
        config: ConsensusTimingConfig,
        time_source: Arc<dyn TimeSource>,
        stats: Arc<dyn TimingStats>,
    ) -> Self {
        let cache = TtlCache::new(config.timing_cache_ttl);
        Self {
            engine,
            directory,
            config,
            cache,
            time_source,
            stats,
        }
    }

    pub fn config(&self) -> &ConsensusTimingConfig {
        &self.config
    }

    /// Consensus timing for a validator set.
    ///
    /// Ids that do not resolve are skipped with a warning. At least
    /// [`MIN_RESOLVED_VALIDATORS`] must remain.
    #[instrument(skip(self, validator_ids), fields(validators = validator_ids.len()))]
    pub async fn consensus_timing(
        &self,
        validator_ids: &[String],
    ) -> TimingResult<ConsensusTiming> {
        let ids = unique_ids(validator_ids);
        let fingerprint = validator_set_fingerprint(&ids);

        if let Some(cached) = self.cache.get(&fingerprint, self.time_source.now()) {
            self.stats.cache_hit(CacheKind::Timing);
            debug!(fingerprint = %fingerprint, "Consensus timing served from cache");
            return Ok(cached);
        }
        self.stats.cache_miss(CacheKind::Timing);

        let validators = self.resolve(&ids).await;
        if validators.len() < MIN_RESOLVED_VALIDATORS {
            return Err(TimingError::InsufficientValidators {
                required: MIN_RESOLVED_VALIDATORS,
                resolved: validators.len(),
            });
        }

        let mut max_delay = Duration::ZERO;
        for (i, a) in validators.iter().enumerate() {
            for b in &validators[i + 1..] {
                max_delay = max_delay.max(self.engine.delay(a, b)?.delay);
            }
        }

        let now = self.time_source.now();
        let timing = derive_consensus_timing(
            max_delay,
            validators.len(),
            fingerprint.clone(),
            now,
            &self.config,
        );
        self.cache.insert(fingerprint, timing.clone(), now);

        info!(
            validators = timing.validator_count,
            max_delay_ms = timing.max_propagation_delay.as_millis() as u64,
            block_time_ms = timing.block_time.as_millis() as u64,
            "Consensus timing computed"
        );
        Ok(timing)
    }

    async fn resolve(&self, ids: &[String]) -> Vec<NodeRef> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            match self.directory.get_node(id).await {
                Ok(node) => resolved.push(node),
                Err(e) => warn!(validator = %id, error = %e, "Skipping unresolvable validator"),
            }
        }
        resolved
    }

    /// Base block time scaled down under network load in `[0, 1]`.
    pub async fn optimal_block_interval(
        &self,
        validator_ids: &[String],
        network_load: f64,
    ) -> TimingResult<Duration> {
        let timing = self.consensus_timing(validator_ids).await?;
        let load = if network_load.is_finite() {
            network_load.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(scale_block_interval(
            timing.block_time,
            load,
            self.config.min_block_interval,
        ))
    }

    pub async fn voting_window(&self, validator_ids: &[String]) -> TimingResult<Duration> {
        let timing = self.consensus_timing(validator_ids).await?;
        Ok(voting_window(&timing, &self.config))
    }

    pub async fn timeout_parameters(
        &self,
        validator_ids: &[String],
    ) -> TimingResult<TimeoutParameters> {
        let timing = self.consensus_timing(validator_ids).await?;
        Ok(timeout_parameters(&timing, &self.config))
    }

    /// Thresholds over the distinct ids given; no directory lookup.
    pub fn fault_tolerance(&self, validator_ids: &[String]) -> TimingResult<FaultTolerance> {
        let ids = unique_ids(validator_ids);
        if ids.is_empty() {
            return Err(TimingError::EmptyValidatorSet);
        }
        Ok(FaultTolerance::for_nodes(ids.len()))
    }

    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired(self.time_source.now())
    }
}
