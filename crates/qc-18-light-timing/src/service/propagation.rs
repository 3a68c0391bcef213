//! # Propagation Engine
//!
//! Pairwise delay lookups (memoized per unordered node pair), concurrent
//! batch computation over every pair of a node set, and timestamp
//! plausibility checks.
//!
//! ## Validation
//!
//! ```text
//! expected  = network_delay(distance(reference, claimed_position))
//! actual    = |now - claimed_time|
//! threshold = expected + tolerance
//! floor     = min(min_confidence, confidence(expected, threshold))
//! valid     = actual <= threshold && confidence(actual, threshold) >= floor
//! ```
//!
//! The floor is capped at the confidence of a message that arrived exactly
//! at its physical delay, so it only rejects differences that eat into the
//! tolerance slack.
//!
//! Validation never fails outward. Every problem becomes an invalid
//! [`ValidationResult`] carrying a reason.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::batch::fan_out;
use crate::domain::{
    confidence_score, network_delay, BatchOutcome, CacheKind, DelayResult, GeoPosition, NodeRef,
    PairKey, PropagationConfig, TimingError, TimingResult, TtlCache, ValidationResult,
    ValidationSubject,
};
use crate::ports::{NodeDirectory, TimeSource, TimingStats};

#[derive(Clone, Debug)]
struct CachedDelay {
    delay: Duration,
    distance_m: f64,
    computed_at: DateTime<Utc>,
}

/// Delay computation and timestamp validation over a node directory.
///
/// Cloning is cheap and clones share the delay cache.
pub struct PropagationEngine<D> {
    directory: Arc<D>,
    config: Arc<PropagationConfig>,
    cache: Arc<TtlCache<PairKey, CachedDelay>>,
    time_source: Arc<dyn TimeSource>,
    stats: Arc<dyn TimingStats>,
}

impl<D> Clone for PropagationEngine<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            config: Arc::clone(&self.config),
            cache: Arc::clone(&self.cache),
            time_source: Arc::clone(&self.time_source),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<D: NodeDirectory + 'static> PropagationEngine<D> {
    pub fn new(
        directory: Arc<D>,
        config: PropagationConfig,
        time_source: Arc<dyn TimeSource>,
        stats: Arc<dyn TimingStats>,
    ) -> Self {
        let cache = Arc::new(TtlCache::new(config.delay_cache_ttl));
        Self {
            directory,
            config: Arc::new(config),
            cache,
            time_source,
            stats,
        }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Delay between two resolved nodes.
    ///
    /// Served from the cache while fresh; both directions of a pair share
    /// one entry.
    pub fn delay(&self, source: &NodeRef, target: &NodeRef) -> TimingResult<DelayResult> {
        let key = PairKey::new(&source.id, &target.id);
        let now = self.time_source.now();

        if let Some(hit) = self.cache.get(&key, now) {
            self.stats.cache_hit(CacheKind::Delay);
            return Ok(DelayResult {
                source_id: source.id.clone(),
                target_id: target.id.clone(),
                delay: hit.delay,
                distance_m: hit.distance_m,
                computed_at: hit.computed_at,
                cached: true,
            });
        }
        self.stats.cache_miss(CacheKind::Delay);

        let distance_m = source.position.distance_to(&target.position);
        if !distance_m.is_finite() {
            return Err(TimingError::ComputationFailed(format!(
                "non-finite distance between {} and {}",
                source.id, target.id
            )));
        }
        let delay = network_delay(distance_m, self.config.network_factor);
        let computed_at = now;

        self.cache.insert(
            key.clone(),
            CachedDelay {
                delay,
                distance_m,
                computed_at,
            },
            now,
        );
        self.stats.delay_computed();
        debug!(
            pair = %key,
            distance_km = distance_m / 1000.0,
            delay_us = delay.as_micros() as u64,
            "Computed propagation delay"
        );

        Ok(DelayResult {
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            delay,
            distance_m,
            computed_at,
            cached: false,
        })
    }

    /// Resolve both ids through the directory, then compute the delay.
    #[instrument(skip(self))]
    pub async fn delay_by_id(&self, source_id: &str, target_id: &str) -> TimingResult<DelayResult> {
        let source = self.directory.get_node(source_id).await?;
        let target = self.directory.get_node(target_id).await?;
        self.delay(&source, &target)
    }

    /// [`delay_by_id`](Self::delay_by_id) bounded by a caller deadline.
    pub async fn delay_by_id_within(
        &self,
        deadline: Duration,
        source_id: &str,
        target_id: &str,
    ) -> TimingResult<DelayResult> {
        tokio::time::timeout(deadline, self.delay_by_id(source_id, target_id))
            .await
            .map_err(|_| TimingError::DeadlineExceeded(deadline))?
    }

    /// Delay for every unordered pair among `nodes`.
    ///
    /// Fewer than two distinct nodes yields an empty, successful outcome.
    pub async fn batch_delays(&self, nodes: &[NodeRef]) -> BatchOutcome<PairKey, Duration> {
        self.batch_delays_with_cancel(nodes, &CancellationToken::new())
            .await
    }

    #[instrument(skip(self, nodes, cancel), fields(nodes = nodes.len()))]
    pub async fn batch_delays_with_cancel(
        &self,
        nodes: &[NodeRef],
        cancel: &CancellationToken,
    ) -> BatchOutcome<PairKey, Duration> {
        let mut distinct: Vec<&NodeRef> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !distinct.iter().any(|n| n.id == node.id) {
                distinct.push(node);
            }
        }

        let mut jobs = Vec::new();
        for (i, a) in distinct.iter().enumerate() {
            for b in &distinct[i + 1..] {
                let engine = self.clone();
                let (a, b) = ((*a).clone(), (*b).clone());
                let key = PairKey::new(&a.id, &b.id);
                jobs.push((key, async move { engine.delay(&a, &b).map(|r| r.delay) }));
            }
        }

        fan_out(jobs, cancel, &self.stats).await
    }

    /// Pairwise delays across every active directory node.
    pub async fn network_delay_matrix(&self) -> BatchOutcome<PairKey, Duration> {
        let nodes = self.directory.get_active_nodes().await;
        self.batch_delays(&nodes).await
    }

    /// Worst pair across the active network, if there are at least two nodes.
    pub async fn max_network_delay(&self) -> Option<(PairKey, Duration)> {
        self.network_delay_matrix()
            .await
            .results
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
    }

    /// Validate with the general tolerance.
    #[instrument(skip(self))]
    pub async fn validate_timestamp(
        &self,
        claimed_time: DateTime<Utc>,
        claimed_position: GeoPosition,
        reference_id: &str,
    ) -> ValidationResult {
        self.validate_with_tolerance(
            claimed_time,
            &claimed_position,
            reference_id,
            self.config.validation_tolerance,
        )
        .await
    }

    /// Validate with the tolerance of the subject's kind, tagging the verdict.
    #[instrument(skip(self), fields(kind = subject.label()))]
    pub async fn validate_subject(
        &self,
        subject: ValidationSubject,
        claimed_time: DateTime<Utc>,
        claimed_position: GeoPosition,
        reference_id: &str,
    ) -> ValidationResult {
        let tolerance = match &subject {
            ValidationSubject::Block { .. } => self.config.block_tolerance,
            ValidationSubject::Transaction { .. } => self.config.transaction_tolerance,
            ValidationSubject::Heartbeat { .. } => self.config.heartbeat_tolerance,
        };
        self.validate_with_tolerance(claimed_time, &claimed_position, reference_id, tolerance)
            .await
            .with_subject(subject)
    }

    /// [`validate_timestamp`](Self::validate_timestamp) bounded by a caller
    /// deadline. A missed deadline is an invalid verdict, not an error.
    pub async fn validate_timestamp_within(
        &self,
        deadline: Duration,
        claimed_time: DateTime<Utc>,
        claimed_position: GeoPosition,
        reference_id: &str,
    ) -> ValidationResult {
        match tokio::time::timeout(
            deadline,
            self.validate_timestamp(claimed_time, claimed_position, reference_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.stats.validation(false);
                ValidationResult::rejected("deadline exceeded", self.time_source.now())
            }
        }
    }

    async fn validate_with_tolerance(
        &self,
        claimed_time: DateTime<Utc>,
        claimed_position: &GeoPosition,
        reference_id: &str,
        tolerance: Duration,
    ) -> ValidationResult {
        let now = self.time_source.now();

        let reference = match self.directory.get_node(reference_id).await {
            Ok(node) => node,
            Err(TimingError::NodeNotFound(_)) => {
                return self.reject(format!("reference node {reference_id} not found"), now);
            }
            Err(e) => return self.reject(format!("reference lookup failed: {e}"), now),
        };

        let distance_m = reference.position.distance_to(claimed_position);
        if !distance_m.is_finite() {
            return self.reject("distance computation failed", now);
        }
        let expected_delay = network_delay(distance_m, self.config.network_factor);

        let elapsed = now.signed_duration_since(claimed_time);
        let elapsed = if elapsed < chrono::Duration::zero() {
            -elapsed
        } else {
            elapsed
        };
        let actual_diff = elapsed.to_std().unwrap_or(Duration::MAX);

        let threshold = expected_delay.saturating_add(tolerance);
        let confidence = confidence_score(actual_diff, threshold);
        let floor = self
            .config
            .min_confidence
            .min(confidence_score(expected_delay, threshold));

        let (valid, reason) = if actual_diff > threshold {
            (
                false,
                format!("time difference {actual_diff:?} exceeds bound {threshold:?}"),
            )
        } else if confidence < floor {
            (
                false,
                format!("confidence {confidence:.3} below minimum {floor:.3}"),
            )
        } else {
            (true, "within propagation bound".to_string())
        };

        self.stats.validation(valid);
        debug!(
            reference = %reference_id,
            valid,
            confidence,
            expected_us = expected_delay.as_micros() as u64,
            actual_us = actual_diff.as_micros() as u64,
            "Timestamp validated"
        );

        ValidationResult {
            valid,
            confidence,
            reason,
            expected_delay,
            actual_diff,
            threshold,
            validated_at: now,
            subject: None,
        }
    }

    fn reject(&self, reason: impl Into<String>, now: DateTime<Utc>) -> ValidationResult {
        let result = ValidationResult::rejected(reason, now);
        self.stats.validation(false);
        debug!(reason = %result.reason, "Timestamp rejected");
        result
    }

    /// Drop every cached delay. Returns how many entries were removed.
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired(self.time_source.now())
    }

    pub fn cached_pairs(&self) -> usize {
        self.cache.len()
    }
}
