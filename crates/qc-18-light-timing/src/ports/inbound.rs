//! Driving ports (Inbound API)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::{
    BatchOutcome, ConsensusTiming, DelayResult, FaultTolerance, GeoPosition, NodeOffset, NodeRef,
    PairKey, TimeoutParameters, TimingResult, ValidationResult,
};

/// Primary Light Timing API
///
/// Consumed by the consensus protocol and the API layer. Maps onto the
/// HTTP surface one operation per method.
#[async_trait]
pub trait LightTimingApi: Send + Sync {
    /// Theoretical delay between two directory nodes
    async fn delay(&self, source_id: &str, target_id: &str) -> TimingResult<DelayResult>;

    /// Delay for every unordered pair among `nodes`, computed concurrently
    ///
    /// Partial success is allowed; see [`BatchOutcome::error`].
    async fn batch_delays(&self, nodes: Vec<NodeRef>) -> BatchOutcome<PairKey, Duration>;

    /// Whether `claimed_time` is plausible for a sender at `claimed_position`
    ///
    /// Never fails: every failure is an invalid verdict with a reason.
    async fn validate_timestamp(
        &self,
        claimed_time: DateTime<Utc>,
        claimed_position: GeoPosition,
        reference_id: &str,
    ) -> ValidationResult;

    async fn consensus_timing(&self, validator_ids: &[String]) -> TimingResult<ConsensusTiming>;

    async fn timeout_parameters(&self, validator_ids: &[String])
        -> TimingResult<TimeoutParameters>;

    async fn fault_tolerance(&self, validator_ids: &[String]) -> TimingResult<FaultTolerance>;

    async fn voting_window(&self, validator_ids: &[String]) -> TimingResult<Duration>;

    /// Block interval for the given validators scaled by network load in `[0, 1]`
    async fn optimal_block_interval(
        &self,
        validator_ids: &[String],
        network_load: f64,
    ) -> TimingResult<Duration>;

    /// Fresh stored offset, or a recomputation against all active nodes
    async fn node_offset(&self, node_id: &str) -> TimingResult<NodeOffset>;

    async fn global_offset(&self) -> Duration;

    /// Drop every memoized delay, timing and offset
    async fn clear_caches(&self);
}
