//! # Consensus Timing Derivation
//!
//! Pure functions turning a worst-case pairwise propagation delay into the
//! timing parameters a consensus protocol consumes.
//!
//! ```text
//! max      = max(max pairwise delay, min_propagation_delay)
//! margin   = max × safety_factor
//! block    = clamp(max + margin, min_block_time, max_block_time)
//! offset   = max / 2
//! voting   = clamp(max + margin/2, min_voting_window, max_voting_window)
//! proposal = clamp(2·max)        vote = clamp(max + margin)
//! commit   = clamp(3·max)        view_change = clamp(5·max)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::ConsensusTimingConfig;
use super::delay::{clamp_duration, scale_duration};

/// Network load above which block intervals shrink the most
pub const HIGH_LOAD_THRESHOLD: f64 = 0.8;

/// Network load above which block intervals shrink moderately
pub const MODERATE_LOAD_THRESHOLD: f64 = 0.5;

const HIGH_LOAD_SCALE: f64 = 0.7;
const MODERATE_LOAD_SCALE: f64 = 0.85;

/// Timing parameters derived for one validator set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusTiming {
    /// Worst pairwise delay, floored at the minimum realistic latency
    pub max_propagation_delay: Duration,
    pub safety_margin: Duration,
    pub block_time: Duration,
    pub optimal_clock_offset: Duration,
    /// Resolved validators the timing was computed over
    pub validator_count: usize,
    pub computed_at: DateTime<Utc>,
    /// Fingerprint of the requested validator set (cache key)
    pub fingerprint: String,
}

/// Per-phase consensus timeouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutParameters {
    pub proposal: Duration,
    pub vote: Duration,
    pub commit: Duration,
    pub view_change: Duration,
}

/// Derive consensus timing from the raw worst-case pairwise delay.
pub fn derive_consensus_timing(
    raw_max_delay: Duration,
    validator_count: usize,
    fingerprint: String,
    computed_at: DateTime<Utc>,
    config: &ConsensusTimingConfig,
) -> ConsensusTiming {
    let max_delay = raw_max_delay.max(config.min_propagation_delay);
    let safety_margin = scale_duration(max_delay, config.safety_factor);
    let block_time = clamp_duration(
        max_delay.saturating_add(safety_margin),
        config.min_block_time,
        config.max_block_time,
    );

    ConsensusTiming {
        max_propagation_delay: max_delay,
        safety_margin,
        block_time,
        optimal_clock_offset: max_delay / 2,
        validator_count,
        computed_at,
        fingerprint,
    }
}

/// Scale the base block time down under congestion, never below the floor.
pub fn scale_block_interval(block_time: Duration, network_load: f64, floor: Duration) -> Duration {
    let factor = if network_load > HIGH_LOAD_THRESHOLD {
        HIGH_LOAD_SCALE
    } else if network_load > MODERATE_LOAD_THRESHOLD {
        MODERATE_LOAD_SCALE
    } else {
        1.0
    };
    scale_duration(block_time, factor).max(floor)
}

pub fn voting_window(timing: &ConsensusTiming, config: &ConsensusTimingConfig) -> Duration {
    clamp_duration(
        timing
            .max_propagation_delay
            .saturating_add(timing.safety_margin / 2),
        config.min_voting_window,
        config.max_voting_window,
    )
}

pub fn timeout_parameters(
    timing: &ConsensusTiming,
    config: &ConsensusTimingConfig,
) -> TimeoutParameters {
    let max = timing.max_propagation_delay;
    let bound = |d: Duration| clamp_duration(d, config.min_phase_timeout, config.max_phase_timeout);

    TimeoutParameters {
        proposal: bound(max.saturating_mul(2)),
        vote: bound(max.saturating_add(timing.safety_margin)),
        commit: bound(max.saturating_mul(3)),
        view_change: bound(max.saturating_mul(5)),
    }
}
