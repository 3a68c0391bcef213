//! Light timing configuration.
//!
//! Every section has working defaults; `from_env` overrides individual
//! values from `QC_LT_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use super::{TimingError, TimingResult};

/// Top-level configuration for the light timing subsystem.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LightTimingConfig {
    pub propagation: PropagationConfig,
    pub consensus: ConsensusTimingConfig,
    pub offsets: OffsetConfig,
    pub sync: SyncConfig,
}

/// Delay computation and timestamp validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Routing inefficiency multiplier over the straight light path
    pub network_factor: f64,
    /// Slack added to the expected delay for untyped validations
    pub validation_tolerance: Duration,
    /// Verdicts below this confidence are forced invalid
    pub min_confidence: f64,
    pub delay_cache_ttl: Duration,
    pub block_tolerance: Duration,
    pub transaction_tolerance: Duration,
    pub heartbeat_tolerance: Duration,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            network_factor: 1.5,
            validation_tolerance: Duration::from_millis(50),
            min_confidence: 0.5,
            delay_cache_ttl: Duration::from_secs(5 * 60),
            block_tolerance: Duration::from_millis(500),
            transaction_tolerance: Duration::from_secs(1),
            heartbeat_tolerance: Duration::from_millis(50),
        }
    }
}

/// Consensus timing derivation bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusTimingConfig {
    /// Safety margin as a multiple of the worst pairwise delay
    pub safety_factor: f64,
    /// Floor for the worst pairwise delay (minimum realistic latency)
    pub min_propagation_delay: Duration,
    pub timing_cache_ttl: Duration,
    pub min_block_time: Duration,
    pub max_block_time: Duration,
    /// Floor for load-scaled block intervals
    pub min_block_interval: Duration,
    pub min_voting_window: Duration,
    pub max_voting_window: Duration,
    pub min_phase_timeout: Duration,
    pub max_phase_timeout: Duration,
}

impl Default for ConsensusTimingConfig {
    fn default() -> Self {
        Self {
            safety_factor: 2.0,
            min_propagation_delay: Duration::from_millis(100),
            timing_cache_ttl: Duration::from_secs(2 * 60),
            min_block_time: Duration::from_secs(2),
            max_block_time: Duration::from_secs(10 * 60),
            min_block_interval: Duration::from_secs(1),
            min_voting_window: Duration::from_secs(2),
            max_voting_window: Duration::from_secs(30),
            min_phase_timeout: Duration::from_secs(2),
            max_phase_timeout: Duration::from_secs(60),
        }
    }
}

/// Clock offset estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OffsetConfig {
    /// Offsets older than this are treated as absent
    pub staleness: Duration,
    /// Offsets must exceed this confidence to count towards the global offset
    pub global_min_confidence: f64,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(30 * 60),
            global_min_confidence: 0.5,
        }
    }
}

/// Background synchronizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub interval: Duration,
    /// Status records untouched for longer than this are removed
    pub status_retention: Duration,
    /// Offsets kept per node in the status history
    pub history_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            status_retention: Duration::from_secs(24 * 60 * 60),
            history_len: 32,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn secs_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl LightTimingConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_LT_NETWORK_FACTOR` (default: 1.5)
    /// - `QC_LT_VALIDATION_TOLERANCE_MS` (default: 50)
    /// - `QC_LT_MIN_CONFIDENCE` (default: 0.5)
    /// - `QC_LT_DELAY_CACHE_TTL_SECS` (default: 300)
    /// - `QC_LT_BLOCK_TOLERANCE_MS` / `QC_LT_TX_TOLERANCE_MS` / `QC_LT_HEARTBEAT_TOLERANCE_MS`
    ///   (default: 500 / 1000 / 50)
    /// - `QC_LT_SAFETY_FACTOR` (default: 2.0)
    /// - `QC_LT_MIN_PROPAGATION_DELAY_MS` (default: 100)
    /// - `QC_LT_TIMING_CACHE_TTL_SECS` (default: 120)
    /// - `QC_LT_OFFSET_STALENESS_SECS` (default: 1800)
    /// - `QC_LT_GLOBAL_MIN_CONFIDENCE` (default: 0.5)
    /// - `QC_LT_SYNC_INTERVAL_SECS` (default: 60)
    /// - `QC_LT_STATUS_RETENTION_SECS` (default: 86400)
    /// - `QC_LT_SYNC_HISTORY_LEN` (default: 32)
    ///
    /// Block time, voting window and phase timeout bounds are fixed.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Unparseable values
    /// fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            propagation: PropagationConfig {
                network_factor: parse_or(
                    &lookup,
                    "QC_LT_NETWORK_FACTOR",
                    d.propagation.network_factor,
                ),
                validation_tolerance: millis_or(
                    &lookup,
                    "QC_LT_VALIDATION_TOLERANCE_MS",
                    d.propagation.validation_tolerance,
                ),
                min_confidence: parse_or(
                    &lookup,
                    "QC_LT_MIN_CONFIDENCE",
                    d.propagation.min_confidence,
                ),
                delay_cache_ttl: secs_or(
                    &lookup,
                    "QC_LT_DELAY_CACHE_TTL_SECS",
                    d.propagation.delay_cache_ttl,
                ),
                block_tolerance: millis_or(
                    &lookup,
                    "QC_LT_BLOCK_TOLERANCE_MS",
                    d.propagation.block_tolerance,
                ),
                transaction_tolerance: millis_or(
                    &lookup,
                    "QC_LT_TX_TOLERANCE_MS",
                    d.propagation.transaction_tolerance,
                ),
                heartbeat_tolerance: millis_or(
                    &lookup,
                    "QC_LT_HEARTBEAT_TOLERANCE_MS",
                    d.propagation.heartbeat_tolerance,
                ),
            },
            consensus: ConsensusTimingConfig {
                safety_factor: parse_or(&lookup, "QC_LT_SAFETY_FACTOR", d.consensus.safety_factor),
                min_propagation_delay: millis_or(
                    &lookup,
                    "QC_LT_MIN_PROPAGATION_DELAY_MS",
                    d.consensus.min_propagation_delay,
                ),
                timing_cache_ttl: secs_or(
                    &lookup,
                    "QC_LT_TIMING_CACHE_TTL_SECS",
                    d.consensus.timing_cache_ttl,
                ),
                ..d.consensus
            },
            offsets: OffsetConfig {
                staleness: secs_or(&lookup, "QC_LT_OFFSET_STALENESS_SECS", d.offsets.staleness),
                global_min_confidence: parse_or(
                    &lookup,
                    "QC_LT_GLOBAL_MIN_CONFIDENCE",
                    d.offsets.global_min_confidence,
                ),
            },
            sync: SyncConfig {
                interval: secs_or(&lookup, "QC_LT_SYNC_INTERVAL_SECS", d.sync.interval),
                status_retention: secs_or(
                    &lookup,
                    "QC_LT_STATUS_RETENTION_SECS",
                    d.sync.status_retention,
                ),
                history_len: parse_or(&lookup, "QC_LT_SYNC_HISTORY_LEN", d.sync.history_len),
            },
        }
    }

    /// Reject configurations the engines cannot run with.
    pub fn validate(&self) -> TimingResult<()> {
        let p = &self.propagation;
        if !p.network_factor.is_finite() || p.network_factor < 1.0 {
            return Err(TimingError::Config(format!(
                "network_factor must be >= 1.0, got {}",
                p.network_factor
            )));
        }
        if !(0.0..=1.0).contains(&p.min_confidence) {
            return Err(TimingError::Config(format!(
                "min_confidence must be in [0, 1], got {}",
                p.min_confidence
            )));
        }
        if p.delay_cache_ttl.is_zero() {
            return Err(TimingError::Config("delay_cache_ttl must be non-zero".into()));
        }

        let c = &self.consensus;
        if !c.safety_factor.is_finite() || c.safety_factor <= 0.0 {
            return Err(TimingError::Config(format!(
                "safety_factor must be positive, got {}",
                c.safety_factor
            )));
        }
        if c.timing_cache_ttl.is_zero() {
            return Err(TimingError::Config("timing_cache_ttl must be non-zero".into()));
        }
        for (name, min, max) in [
            ("block_time", c.min_block_time, c.max_block_time),
            ("voting_window", c.min_voting_window, c.max_voting_window),
            ("phase_timeout", c.min_phase_timeout, c.max_phase_timeout),
        ] {
            if min > max {
                return Err(TimingError::Config(format!(
                    "{name} bounds misordered: min {min:?} > max {max:?}"
                )));
            }
        }

        let o = &self.offsets;
        if o.staleness.is_zero() {
            return Err(TimingError::Config("offset staleness must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&o.global_min_confidence) {
            return Err(TimingError::Config(format!(
                "global_min_confidence must be in [0, 1], got {}",
                o.global_min_confidence
            )));
        }

        let s = &self.sync;
        if s.interval.is_zero() {
            return Err(TimingError::Config("sync interval must be non-zero".into()));
        }
        if s.history_len == 0 {
            return Err(TimingError::Config("sync history_len must be at least 1".into()));
        }
        Ok(())
    }
}
