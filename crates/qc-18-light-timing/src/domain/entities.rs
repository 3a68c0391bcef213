//! # Core Domain Entities
//!
//! - [`NodeRef`]: a node as seen through the node directory
//! - [`PairKey`]: order-independent key for a pair of nodes
//! - [`DelayResult`]: computed (or cached) propagation delay between two nodes
//! - [`ValidationResult`] / [`ValidationSubject`]: timestamp plausibility verdicts
//! - [`NodeOffset`]: estimated clock offset of one node
//! - [`SyncStatus`]: synchronizer bookkeeping for one node
//! - [`BatchOutcome`]: partial-success result of a fan-out computation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use super::delay::secs_to_duration;
use super::geo::{GeoPosition, Region};
use super::{TimingError, TimingResult};

fn default_active() -> bool {
    true
}

/// A node record owned by the node directory. Read-only to this subsystem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: String,
    pub position: GeoPosition,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
}

impl NodeRef {
    /// Create an active node last seen now.
    pub fn new(id: impl Into<String>, position: GeoPosition) -> Self {
        Self {
            id: id.into(),
            position,
            active: true,
            last_seen: Utc::now(),
        }
    }

    /// Builder method: set the activity flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Builder method: set the last-seen timestamp.
    pub fn with_last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = last_seen;
        self
    }
}

/// Key for an unordered pair of node identifiers.
///
/// `PairKey::new(a, b) == PairKey::new(b, a)`; delay is symmetric so both
/// directions share one cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub first: String,
    pub second: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.first == id || self.second == id
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.first, self.second)
    }
}

/// Theoretical propagation delay between two nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayResult {
    pub source_id: String,
    pub target_id: String,
    pub delay: Duration,
    /// Distance in meters
    pub distance_m: f64,
    pub computed_at: DateTime<Utc>,
    /// Whether this result was served from the delay cache
    pub cached: bool,
}

/// Kind of item whose timestamp is being validated.
///
/// Each kind carries its own tolerance; see
/// [`PropagationConfig`](super::PropagationConfig).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationSubject {
    Block { height: u64 },
    Transaction { hash: String },
    Heartbeat { node_id: String },
}

impl ValidationSubject {
    pub fn label(&self) -> &'static str {
        match self {
            ValidationSubject::Block { .. } => "block",
            ValidationSubject::Transaction { .. } => "transaction",
            ValidationSubject::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Verdict on whether a claimed timestamp is physically plausible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    pub reason: String,
    pub expected_delay: Duration,
    pub actual_diff: Duration,
    /// Bound the difference was compared against (expected delay + tolerance)
    pub threshold: Duration,
    pub validated_at: DateTime<Utc>,
    pub subject: Option<ValidationSubject>,
}

impl ValidationResult {
    /// An invalid verdict produced before any timing comparison was possible.
    pub fn rejected(reason: impl Into<String>, validated_at: DateTime<Utc>) -> Self {
        Self {
            valid: false,
            confidence: 0.0,
            reason: reason.into(),
            expected_delay: Duration::ZERO,
            actual_diff: Duration::ZERO,
            threshold: Duration::ZERO,
            validated_at,
            subject: None,
        }
    }

    /// Builder method: tag the verdict with the validated subject.
    pub fn with_subject(mut self, subject: ValidationSubject) -> Self {
        self.subject = Some(subject);
        self
    }
}

/// Estimated clock offset of a node relative to its reference set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeOffset {
    pub node_id: String,
    pub offset: Duration,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    pub measurement_count: usize,
    pub region: Region,
    pub calculated_at: DateTime<Utc>,
}

/// Synchronization state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

/// Per-node synchronization bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub node_id: String,
    pub last_sync: Option<DateTime<Utc>>,
    /// Successful syncs so far
    pub sync_count: u64,
    pub failure_count: u64,
    pub last_offset: Option<Duration>,
    /// Running average over every successful sync
    pub average_offset: Duration,
    pub state: SyncState,
    pub last_error: Option<String>,
    /// Most recent offsets, oldest first
    pub history: VecDeque<Duration>,
    /// Last time this record changed
    pub updated_at: DateTime<Utc>,
}

impl SyncStatus {
    pub fn pending(node_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.into(),
            last_sync: None,
            sync_count: 0,
            failure_count: 0,
            last_offset: None,
            average_offset: Duration::ZERO,
            state: SyncState::Pending,
            last_error: None,
            history: VecDeque::new(),
            updated_at: now,
        }
    }

    /// Record a successful offset calculation.
    pub fn record_success(&mut self, offset: Duration, now: DateTime<Utc>, history_len: usize) {
        self.sync_count += 1;
        let n = self.sync_count as f64;
        let avg = self.average_offset.as_secs_f64();
        self.average_offset = secs_to_duration(avg + (offset.as_secs_f64() - avg) / n);

        self.last_offset = Some(offset);
        self.last_sync = Some(now);
        self.state = SyncState::Synced;
        self.last_error = None;
        self.updated_at = now;

        self.history.push_back(offset);
        while self.history.len() > history_len {
            self.history.pop_front();
        }
    }

    /// Record a failed offset calculation. Previous offsets are kept.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.failure_count += 1;
        self.state = SyncState::Failed;
        self.last_error = Some(error.into());
        self.updated_at = now;
    }
}

/// Result of a fan-out computation that tolerates per-item failures.
#[derive(Debug)]
pub struct BatchOutcome<K, V> {
    /// Items that succeeded
    pub results: HashMap<K, V>,
    /// Items that failed, with their errors
    pub failures: Vec<(K, TimingError)>,
    /// Items launched
    pub total: usize,
    /// Whether the batch was cancelled before every item finished
    pub cancelled: bool,
}

impl<K, V> BatchOutcome<K, V> {
    pub fn empty() -> Self {
        Self {
            results: HashMap::new(),
            failures: Vec::new(),
            total: 0,
            cancelled: false,
        }
    }

    /// True when every launched item succeeded.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.results.len() == self.total
    }

    /// Summary error describing what did not succeed, if anything.
    pub fn error(&self) -> Option<TimingError> {
        if self.cancelled {
            return Some(TimingError::Cancelled {
                completed: self.results.len() + self.failures.len(),
                total: self.total,
            });
        }
        let failed = self.total.saturating_sub(self.results.len());
        if failed > 0 {
            return Some(TimingError::PartialBatchFailure {
                failed,
                total: self.total,
            });
        }
        None
    }

    /// Succeed only when every item succeeded, discarding partial results.
    pub fn into_result(self) -> TimingResult<HashMap<K, V>> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self.results),
        }
    }
}
