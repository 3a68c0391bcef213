//! # Fault Tolerance Thresholds
//!
//! Classic BFT bounds for a validator set of `n` distinct members:
//!
//! - Byzantine tolerance `f = ⌊(n-1)/3⌋`, so `3f + 1 ≤ n`
//! - Crash tolerance `⌊(n-1)/2⌋`
//! - Quorum `⌊2n/3⌋`, at least 1

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fault tolerance thresholds for a validator set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultTolerance {
    pub total_nodes: usize,
    pub byzantine_tolerance: usize,
    pub crash_tolerance: usize,
    pub quorum_size: usize,
}

impl FaultTolerance {
    /// Thresholds for `n` validators.
    pub fn for_nodes(n: usize) -> Self {
        let quorum = (n.saturating_mul(2) / 3).max(1);
        Self {
            total_nodes: n,
            byzantine_tolerance: n.saturating_sub(1) / 3,
            crash_tolerance: n.saturating_sub(1) / 2,
            quorum_size: quorum.min(n.max(1)),
        }
    }

    /// Whether `faulty` Byzantine members can be absorbed.
    pub fn tolerates_byzantine(&self, faulty: usize) -> bool {
        faulty <= self.byzantine_tolerance
    }

    pub fn has_quorum(&self, votes: usize) -> bool {
        votes >= self.quorum_size
    }
}

/// Sorted, deduplicated copy of a validator id list.
pub fn unique_ids<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut unique: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
    unique.sort();
    unique.dedup();
    unique
}

/// Order-independent fingerprint of a validator set.
///
/// Input order and duplicates do not change the result.
pub fn validator_set_fingerprint<S: AsRef<str>>(ids: &[S]) -> String {
    let mut hasher = Sha256::new();
    for id in unique_ids(ids) {
        hasher.update(id.as_bytes());
        // Separator keeps ["ab", "c"] distinct from ["a", "bc"]
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
