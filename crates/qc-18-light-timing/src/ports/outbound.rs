//! Driven ports (Outbound dependencies)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CacheKind, NodeRef, TimingResult};

/// Read-only view of the node directory
///
/// The directory owns node records and their persistence; this subsystem
/// only looks nodes up.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Look up a single node
    ///
    /// Fails with `TimingError::NodeNotFound` for unknown ids.
    async fn get_node(&self, id: &str) -> TimingResult<NodeRef>;

    /// Every known node, active or not
    async fn get_all_nodes(&self) -> Vec<NodeRef>;

    /// Nodes currently flagged active
    async fn get_active_nodes(&self) -> Vec<NodeRef>;
}

/// Wall-clock source for timestamp validation and record stamps
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Default time source using system time
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Counter sink owned by one engine instance
///
/// Implementations must be cheap and non-blocking; they are called on the
/// request path and from fan-out tasks.
pub trait TimingStats: Send + Sync {
    fn cache_hit(&self, kind: CacheKind);
    fn cache_miss(&self, kind: CacheKind);
    fn delay_computed(&self);
    /// One timestamp validation verdict
    fn validation(&self, accepted: bool);
    /// One item of a fan-out batch finished
    fn batch_item(&self, ok: bool);
    /// One node's offset was (re)computed by the synchronizer
    fn sync_result(&self, ok: bool);
}
