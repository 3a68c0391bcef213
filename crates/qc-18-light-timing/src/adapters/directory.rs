//! In-memory node directory.
//!
//! Used by the runtime binary (seeded from a JSON file) and by tests. A
//! production deployment plugs its own directory in through
//! [`NodeDirectory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::{NodeRef, TimingError, TimingResult};
use crate::ports::NodeDirectory;

/// Node directory backed by a lock-guarded map.
#[derive(Default)]
pub struct InMemoryNodeDirectory {
    nodes: RwLock<HashMap<String, NodeRef>>,
}

impl InMemoryNodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeRef>) -> TimingResult<Self> {
        let directory = Self::new();
        for node in nodes {
            directory.upsert(node)?;
        }
        Ok(directory)
    }

    /// Parse a JSON array of node records.
    ///
    /// Positions are validated while parsing; an out-of-range coordinate
    /// rejects the whole document.
    pub fn from_json_str(json: &str) -> TimingResult<Self> {
        let nodes: Vec<NodeRef> =
            serde_json::from_str(json).map_err(|e| TimingError::InvalidNode(e.to_string()))?;
        Self::from_nodes(nodes)
    }

    /// Insert or replace a node. Returns the previous record.
    pub fn upsert(&self, node: NodeRef) -> TimingResult<Option<NodeRef>> {
        if node.id.trim().is_empty() {
            return Err(TimingError::InvalidNode("node id must be non-empty".into()));
        }
        Ok(self.nodes.write().insert(node.id.clone(), node))
    }

    pub fn remove(&self, id: &str) -> Option<NodeRef> {
        self.nodes.write().remove(id)
    }

    /// Flip a node's activity flag. Returns false for unknown ids.
    pub fn set_active(&self, id: &str, active: bool, seen_at: DateTime<Utc>) -> bool {
        match self.nodes.write().get_mut(id) {
            Some(node) => {
                node.active = active;
                node.last_seen = seen_at;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn sorted(&self, filter: impl Fn(&NodeRef) -> bool) -> Vec<NodeRef> {
        let mut nodes: Vec<NodeRef> = self
            .nodes
            .read()
            .values()
            .filter(|n| filter(n))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }
}

#[async_trait]
impl NodeDirectory for InMemoryNodeDirectory {
    async fn get_node(&self, id: &str) -> TimingResult<NodeRef> {
        self.nodes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| TimingError::NodeNotFound(id.to_string()))
    }

    async fn get_all_nodes(&self) -> Vec<NodeRef> {
        self.sorted(|_| true)
    }

    async fn get_active_nodes(&self) -> Vec<NodeRef> {
        self.sorted(|n| n.active)
    }
}
