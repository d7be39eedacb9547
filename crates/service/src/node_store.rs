//! Storage seam for node records
//!
//! Durable storage of nodes belongs to the rest of the dashboard. The core
//! only needs to list nodes, fetch one by id, and write back the connectivity
//! fields the health poller owns.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use time::OffsetDateTime;

use common::node::{ConnectivityState, NodeRecord};

#[derive(Debug, thiserror::Error)]
pub enum NodeStoreError {
    #[error("node not found: {0}")]
    NotFound(String),
    #[error("node store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, NodeStoreError>;

    async fn get_node(&self, id: &str) -> Result<NodeRecord, NodeStoreError>;

    /// Persist a successful check
    async fn record_online(&self, id: &str, at: OffsetDateTime) -> Result<(), NodeStoreError>;

    /// Persist a failed check; `last_seen_at` is left untouched
    async fn record_offline(&self, id: &str) -> Result<(), NodeStoreError>;
}

/// In-process node store, ordered by node id
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<BTreeMap<String, NodeRecord>>,
}

#[derive(Debug, Deserialize)]
struct Inventory {
    #[serde(default)]
    nodes: Vec<NodeRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to read inventory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse inventory: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate node id in inventory: {0}")]
    DuplicateId(String),
}

impl MemoryNodeStore {
    pub fn new(nodes: impl IntoIterator<Item = NodeRecord>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Parse a `nodes.toml` inventory (`[[nodes]]` tables)
    pub fn from_toml(source: &str) -> Result<Self, InventoryError> {
        let inventory: Inventory = toml::from_str(source)?;
        let mut nodes = BTreeMap::new();
        for node in inventory.nodes {
            if nodes.contains_key(&node.id) {
                return Err(InventoryError::DuplicateId(node.id));
            }
            nodes.insert(node.id.clone(), node);
        }
        Ok(Self {
            nodes: RwLock::new(nodes),
        })
    }

    /// Load an inventory file; a missing file yields an empty store
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "node inventory not found, starting empty");
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)?;
        let store = Self::from_toml(&source)?;
        tracing::info!(path = %path.display(), nodes = store.len(), "loaded node inventory");
        Ok(store)
    }

    pub fn insert(&self, node: NodeRecord) {
        self.nodes.write().insert(node.id.clone(), node);
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn update<F>(&self, id: &str, f: F) -> Result<(), NodeStoreError>
    where
        F: FnOnce(&mut NodeRecord),
    {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| NodeStoreError::NotFound(id.to_string()))?;
        f(node);
        Ok(())
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, NodeStoreError> {
        Ok(self.nodes.read().values().cloned().collect())
    }

    async fn get_node(&self, id: &str) -> Result<NodeRecord, NodeStoreError> {
        self.nodes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| NodeStoreError::NotFound(id.to_string()))
    }

    async fn record_online(&self, id: &str, at: OffsetDateTime) -> Result<(), NodeStoreError> {
        self.update(id, |node| {
            node.status = ConnectivityState::Online;
            node.last_seen_at = Some(at);
        })
    }

    async fn record_offline(&self, id: &str) -> Result<(), NodeStoreError> {
        self.update(id, |node| node.status = ConnectivityState::Offline)
    }
}
