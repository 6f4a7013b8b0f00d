use gravity_core::hash::{derive_node_id, random_node_id};
use gravity_core::subject::ALL_KEYS_PATTERN;
use gravity_core::NodeId;

use crate::store::LruStoreConfig;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Pattern the node subscribes to. `*` covers every key.
    pub subject_pattern: String,
    /// Seed for a reproducible node identity; random when unset.
    pub node_seed: Option<String>,
    pub store: LruStoreConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            subject_pattern: ALL_KEYS_PATTERN.to_string(),
            node_seed: None,
            store: LruStoreConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Resolves the node identity from `node_seed`.
    pub fn node_id(&self) -> NodeId {
        match &self.node_seed {
            Some(seed) => derive_node_id(seed.as_bytes()),
            None => random_node_id(),
        }
    }
}
