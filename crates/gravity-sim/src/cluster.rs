use std::sync::Arc;

use gravity_bus::InMemoryBus;
use gravity_client::{Client, ClientConfig};
use gravity_node::{LruStore, LruStoreConfig, NodeConfig, NodeError, NodeHandle, NodeService};
use tracing::debug;

pub type SimNode = NodeService<InMemoryBus, LruStore>;

struct ClusterNode {
    service: Arc<SimNode>,
    handle: Option<NodeHandle>,
}

/// A set of cache nodes sharing one in-memory bus.
///
/// Must be created inside a tokio runtime.
pub struct Cluster {
    bus: Arc<InMemoryBus>,
    nodes: Vec<ClusterNode>,
}

impl Cluster {
    /// Starts `nodes` nodes with default store limits.
    pub fn start(nodes: usize) -> Result<Self, NodeError> {
        Self::start_with(Arc::new(InMemoryBus::default()), nodes, LruStoreConfig::default())
    }

    pub fn start_with(
        bus: Arc<InMemoryBus>,
        nodes: usize,
        store: LruStoreConfig,
    ) -> Result<Self, NodeError> {
        let mut cluster = Self {
            bus,
            nodes: Vec::with_capacity(nodes),
        };
        for idx in 0..nodes {
            let config = NodeConfig {
                node_seed: Some(format!("sim-node-{idx}")),
                store,
                ..NodeConfig::default()
            };
            let service = Arc::new(NodeService::new(
                Arc::clone(&cluster.bus),
                LruStore::new(store),
                config,
            ));
            let handle = service.start()?;
            debug!(idx, node = %service.node_id().short(), "sim node started");
            cluster.nodes.push(ClusterNode {
                service,
                handle: Some(handle),
            });
        }
        Ok(cluster)
    }

    pub fn bus(&self) -> &Arc<InMemoryBus> {
        &self.bus
    }

    pub fn client(&self, config: ClientConfig) -> Client<InMemoryBus> {
        Client::new(Arc::clone(&self.bus), config)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> Option<&Arc<SimNode>> {
        self.nodes.get(idx).map(|node| &node.service)
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().filter(|node| node.handle.is_some()).count()
    }

    /// Stops one node; its store stays inspectable through `node`.
    pub async fn stop_node(&mut self, idx: usize) {
        if let Some(handle) = self.nodes.get_mut(idx).and_then(|node| node.handle.take()) {
            handle.stop().await;
        }
    }

    pub async fn shutdown(mut self) {
        for node in &mut self.nodes {
            if let Some(handle) = node.handle.take() {
                handle.stop().await;
            }
        }
    }
}
