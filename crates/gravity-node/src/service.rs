use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gravity_bus::{Bus, Subscription};
use gravity_codec::ack::encode_ack_cbor;
use gravity_codec::envelope::OperationEnvelope;
use gravity_core::{BusMessage, NodeId};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::handler::handle_envelope;
use crate::store::LocalStore;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node subscribe to {pattern} failed: {reason}")]
    Subscribe { pattern: String, reason: String },
}

#[derive(Default)]
struct NodeStats {
    received: AtomicU64,
    replied: AtomicU64,
    reply_failed: AtomicU64,
    unanswerable: AtomicU64,
}

/// Point-in-time copy of a node's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStatsSnapshot {
    /// Envelopes pulled from the bus.
    pub received: u64,
    /// Acknowledgments handed to the bus.
    pub replied: u64,
    /// Acknowledgments that failed to encode or publish.
    pub reply_failed: u64,
    /// Envelopes applied without a reply subject.
    pub unanswerable: u64,
}

/// One cache node: a store, an identity and a subscription to every key.
pub struct NodeService<B, S> {
    bus: Arc<B>,
    store: Arc<S>,
    config: NodeConfig,
    node_id: NodeId,
    stats: Arc<NodeStats>,
}

impl<B, S> NodeService<B, S>
where
    B: Bus + 'static,
    S: LocalStore + 'static,
{
    pub fn new(bus: Arc<B>, store: S, config: NodeConfig) -> Self {
        let node_id = config.node_id();
        Self {
            bus,
            store: Arc::new(store),
            config,
            node_id,
            stats: Arc::new(NodeStats::default()),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stats(&self) -> NodeStatsSnapshot {
        NodeStatsSnapshot {
            received: self.stats.received.load(Ordering::Relaxed),
            replied: self.stats.replied.load(Ordering::Relaxed),
            reply_failed: self.stats.reply_failed.load(Ordering::Relaxed),
            unanswerable: self.stats.unanswerable.load(Ordering::Relaxed),
        }
    }

    fn subscribe(&self) -> Result<Subscription, NodeError> {
        self.bus
            .subscribe(&self.config.subject_pattern)
            .map_err(|err| NodeError::Subscribe {
                pattern: self.config.subject_pattern.clone(),
                reason: err.to_string(),
            })
    }

    /// Subscribes and serves until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), NodeError> {
        let subscription = self.subscribe()?;
        self.serve(subscription, shutdown).await;
        Ok(())
    }

    /// Subscribes immediately and serves on a background task.
    ///
    /// The subscription is in place when this returns, so operations published
    /// afterwards reach this node.
    pub fn start(self: &Arc<Self>) -> Result<NodeHandle, NodeError> {
        let subscription = self.subscribe()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let service = Arc::clone(self);
        let task = tokio::spawn(async move {
            service
                .serve(subscription, async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });
        Ok(NodeHandle {
            node_id: self.node_id,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    async fn serve(&self, mut subscription: Subscription, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();
        info!(
            node = %self.node_id.short(),
            pattern = %self.config.subject_pattern,
            "node serving"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                maybe = subscription.next() => {
                    let Some(message) = maybe else {
                        warn!(node = %self.node_id.short(), "node subscription closed");
                        break;
                    };
                    self.stats.received.fetch_add(1, Ordering::Relaxed);
                    let bus = Arc::clone(&self.bus);
                    let store = Arc::clone(&self.store);
                    let stats = Arc::clone(&self.stats);
                    let node_id = self.node_id;
                    tasks.spawn(async move {
                        process_message(&*bus, &*store, &stats, node_id, message);
                    });
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Stop intake first; in-flight envelopes still get their reply.
        drop(subscription);
        while tasks.join_next().await.is_some() {}
        let stats = self.stats();
        info!(
            node = %self.node_id.short(),
            received = stats.received,
            replied = stats.replied,
            "node stopped"
        );
    }
}

fn process_message<B, S>(bus: &B, store: &S, stats: &NodeStats, node_id: NodeId, message: BusMessage)
where
    B: Bus + ?Sized,
    S: LocalStore + ?Sized,
{
    let envelope = OperationEnvelope::from_message(message);
    let ack = handle_envelope(store, node_id, &envelope);

    let Some(reply_to) = envelope.reply_to else {
        stats.unanswerable.fetch_add(1, Ordering::Relaxed);
        warn!(key = %envelope.key, op = %envelope.op.wire_name(), "envelope has no reply subject; applied without ack");
        return;
    };

    let bytes = match encode_ack_cbor(&ack) {
        Ok(bytes) => bytes,
        Err(err) => {
            stats.reply_failed.fetch_add(1, Ordering::Relaxed);
            warn!(key = %envelope.key, "failed to encode ack: {err}");
            return;
        }
    };
    match bus.publish(BusMessage::new(reply_to, bytes)) {
        Ok(()) => {
            stats.replied.fetch_add(1, Ordering::Relaxed);
            debug!(key = %envelope.key, status = ?ack.status, "ack sent");
        }
        Err(err) => {
            stats.reply_failed.fetch_add(1, Ordering::Relaxed);
            warn!(key = %envelope.key, "failed to publish ack: {err}");
        }
    }
}

/// Handle to a node started with `NodeService::start`.
pub struct NodeHandle {
    node_id: NodeId,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Stops intake and waits for in-flight envelopes to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
