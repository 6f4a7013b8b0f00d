use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gravity_bus::Bus;
use gravity_codec::ack::{AckStatus, AckV1};
use gravity_codec::envelope::OperationEnvelope;
use gravity_core::{Key, NodeId, OperationKind};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::correlator::ReplyCorrelator;
use crate::error::ClientError;

/// Outcome of a Set or Delete that reached its quorum with every counted
/// node applying the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub acknowledged: usize,
    pub acks: Vec<(NodeId, AckStatus)>,
}

impl WriteReceipt {
    fn from_acks(acks: &[AckV1]) -> Self {
        Self {
            acknowledged: acks.len(),
            acks: acks.iter().map(|ack| (ack.node_id, ack.status)).collect(),
        }
    }

    /// Whether every counted node applied the write.
    pub fn all_ok(&self) -> bool {
        self.acks.iter().all(|(_, status)| *status == AckStatus::Ok)
    }

    /// A refusal still counts towards the wait, since each node replies
    /// once, but fails the write as a whole.
    fn into_result(self) -> Result<Self, ClientError> {
        let rejected = self
            .acks
            .iter()
            .filter(|(_, status)| *status != AckStatus::Ok)
            .count();
        if rejected == 0 {
            Ok(self)
        } else {
            Err(ClientError::Rejected {
                acknowledged: self.acknowledged,
                rejected,
                acks: self.acks,
            })
        }
    }
}

/// Issues cache operations over a bus.
///
/// `replicas` is a caller-supplied quorum, not derived from cluster state.
/// If fewer than `replicas` nodes are alive the call waits for its full
/// timeout and fails with `ClientError::Timeout` carrying the partial count.
pub struct Client<B> {
    bus: Arc<B>,
    config: ClientConfig,
}

impl<B> Clone for Client<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            config: self.config.clone(),
        }
    }
}

impl<B: Bus> Client<B> {
    pub fn new(bus: Arc<B>, config: ClientConfig) -> Self {
        Self { bus, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stores `value` under `key` and waits for `replicas` acknowledgments.
    ///
    /// Fails with `ClientError::Rejected` if any counted node refused it.
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        replicas: usize,
        timeout: Duration,
    ) -> Result<WriteReceipt, ClientError> {
        let acks = self
            .request(
                key,
                OperationKind::Set.as_wire(),
                Some(value.into()),
                replicas,
                timeout,
            )
            .await?;
        WriteReceipt::from_acks(&acks).into_result()
    }

    /// Removes `key`. Deleting a missing key succeeds; any other non-`ok`
    /// status fails with `ClientError::Rejected`.
    pub async fn delete(
        &self,
        key: &str,
        replicas: usize,
        timeout: Duration,
    ) -> Result<WriteReceipt, ClientError> {
        let acks = self
            .request(key, OperationKind::Delete.as_wire(), None, replicas, timeout)
            .await?;
        WriteReceipt::from_acks(&acks).into_result()
    }

    /// Reads `key` from whichever node answers first.
    ///
    /// `Ok(None)` means that node does not hold the key. Uses
    /// `ClientConfig::get_timeout` when `timeout` is `None`.
    pub async fn get(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>, ClientError> {
        let timeout = timeout.unwrap_or(self.config.get_timeout);
        let acks = self
            .request(key, OperationKind::Get.as_wire(), None, 1, timeout)
            .await?;
        Ok(acks.into_iter().find_map(|ack| ack.value))
    }

    /// Sends an operation with an arbitrary name and returns the raw
    /// acknowledgments once `replicas` arrived.
    pub async fn request(
        &self,
        key: &str,
        op: &str,
        payload: Option<Bytes>,
        replicas: usize,
        timeout: Duration,
    ) -> Result<Vec<AckV1>, ClientError> {
        self.request_until(key, op, payload, replicas, timeout, future::pending())
            .await
    }

    /// Like `request`, but resolves with `ClientError::Cancelled` as soon as
    /// `cancel` completes.
    pub async fn request_until(
        &self,
        key: &str,
        op: &str,
        payload: Option<Bytes>,
        replicas: usize,
        timeout: Duration,
        cancel: impl Future<Output = ()>,
    ) -> Result<Vec<AckV1>, ClientError> {
        let key = Key::new(key)?;
        let inbox = self.bus.new_inbox();

        // Subscribe before publishing so no reply can be missed.
        let subscription = self
            .bus
            .subscribe(&inbox)
            .map_err(|err| ClientError::Subscribe(err.to_string()))?;
        let correlator = ReplyCorrelator::new(subscription, replicas, self.config.dedupe_by_node);

        let message = OperationEnvelope::with_raw_op(&key, op, payload, inbox).into_message();
        self.bus
            .publish(message)
            .map_err(|err| ClientError::Publish(err.to_string()))?;
        debug!(key = %key, op, target = replicas, "operation published");

        match correlator.collect(timeout, cancel).await {
            Ok(acks) => {
                debug!(key = %key, op, acknowledged = acks.len(), "quorum reached");
                Ok(acks)
            }
            Err(err) => {
                warn!(key = %key, op, target = replicas, "operation failed: {err}");
                Err(err)
            }
        }
    }
}
