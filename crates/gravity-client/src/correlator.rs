use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use gravity_bus::Subscription;
use gravity_codec::ack::{decode_ack_cbor, AckV1};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Collects acknowledgments for one outstanding operation.
///
/// Owns the reply inbox subscription; it is released when the correlator
/// resolves or is dropped, so the inbox never receives again.
pub struct ReplyCorrelator {
    subscription: Subscription,
    target: usize,
    dedupe_by_node: bool,
}

impl ReplyCorrelator {
    pub fn new(subscription: Subscription, target: usize, dedupe_by_node: bool) -> Self {
        Self {
            subscription,
            target,
            dedupe_by_node,
        }
    }

    pub fn inbox(&self) -> &str {
        self.subscription.pattern()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Waits until `target` acknowledgments arrived, `timeout` elapsed or
    /// `cancel` resolved, whichever comes first.
    pub async fn collect(
        mut self,
        timeout: Duration,
        cancel: impl Future<Output = ()>,
    ) -> Result<Vec<AckV1>, ClientError> {
        if self.target == 0 {
            return Ok(Vec::new());
        }
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        tokio::pin!(cancel);

        let mut acks: Vec<AckV1> = Vec::with_capacity(self.target);
        let mut seen = HashSet::new();

        loop {
            tokio::select! {
                _ = &mut cancel => {
                    return Err(ClientError::Cancelled { acknowledged: acks.len() });
                }
                _ = &mut deadline => {
                    return Err(ClientError::Timeout {
                        acknowledged: acks.len(),
                        target: self.target,
                    });
                }
                maybe = self.subscription.next() => {
                    let Some(reply) = maybe else {
                        return Err(ClientError::Closed { acknowledged: acks.len() });
                    };
                    let ack = match decode_ack_cbor(&reply.payload) {
                        Ok(ack) => ack,
                        Err(err) => {
                            warn!(inbox = %reply.subject, "ignoring undecodable ack: {err}");
                            continue;
                        }
                    };
                    if self.dedupe_by_node && !seen.insert(ack.node_id) {
                        debug!(node = %ack.node_id.short(), "duplicate ack ignored");
                        continue;
                    }
                    acks.push(ack);
                    if acks.len() >= self.target {
                        return Ok(acks);
                    }
                }
            }
        }
    }
}
