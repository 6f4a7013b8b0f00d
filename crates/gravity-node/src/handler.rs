use gravity_codec::ack::AckV1;
use gravity_codec::envelope::{EnvelopeOp, OperationEnvelope};
use gravity_core::{NodeId, OperationKind};
use tracing::{info, warn};

use crate::store::LocalStore;

/// Applies one envelope to `store` and builds the acknowledgment to send back.
///
/// Stateless across envelopes: the store is the only shared state.
pub fn handle_envelope<S>(store: &S, node_id: NodeId, envelope: &OperationEnvelope) -> AckV1
where
    S: LocalStore + ?Sized,
{
    let key = envelope.key.as_str();
    let kind = match &envelope.op {
        EnvelopeOp::Known(kind) => *kind,
        EnvelopeOp::Unknown(raw) => {
            warn!(key, op = %raw, node = %node_id.short(), "unknown operation");
            return AckV1::unknown_operation(node_id);
        }
    };

    match kind {
        OperationKind::Get => match store.get(key) {
            Some(value) => {
                info!(key, op = "get", "hit");
                AckV1::value(node_id, value)
            }
            None => {
                info!(key, op = "get", "miss");
                AckV1::not_found(node_id)
            }
        },
        OperationKind::Set => {
            let value = envelope.value.clone().unwrap_or_default();
            let len = value.len();
            match store.set(key, value) {
                Ok(()) => {
                    info!(key, op = "set", len, "applied");
                    AckV1::ok(node_id)
                }
                Err(err) => {
                    warn!(key, op = "set", "write rejected: {err}");
                    AckV1::rejected(node_id)
                }
            }
        }
        OperationKind::Delete => {
            let removed = store.delete(key);
            info!(key, op = "del", removed, "applied");
            AckV1::ok(node_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use gravity_codec::ack::AckStatus;
    use gravity_codec::envelope::OperationEnvelope;
    use gravity_core::{Key, NodeId, OperationKind};

    use super::handle_envelope;
    use crate::store::{LocalStore, LruStore, LruStoreConfig};

    const NODE: NodeId = NodeId([0x07; 32]);

    fn envelope(kind: OperationKind, value: Option<&'static [u8]>) -> OperationEnvelope {
        let key = Key::new("user-1").expect("key");
        OperationEnvelope::new(
            &key,
            kind,
            value.map(Bytes::from_static),
            "_INBOX.0011",
        )
    }

    #[test]
    fn set_get_delete_cycle() {
        let store = LruStore::default();

        let ack = handle_envelope(&store, NODE, &envelope(OperationKind::Set, Some(b"v1")));
        assert_eq!(ack.status, AckStatus::Ok);
        assert_eq!(ack.node_id, NODE);

        let ack = handle_envelope(&store, NODE, &envelope(OperationKind::Get, None));
        assert_eq!(ack.status, AckStatus::Value);
        assert_eq!(ack.value, Some(Bytes::from_static(b"v1")));

        let ack = handle_envelope(&store, NODE, &envelope(OperationKind::Delete, None));
        assert_eq!(ack.status, AckStatus::Ok);

        let ack = handle_envelope(&store, NODE, &envelope(OperationKind::Get, None));
        assert_eq!(ack.status, AckStatus::NotFound);
        assert!(ack.value.is_none());
    }

    #[test]
    fn delete_of_missing_key_is_ok() {
        let store = LruStore::default();
        let ack = handle_envelope(&store, NODE, &envelope(OperationKind::Delete, None));
        assert_eq!(ack.status, AckStatus::Ok);
    }

    #[test]
    fn repeated_set_has_same_effect() {
        let store = LruStore::default();
        for _ in 0..3 {
            let ack = handle_envelope(&store, NODE, &envelope(OperationKind::Set, Some(b"v")));
            assert_eq!(ack.status, AckStatus::Ok);
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("user-1"), Some(Bytes::from_static(b"v")));
    }

    #[test]
    fn unknown_and_missing_ops_are_reported() {
        let store = LruStore::default();
        let key = Key::new("user-1").expect("key");

        let bogus = OperationEnvelope::with_raw_op(&key, "incr", None, "_INBOX.01");
        let ack = handle_envelope(&store, NODE, &bogus);
        assert_eq!(ack.status, AckStatus::UnknownOperation);

        let mut missing = bogus.clone();
        missing.op = gravity_codec::envelope::EnvelopeOp::parse(None);
        let ack = handle_envelope(&store, NODE, &missing);
        assert_eq!(ack.status, AckStatus::UnknownOperation);
        assert!(store.is_empty());
    }

    #[test]
    fn store_refusal_becomes_rejected() {
        let store = LruStore::new(LruStoreConfig {
            max_entries: 10,
            max_cost: 4,
        });
        let ack = handle_envelope(
            &store,
            NODE,
            &envelope(OperationKind::Set, Some(b"far too large")),
        );
        assert_eq!(ack.status, AckStatus::Rejected);
        assert!(store.get("user-1").is_none());
    }
}
