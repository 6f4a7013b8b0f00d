use bytes::Bytes;
use gravity_core::{BusMessage, Key, OperationKind, OP_HEADER};

/// Operation name as received in the `op` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeOp {
    Known(OperationKind),
    /// Unrecognized name; empty when the header was missing.
    Unknown(String),
}

impl EnvelopeOp {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(name) => match OperationKind::from_wire(name) {
                Some(kind) => EnvelopeOp::Known(kind),
                None => EnvelopeOp::Unknown(name.to_string()),
            },
            None => EnvelopeOp::Unknown(String::new()),
        }
    }

    pub fn wire_name(&self) -> &str {
        match self {
            EnvelopeOp::Known(kind) => kind.as_wire(),
            EnvelopeOp::Unknown(raw) => raw,
        }
    }
}

/// One cache operation: `{key, kind, value?, reply-destination}`.
///
/// The key becomes the bus subject, the kind travels in the `op` header, and
/// the value is the message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationEnvelope {
    pub key: String,
    pub op: EnvelopeOp,
    pub value: Option<Bytes>,
    pub reply_to: Option<String>,
}

impl OperationEnvelope {
    pub fn new(
        key: &Key,
        kind: OperationKind,
        value: Option<Bytes>,
        reply_to: impl Into<String>,
    ) -> Self {
        Self {
            key: key.as_str().to_string(),
            op: EnvelopeOp::Known(kind),
            value,
            reply_to: Some(reply_to.into()),
        }
    }

    /// Builds an envelope with an arbitrary operation name.
    pub fn with_raw_op(
        key: &Key,
        op: &str,
        value: Option<Bytes>,
        reply_to: impl Into<String>,
    ) -> Self {
        Self {
            key: key.as_str().to_string(),
            op: EnvelopeOp::parse(Some(op)),
            value,
            reply_to: Some(reply_to.into()),
        }
    }

    pub fn kind(&self) -> Option<OperationKind> {
        match self.op {
            EnvelopeOp::Known(kind) => Some(kind),
            EnvelopeOp::Unknown(_) => None,
        }
    }

    pub fn into_message(self) -> BusMessage {
        let mut message = BusMessage::new(self.key, self.value.unwrap_or_default());
        let op = self.op.wire_name().to_string();
        if !op.is_empty() {
            message = message.with_header(OP_HEADER, op);
        }
        message.reply_to = self.reply_to;
        message
    }

    /// Interprets a received bus message. Never fails: a missing or unknown
    /// `op` header is kept as `EnvelopeOp::Unknown` for the handler to report.
    pub fn from_message(message: BusMessage) -> Self {
        let op = EnvelopeOp::parse(message.header(OP_HEADER));
        let value = if matches!(op, EnvelopeOp::Known(OperationKind::Set))
            || !message.payload.is_empty()
        {
            Some(message.payload)
        } else {
            None
        };
        Self {
            key: message.subject,
            op,
            value,
            reply_to: message.reply_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EnvelopeOp, OperationEnvelope};
    use bytes::Bytes;
    use gravity_core::{BusMessage, Key, OperationKind, OP_HEADER};

    #[test]
    fn set_envelope_maps_key_op_payload_and_reply() {
        let key = Key::new("k").expect("key");
        let msg = OperationEnvelope::new(
            &key,
            OperationKind::Set,
            Some(Bytes::from_static(b"v1")),
            "_INBOX.1",
        )
        .into_message();
        assert_eq!(msg.subject, "k");
        assert_eq!(msg.header(OP_HEADER), Some("set"));
        assert_eq!(&msg.payload[..], b"v1");
        assert_eq!(msg.reply_to.as_deref(), Some("_INBOX.1"));

        let back = OperationEnvelope::from_message(msg);
        assert_eq!(back.kind(), Some(OperationKind::Set));
        assert_eq!(back.value, Some(Bytes::from_static(b"v1")));
    }

    #[test]
    fn empty_set_value_is_still_a_value() {
        let msg = BusMessage::new("k", Vec::new()).with_header(OP_HEADER, "set");
        let env = OperationEnvelope::from_message(msg);
        assert_eq!(env.value, Some(Bytes::new()));
    }

    #[test]
    fn get_without_payload_has_no_value() {
        let msg = BusMessage::new("k", Vec::new()).with_header(OP_HEADER, "get");
        let env = OperationEnvelope::from_message(msg);
        assert_eq!(env.kind(), Some(OperationKind::Get));
        assert!(env.value.is_none());
    }

    #[test]
    fn missing_and_unknown_ops_are_preserved() {
        let env = OperationEnvelope::from_message(BusMessage::new("k", Vec::new()));
        assert_eq!(env.op, EnvelopeOp::Unknown(String::new()));

        let msg = BusMessage::new("k", Vec::new()).with_header(OP_HEADER, "incr");
        let env = OperationEnvelope::from_message(msg);
        assert_eq!(env.op, EnvelopeOp::Unknown("incr".to_string()));
        assert_eq!(env.kind(), None);
        assert_eq!(env.op.wire_name(), "incr");
    }

    #[test]
    fn raw_op_envelope_round_trips_header() {
        let key = Key::new("k").expect("key");
        let msg = OperationEnvelope::with_raw_op(&key, "incr", None, "_INBOX.2").into_message();
        assert_eq!(msg.header(OP_HEADER), Some("incr"));
    }
}
