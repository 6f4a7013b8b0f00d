use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Header carrying the operation wire name.
pub const OP_HEADER: &str = "op";

/// One message as seen by the bus: subject, metadata headers, opaque payload
/// and an optional reply subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub subject: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: Bytes,
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Sets one header, replacing any previous value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::{BusMessage, OP_HEADER};

    #[test]
    fn builder_sets_headers_and_reply() {
        let msg = BusMessage::new("k", b"v".to_vec())
            .with_header(OP_HEADER, "set")
            .with_reply_to("_INBOX.abc");
        assert_eq!(msg.subject, "k");
        assert_eq!(msg.header(OP_HEADER), Some("set"));
        assert_eq!(msg.header("missing"), None);
        assert_eq!(msg.reply_to.as_deref(), Some("_INBOX.abc"));
        assert_eq!(&msg.payload[..], b"v");
    }
}
