use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GravityError;
use crate::subject::{is_reserved_char, INBOX_PREFIX};

/// Maximum accepted key length in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// Cache key. Doubles as the broadcast subject, so it must be a single
/// subject token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Validates `raw` as a single-token subject.
    pub fn new(raw: impl Into<String>) -> Result<Self, GravityError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(GravityError::InvalidKey("key must not be empty"));
        }
        if raw.len() > MAX_KEY_LEN {
            return Err(GravityError::InvalidKey("key exceeds 256 bytes"));
        }
        if raw.chars().any(|c| c.is_whitespace() || is_reserved_char(c)) {
            return Err(GravityError::InvalidKey(
                "key contains whitespace or reserved subject characters",
            ));
        }
        if raw.starts_with(INBOX_PREFIX.trim_end_matches('.')) {
            return Err(GravityError::InvalidKey("key uses the reply inbox prefix"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Key {
    type Error = GravityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Key {
    type Error = GravityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 32-byte node identity carried in every acknowledgment.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// First eight hex characters, used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

impl FromStr for NodeId {
    type Err = GravityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim()).map_err(|_| GravityError::InvalidNodeId("bad hex"))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| GravityError::InvalidNodeId("expected 32 bytes"))?;
        Ok(Self(bytes))
    }
}

/// Operation carried in the `op` header of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Get,
    Set,
    Delete,
}

impl OperationKind {
    /// Wire name used in the `op` header.
    pub fn as_wire(self) -> &'static str {
        match self {
            OperationKind::Get => "get",
            OperationKind::Set => "set",
            OperationKind::Delete => "del",
        }
    }

    /// Parses a wire name. Unrecognized names return `None`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "get" => Some(OperationKind::Get),
            "set" => Some(OperationKind::Set),
            "del" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::{Key, NodeId, OperationKind, MAX_KEY_LEN};

    #[test]
    fn key_accepts_plain_tokens() {
        let key = Key::new("user-42_profile").expect("plain key should be valid");
        assert_eq!(key.as_str(), "user-42_profile");
        assert_eq!(key.to_string(), "user-42_profile");
    }

    #[test]
    fn key_rejects_reserved_and_empty_input() {
        assert!(Key::new("").is_err());
        assert!(Key::new("a.b").is_err());
        assert!(Key::new("*").is_err());
        assert!(Key::new("a>").is_err());
        assert!(Key::new("has space").is_err());
        assert!(Key::new("tab\tkey").is_err());
        assert!(Key::new("_INBOX").is_err());
        assert!(Key::new("x".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(Key::new("x".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn node_id_hex_round_trips() {
        let id = NodeId([0xAB; 32]);
        let parsed: NodeId = id.to_string().parse().expect("hex should parse");
        assert_eq!(parsed, id);
        assert_eq!(id.short(), "abababab");
        assert!("zz".parse::<NodeId>().is_err());
        assert!("abcd".parse::<NodeId>().is_err());
    }

    #[test]
    fn operation_wire_names_are_stable() {
        assert_eq!(OperationKind::Get.as_wire(), "get");
        assert_eq!(OperationKind::Set.as_wire(), "set");
        assert_eq!(OperationKind::Delete.as_wire(), "del");
        assert_eq!(OperationKind::from_wire("del"), Some(OperationKind::Delete));
        assert_eq!(OperationKind::from_wire("DEL"), None);
        assert_eq!(OperationKind::from_wire("incr"), None);
    }
}
