use bytes::Bytes;
use gravity_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Acknowledgment schema version for `AckV1`.
pub const ACK_V1_VERSION: u16 = 1;

/// Outcome a node reports for one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Set/Delete applied.
    Ok,
    /// Get hit; `value` carries the bytes.
    Value,
    /// Get miss. Not an error.
    NotFound,
    /// The `op` header was missing or not recognized.
    UnknownOperation,
    /// The local store refused the write.
    Rejected,
}

impl AckStatus {
    /// Whether this status carries a value.
    pub fn is_value(self) -> bool {
        matches!(self, AckStatus::Value)
    }
}

/// Reply payload sent by a node to an envelope's reply subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckV1 {
    /// Wire version.
    pub version: u16,
    /// Identity of the replying node.
    pub node_id: NodeId,
    pub status: AckStatus,
    /// Present only for `AckStatus::Value`.
    pub value: Option<Bytes>,
}

impl AckV1 {
    fn with_status(node_id: NodeId, status: AckStatus, value: Option<Bytes>) -> Self {
        Self {
            version: ACK_V1_VERSION,
            node_id,
            status,
            value,
        }
    }

    pub fn ok(node_id: NodeId) -> Self {
        Self::with_status(node_id, AckStatus::Ok, None)
    }

    pub fn value(node_id: NodeId, value: impl Into<Bytes>) -> Self {
        Self::with_status(node_id, AckStatus::Value, Some(value.into()))
    }

    pub fn not_found(node_id: NodeId) -> Self {
        Self::with_status(node_id, AckStatus::NotFound, None)
    }

    pub fn unknown_operation(node_id: NodeId) -> Self {
        Self::with_status(node_id, AckStatus::UnknownOperation, None)
    }

    pub fn rejected(node_id: NodeId) -> Self {
        Self::with_status(node_id, AckStatus::Rejected, None)
    }

    /// Validates version and status/value consistency.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.version != ACK_V1_VERSION {
            return Err(CodecError::InvalidAck("unsupported ack version"));
        }
        match (self.status, &self.value) {
            (AckStatus::Value, None) => Err(CodecError::InvalidAck("value status requires value")),
            (AckStatus::Value, Some(_)) => Ok(()),
            (_, Some(_)) => Err(CodecError::InvalidAck(
                "only value status may carry a value",
            )),
            (_, None) => Ok(()),
        }
    }
}

/// Encodes `AckV1` as CBOR after validation.
pub fn encode_ack_cbor(ack: &AckV1) -> Result<Vec<u8>, CodecError> {
    ack.validate()?;
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(ack, &mut bytes).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes and validates a CBOR acknowledgment.
pub fn decode_ack_cbor(bytes: &[u8]) -> Result<AckV1, CodecError> {
    let ack: AckV1 =
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    ack.validate()?;
    Ok(ack)
}
