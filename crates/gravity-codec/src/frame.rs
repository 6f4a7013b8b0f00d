use gravity_core::subject::{validate_pattern, validate_subject};
use gravity_core::BusMessage;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Frames exchanged between a bus client and the broker over one connection.
///
/// Subscription ids are chosen by the client and scoped to its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusFrame {
    /// Client -> broker: start receiving messages matching `pattern`.
    Subscribe { sid: u64, pattern: String },
    /// Client -> broker: stop delivering to `sid`.
    Unsubscribe { sid: u64 },
    /// Client -> broker: fan `message` out to every matching subscription.
    Publish { message: BusMessage },
    /// Broker -> client: `message` matched subscription `sid`.
    Deliver { sid: u64, message: BusMessage },
}

impl BusFrame {
    /// Validates subjects and patterns carried by the frame.
    pub fn validate(&self) -> Result<(), CodecError> {
        match self {
            BusFrame::Subscribe { pattern, .. } => validate_pattern(pattern)
                .map_err(|_| CodecError::InvalidFrame("bad subscription pattern")),
            BusFrame::Unsubscribe { .. } => Ok(()),
            BusFrame::Publish { message } | BusFrame::Deliver { message, .. } => {
                validate_subject(&message.subject)
                    .map_err(|_| CodecError::InvalidFrame("bad message subject"))?;
                if let Some(reply_to) = &message.reply_to {
                    validate_subject(reply_to)
                        .map_err(|_| CodecError::InvalidFrame("bad reply subject"))?;
                }
                Ok(())
            }
        }
    }
}

/// Encodes a frame as CBOR after validation.
pub fn encode_frame_cbor(frame: &BusFrame) -> Result<Vec<u8>, CodecError> {
    frame.validate()?;
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(frame, &mut bytes)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes and validates a CBOR frame.
pub fn decode_frame_cbor(bytes: &[u8]) -> Result<BusFrame, CodecError> {
    let frame: BusFrame =
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    frame.validate()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::{decode_frame_cbor, encode_frame_cbor, BusFrame};
    use gravity_core::{BusMessage, OP_HEADER};

    #[test]
    fn publish_frame_keeps_headers_and_reply() {
        let frame = BusFrame::Publish {
            message: BusMessage::new("k", b"v".to_vec())
                .with_header(OP_HEADER, "set")
                .with_reply_to("_INBOX.ab"),
        };
        let decoded = decode_frame_cbor(&encode_frame_cbor(&frame).expect("encode"))
            .expect("decode should succeed");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn subscribe_frame_rejects_malformed_pattern() {
        let frame = BusFrame::Subscribe {
            sid: 1,
            pattern: ">.a".to_string(),
        };
        let err = encode_frame_cbor(&frame).expect_err("bad pattern should fail");
        assert!(err.to_string().contains("bad subscription pattern"));
    }

    #[test]
    fn publish_frame_rejects_wildcard_subject() {
        let frame = BusFrame::Publish {
            message: BusMessage::new("*", Vec::new()),
        };
        assert!(encode_frame_cbor(&frame).is_err());
    }

    #[test]
    fn deliver_frame_rejects_bad_reply_subject() {
        let frame = BusFrame::Deliver {
            sid: 3,
            message: BusMessage::new("k", Vec::new()).with_reply_to("a..b"),
        };
        assert!(frame.validate().is_err());
    }
}
