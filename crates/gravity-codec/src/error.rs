use thiserror::Error;

/// Errors returned by ack/frame codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// CBOR serialization failure.
    #[error("encode error: {0}")]
    Encode(String),
    /// CBOR deserialization failure.
    #[error("decode error: {0}")]
    Decode(String),
    /// Acknowledgment schema validation failure.
    #[error("invalid ack: {0}")]
    InvalidAck(&'static str),
    /// Bus frame schema validation failure.
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),
}

#[cfg(test)]
mod tests {
    use super::CodecError;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(
            CodecError::InvalidAck("unsupported ack version").to_string(),
            "invalid ack: unsupported ack version"
        );
        assert_eq!(
            CodecError::Decode("eof".to_string()).to_string(),
            "decode error: eof"
        );
    }
}
