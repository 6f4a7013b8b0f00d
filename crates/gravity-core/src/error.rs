use thiserror::Error;

/// Shared lightweight error type for core primitive operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GravityError {
    /// Key is empty, too long, or contains reserved subject characters.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),
    /// Subject or subscription pattern is malformed.
    #[error("invalid subject: {0}")]
    InvalidSubject(&'static str),
    /// Node identity text could not be parsed.
    #[error("invalid node id: {0}")]
    InvalidNodeId(&'static str),
}
