use gravity_codec::ack::AckStatus;
use gravity_core::{GravityError, NodeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    InvalidKey(#[from] GravityError),
    #[error("reply subscribe failed: {0}")]
    Subscribe(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("reply subscription closed after {acknowledged} acknowledgments")]
    Closed { acknowledged: usize },
    #[error("timed out with {acknowledged}/{target} acknowledgments")]
    Timeout { acknowledged: usize, target: usize },
    #[error("cancelled after {acknowledged} acknowledgments")]
    Cancelled { acknowledged: usize },
    /// The quorum answered but `rejected` of the counted nodes did not apply
    /// the write. `acks` holds every counted node's status.
    #[error("{rejected} of {acknowledged} acknowledging nodes refused the write")]
    Rejected {
        acknowledged: usize,
        rejected: usize,
        acks: Vec<(NodeId, AckStatus)>,
    },
}

impl ClientError {
    /// Acknowledgments observed before the call failed, when known.
    pub fn acknowledged(&self) -> Option<usize> {
        match self {
            ClientError::Closed { acknowledged }
            | ClientError::Timeout { acknowledged, .. }
            | ClientError::Cancelled { acknowledged }
            | ClientError::Rejected { acknowledged, .. } => Some(*acknowledged),
            _ => None,
        }
    }
}
