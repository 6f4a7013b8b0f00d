//! Gravity client: publishes operation envelopes and waits for a quorum of
//! node acknowledgments on a per-call reply inbox.

pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;

pub use config::ClientConfig;
pub use correlator::ReplyCorrelator;
pub use dispatcher::{Client, WriteReceipt};
pub use error::ClientError;
