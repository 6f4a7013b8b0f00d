//! Core Gravity primitives shared across crates.
//!
//! Includes keys, subjects and wildcard matching, node identities, the bus
//! message type, and base errors.

pub mod error;
pub mod hash;
pub mod message;
pub mod subject;
pub mod types;

pub use error::GravityError;
pub use message::{BusMessage, OP_HEADER};
pub use types::{Key, NodeId, OperationKind, MAX_KEY_LEN};
