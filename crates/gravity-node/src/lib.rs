//! Gravity cache node.
//!
//! A node subscribes to every key on the bus, applies each operation envelope
//! to its local store and replies with exactly one acknowledgment.

pub mod config;
pub mod handler;
pub mod service;
pub mod store;

pub use config::NodeConfig;
pub use handler::handle_envelope;
pub use service::{NodeError, NodeHandle, NodeService, NodeStatsSnapshot};
pub use store::{LocalStore, LruStore, LruStoreConfig, StoreError};
