//! In-process Gravity clusters for end-to-end tests.

pub mod cluster;
pub mod scenarios;

pub use cluster::Cluster;
pub use scenarios::QuorumScenario;
