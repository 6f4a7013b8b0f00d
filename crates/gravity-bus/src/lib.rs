//! Bus abstractions for Gravity.
//!
//! Nodes and clients only depend on the publish/subscribe contract defined in
//! this crate; concrete transports live in their own crates.

pub mod bus;
pub mod memory;

pub use bus::{Bus, BusHealthSnapshot, Subscription};
pub use memory::{InMemoryBus, InMemoryBusConfig, InMemoryBusError};
