//! Gravity wire codec primitives.
//!
//! Defines the acknowledgment payload, the operation envelope mapping onto bus
//! messages, and the CBOR frames spoken between bus clients and the broker.

pub mod ack;
pub mod envelope;
pub mod error;
pub mod frame;
