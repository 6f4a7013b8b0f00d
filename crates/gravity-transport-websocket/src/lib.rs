//! WebSocket bus for Gravity.
//!
//! `WebSocketBroker` accepts connections and routes published messages to
//! every matching subscription; `WebSocketBus` is the client side and
//! implements `gravity_bus::Bus` with reconnect/backoff.

mod broker;
mod client;

pub use broker::{BrokerMetrics, WebSocketBroker, WebSocketBrokerConfig};
pub use client::{WebSocketBus, WebSocketBusConfig};

use gravity_codec::error::CodecError;
use gravity_core::GravityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebSocketBusError {
    #[error("bus is closed")]
    Closed,
    #[error("not connected to broker")]
    NotConnected,
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("broker bind failed: {0}")]
    BindFailed(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    InvalidSubject(#[from] GravityError),
}
