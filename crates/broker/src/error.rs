//! Broker-layer error model.

use thiserror::Error;

/// Result type used across the broker layer.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Failures surfaced by connection, channel, publish and consumer setup.
///
/// Per-delivery failures (malformed body, handler error) are never surfaced
/// through this type; the consumer settles them by rejecting the delivery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker was unreachable or rejected the startup topology.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// The channel was requested before `ConnectionManager::initialize` completed.
    #[error("broker connection not initialized")]
    NotInitialized,

    /// `initialize` was called on a manager that already owns a channel.
    #[error("broker connection already initialized")]
    AlreadyInitialized,

    /// A queue/exchange/binding declaration was refused by the broker.
    #[error("topology declaration rejected: {0}")]
    Topology(String),

    /// A channel-level operation failed (publish, ack, consume, ...).
    #[error("channel operation failed: {0}")]
    Channel(String),

    /// The payload could not be encoded as JSON.
    #[error("payload serialization failed: {0}")]
    Serialize(String),

    /// Consumer or publisher configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BrokerError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn topology(msg: impl Into<String>) -> Self {
        Self::Topology(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }
}
