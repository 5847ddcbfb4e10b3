//! Broker mediation layer.
//!
//! Connection lifecycle, publishing and acknowledgement-based consumption on
//! top of the `BrokerChannel` seam. Concrete transports live in
//! `jobwire-infra`; `in_memory` provides a fake with the same semantics.

pub mod channel;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod handler;
pub mod in_memory;
pub mod publisher;
pub mod topology;


pub use channel::{
    BrokerChannel, BrokerConnector, Delivery, ExchangeKind, ExchangeSpec, OutboundMessage,
    QueueSpec, Subscription,
};
pub use connection::{ConnectionManager, ConnectionState};
pub use consumer::{Consumer, ConsumerConfig, ConsumerHandle, ConsumerStats, DeliveryOutcome};
pub use error::{BrokerError, BrokerResult};
pub use handler::JobHandler;
pub use in_memory::{InMemoryBroker, InMemoryConnector};
pub use publisher::Publisher;
