//! Broker channel abstraction (mechanics only).
//!
//! A `BrokerChannel` is the single logical session the process holds with the
//! message broker. Publisher and consumer borrow it per call through
//! `ConnectionManager::channel()`; neither closes nor replaces it.
//!
//! ## Delivery model
//!
//! - **Durable routing**: messages are published to an exchange under a routing
//!   key and routed to every queue whose binding pattern matches
//! - **Manual acknowledgement**: each delivery carries a tag and must be settled
//!   exactly once with `ack` or `reject`
//! - **Prefetch-bounded**: the broker stops pushing once `set_prefetch(n)`
//!   unacknowledged deliveries are outstanding on the channel
//! - **No ordering guarantees** across deliveries that are in flight concurrently
//!
//! Implementations must be safe for concurrent use by multiple logical senders;
//! serialisation of frames is the transport's job, not the caller's.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::BrokerResult;

/// Exchange routing type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
        }
    }
}

/// Exchange declaration attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

impl ExchangeSpec {
    pub fn durable(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: true,
        }
    }
}

/// Queue declaration attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
}

impl QueueSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
        }
    }
}

/// A message on its way to an exchange.
///
/// Job messages are always `persistent`, which is why
/// `OutboundMessage::persistent` is the only constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub persistent: bool,
}

impl OutboundMessage {
    pub fn persistent(routing_key: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
            persistent: true,
        }
    }
}

/// A message pushed to a consumer, awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to settle this delivery.
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Set when the broker has delivered this message before.
    pub redelivered: bool,
}

/// A stream of deliveries for one consumer.
///
/// `recv` yields `None` once the consumer has been cancelled or the channel is
/// closed; no further deliveries will arrive after that.
#[derive(Debug)]
pub struct Subscription {
    consumer_tag: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(consumer_tag: impl Into<String>, receiver: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            receiver,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Wait for the next delivery.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    /// Take a delivery if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }
}

/// The broker operations the core relies on.
///
/// `AmqpChannel` (in `jobwire-infra`) talks AMQP 0-9-1; `InMemoryBroker` is a
/// faithful in-process substitute for tests and local development.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange. Idempotent for identical attributes; refused with
    /// `BrokerError::Topology` when the exchange exists with different ones.
    async fn declare_exchange(&self, exchange: &ExchangeSpec) -> BrokerResult<()>;

    /// Declare a queue (same idempotency rules as exchanges).
    async fn declare_queue(&self, queue: &QueueSpec) -> BrokerResult<()>;

    /// Bind `queue` to `exchange` with a routing pattern.
    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> BrokerResult<()>;

    /// Limit unacknowledged deliveries outstanding on this channel.
    async fn set_prefetch(&self, count: u16) -> BrokerResult<()>;

    /// Publish one message. Returns once the local publish completes; no
    /// broker-side confirmation is awaited. Unroutable messages are dropped by
    /// the broker without error.
    async fn publish(&self, exchange: &str, message: OutboundMessage) -> BrokerResult<()>;

    /// Start consuming from `queue` with manual acknowledgement.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<Subscription>;

    /// Stop a consumer started with `consume`. Its subscription then ends.
    async fn cancel(&self, consumer_tag: &str) -> BrokerResult<()>;

    /// Positively acknowledge a delivery.
    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()>;

    /// Negatively acknowledge a delivery; `requeue = false` removes it from
    /// the queue (dead-lettered if the broker topology says so).
    async fn reject(&self, delivery_tag: u64, requeue: bool) -> BrokerResult<()>;

    /// `false` once the channel or its connection has closed. A closed
    /// channel never reopens.
    fn is_open(&self) -> bool;
}

/// Opens the process-wide channel.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connect to the broker at `url` and open one channel on the connection.
    async fn open(&self, url: &str) -> BrokerResult<Arc<dyn BrokerChannel>>;
}
