//! In-memory broker for tests/dev.
//!
//! Implements `BrokerChannel` with the AMQP semantics the core depends on:
//! topic routing, durable-attribute equivalence checks on redeclare,
//! per-consumer prefetch, manual ack/reject and redelivery on requeue.
//!
//! - No IO
//! - Single channel shared by every clone
//! - Messages are not persisted; `persistent` is only recorded

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::{
    BrokerChannel, BrokerConnector, Delivery, ExchangeKind, ExchangeSpec, OutboundMessage,
    QueueSpec, Subscription,
};
use crate::error::{BrokerError, BrokerResult};
use crate::topology::topic_matches;

/// A channel operation as observed by the in-memory broker, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCall {
    DeclareExchange { exchange: String, kind: ExchangeKind, durable: bool },
    DeclareQueue { queue: String, durable: bool },
    BindQueue { queue: String, exchange: String, pattern: String },
    SetPrefetch(u16),
    Publish { exchange: String, routing_key: String },
    Consume { queue: String, consumer_tag: String },
    Cancel(String),
    Ack(u64),
    Reject { delivery_tag: u64, requeue: bool },
}

#[derive(Debug, Clone)]
struct StoredMessage {
    exchange: String,
    routing_key: String,
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct ActiveConsumer {
    tag: String,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Debug)]
struct QueueState {
    spec: QueueSpec,
    ready: VecDeque<StoredMessage>,
    consumer: Option<ActiveConsumer>,
}

#[derive(Debug)]
struct Unacked {
    queue: String,
    consumer_tag: String,
    message: StoredMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    queue: String,
    exchange: String,
    pattern: String,
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashMap<String, ExchangeSpec>,
    queues: BTreeMap<String, QueueState>,
    bindings: Vec<Binding>,
    prefetch: u16,
    next_tag: u64,
    unacked: BTreeMap<u64, Unacked>,
    published: Vec<(String, OutboundMessage)>,
    acked: Vec<u64>,
    rejected: Vec<(u64, bool)>,
    calls: Vec<ChannelCall>,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed {
            return Err(BrokerError::channel("channel is closed"));
        }
        Ok(())
    }

    fn route(&self, exchange: &ExchangeSpec, routing_key: &str) -> Vec<String> {
        let mut targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|b| b.exchange == exchange.name)
            .filter(|b| match exchange.kind {
                ExchangeKind::Topic => topic_matches(&b.pattern, routing_key),
                ExchangeKind::Direct => b.pattern == routing_key,
                ExchangeKind::Fanout => true,
                // Header matching is not modelled.
                ExchangeKind::Headers => false,
            })
            .map(|b| b.queue.clone())
            .collect();
        // A queue receives one copy no matter how many bindings match.
        targets.sort();
        targets.dedup();
        targets
    }

    fn unacked_for(&self, consumer_tag: &str) -> usize {
        self.unacked
            .values()
            .filter(|u| u.consumer_tag == consumer_tag)
            .count()
    }

    /// Push ready messages to consumers until each hits its prefetch limit.
    fn pump(&mut self) {
        let limit = usize::from(self.prefetch);
        let names: Vec<String> = self.queues.keys().cloned().collect();

        for name in names {
            loop {
                let Some(queue) = self.queues.get(&name) else { break };
                let Some(consumer) = queue.consumer.as_ref() else { break };
                if queue.ready.is_empty() {
                    break;
                }
                if limit > 0 && self.unacked_for(&consumer.tag) >= limit {
                    break;
                }

                let tag = self.next_tag + 1;
                let Some(queue) = self.queues.get_mut(&name) else { break };
                let Some(message) = queue.ready.pop_front() else { break };
                let Some(consumer) = queue.consumer.as_ref() else { break };

                let delivery = Delivery {
                    delivery_tag: tag,
                    exchange: message.exchange.clone(),
                    routing_key: message.routing_key.clone(),
                    body: message.body.clone(),
                    redelivered: message.redelivered,
                };

                if consumer.sender.send(delivery).is_err() {
                    // Subscription dropped: behave like a cancelled consumer.
                    queue.ready.push_front(message);
                    queue.consumer = None;
                    break;
                }

                let consumer_tag = consumer.tag.clone();
                self.next_tag = tag;
                self.unacked.insert(
                    tag,
                    Unacked {
                        queue: name.clone(),
                        consumer_tag,
                        message,
                    },
                );
            }
        }
    }
}

/// Shared in-memory broker. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a raw body directly onto `queue`, bypassing exchanges.
    pub fn inject(&self, queue: &str, body: impl Into<Vec<u8>>) -> BrokerResult<()> {
        let mut state = self.lock();
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::channel(format!("no queue '{queue}'")))?;
        q.ready.push_back(StoredMessage {
            exchange: String::new(),
            routing_key: queue.to_string(),
            body: body.into(),
            redelivered: false,
        });
        state.pump();
        Ok(())
    }

    /// Close the channel: every subscription ends and later operations fail.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        for queue in state.queues.values_mut() {
            queue.consumer = None;
        }
    }

    pub fn exchange(&self, name: &str) -> Option<ExchangeSpec> {
        self.lock().exchanges.get(name).cloned()
    }

    pub fn queue(&self, name: &str) -> Option<QueueSpec> {
        self.lock().queues.get(name).map(|q| q.spec.clone())
    }

    /// Messages waiting in `queue` that have not been delivered.
    pub fn ready_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    pub fn unacked_count(&self) -> usize {
        self.lock().unacked.len()
    }

    pub fn has_consumer(&self, queue: &str) -> bool {
        self.lock()
            .queues
            .get(queue)
            .is_some_and(|q| q.consumer.is_some())
    }

    pub fn prefetch(&self) -> u16 {
        self.lock().prefetch
    }

    /// Every accepted publish as `(exchange, message)`, routed or not.
    pub fn published(&self) -> Vec<(String, OutboundMessage)> {
        self.lock().published.clone()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.lock().acked.clone()
    }

    /// Rejected deliveries as `(delivery_tag, requeue)`.
    pub fn rejected(&self) -> Vec<(u64, bool)> {
        self.lock().rejected.clone()
    }

    pub fn calls(&self) -> Vec<ChannelCall> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl BrokerChannel for InMemoryBroker {
    async fn declare_exchange(&self, exchange: &ExchangeSpec) -> BrokerResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::DeclareExchange {
            exchange: exchange.name.clone(),
            kind: exchange.kind,
            durable: exchange.durable,
        });

        match state.exchanges.get(&exchange.name) {
            Some(existing) if existing != exchange => Err(BrokerError::topology(format!(
                "inequivalent arguments for exchange '{}': existing {} durable={}, requested {} durable={}",
                exchange.name,
                existing.kind.as_str(),
                existing.durable,
                exchange.kind.as_str(),
                exchange.durable,
            ))),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(exchange.name.clone(), exchange.clone());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, queue: &QueueSpec) -> BrokerResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::DeclareQueue {
            queue: queue.name.clone(),
            durable: queue.durable,
        });

        match state.queues.get(&queue.name) {
            Some(existing) if existing.spec != *queue => Err(BrokerError::topology(format!(
                "inequivalent arguments for queue '{}': existing durable={}, requested durable={}",
                queue.name, existing.spec.durable, queue.durable,
            ))),
            Some(_) => Ok(()),
            None => {
                state.queues.insert(
                    queue.name.clone(),
                    QueueState {
                        spec: queue.clone(),
                        ready: VecDeque::new(),
                        consumer: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> BrokerResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::BindQueue {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            pattern: pattern.to_string(),
        });

        if !state.queues.contains_key(queue) {
            return Err(BrokerError::topology(format!("no queue '{queue}'")));
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::topology(format!("no exchange '{exchange}'")));
        }

        let binding = Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            pattern: pattern.to_string(),
        };
        if !state.bindings.contains(&binding) {
            state.bindings.push(binding);
        }
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> BrokerResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::SetPrefetch(count));
        state.prefetch = count;
        state.pump();
        Ok(())
    }

    async fn publish(&self, exchange: &str, message: OutboundMessage) -> BrokerResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::Publish {
            exchange: exchange.to_string(),
            routing_key: message.routing_key.clone(),
        });

        let spec = state
            .exchanges
            .get(exchange)
            .cloned()
            .ok_or_else(|| BrokerError::channel(format!("no exchange '{exchange}'")))?;

        for queue in state.route(&spec, &message.routing_key) {
            if let Some(q) = state.queues.get_mut(&queue) {
                q.ready.push_back(StoredMessage {
                    exchange: exchange.to_string(),
                    routing_key: message.routing_key.clone(),
                    body: message.body.clone(),
                    redelivered: false,
                });
            }
        }

        state.published.push((exchange.to_string(), message));
        state.pump();
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<Subscription> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::Consume {
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
        });

        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::channel(format!("no queue '{queue}'")))?;
        if q.consumer.is_some() {
            return Err(BrokerError::channel(format!(
                "queue '{queue}' already has a consumer"
            )));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        q.consumer = Some(ActiveConsumer {
            tag: consumer_tag.to_string(),
            sender,
        });
        state.pump();
        Ok(Subscription::new(consumer_tag, receiver))
    }

    async fn cancel(&self, consumer_tag: &str) -> BrokerResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::Cancel(consumer_tag.to_string()));

        for queue in state.queues.values_mut() {
            if queue.consumer.as_ref().is_some_and(|c| c.tag == consumer_tag) {
                queue.consumer = None;
            }
        }
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::Ack(delivery_tag));

        if state.unacked.remove(&delivery_tag).is_none() {
            return Err(BrokerError::channel(format!(
                "unknown delivery tag {delivery_tag}"
            )));
        }
        state.acked.push(delivery_tag);
        state.pump();
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> BrokerResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.calls.push(ChannelCall::Reject {
            delivery_tag,
            requeue,
        });

        let Some(unacked) = state.unacked.remove(&delivery_tag) else {
            return Err(BrokerError::channel(format!(
                "unknown delivery tag {delivery_tag}"
            )));
        };
        state.rejected.push((delivery_tag, requeue));

        if requeue {
            if let Some(q) = state.queues.get_mut(&unacked.queue) {
                let mut message = unacked.message;
                message.redelivered = true;
                q.ready.push_front(message);
            }
        }
        state.pump();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.lock().closed
    }
}

/// Connector that hands out an `InMemoryBroker` (or refuses to connect).
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    broker: Option<InMemoryBroker>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl InMemoryConnector {
    pub fn new(broker: InMemoryBroker) -> Self {
        Self {
            broker: Some(broker),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A connector whose broker can never be reached.
    pub fn unreachable() -> Self {
        Self {
            broker: None,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URLs passed to `open`, in order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BrokerConnector for InMemoryConnector {
    async fn open(&self, url: &str) -> BrokerResult<Arc<dyn BrokerChannel>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        match &self.broker {
            Some(broker) => Ok(Arc::new(broker.clone())),
            None => Err(BrokerError::connection(format!("connection refused: {url}"))),
        }
    }
}
