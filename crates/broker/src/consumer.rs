//! Job consumer with acknowledgement-based reliability.
//!
//! `Consumer::start` declares the queue, binds it to the `jobs` exchange,
//! applies the prefetch limit and then dispatches every delivery to a
//! `JobHandler` on its own task. Each delivery is settled exactly once:
//!
//! ```text
//! Received ─┬─ body is not JSON ─────────────→ Rejected (no requeue)
//!           └─ handler ─┬─ Ok ───────────────→ Acked
//!                       └─ Err / panic ──────→ Rejected (no requeue)
//! ```
//!
//! Nothing is ever requeued; rejected messages go to a dead-letter queue if
//! the broker topology routes them there, and are dropped otherwise.
//!
//! Handler concurrency is bounded twice: by the broker (prefetch) and by a
//! semaphore of the same size held for the whole lifetime of each delivery.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::channel::{BrokerChannel, Delivery, QueueSpec, Subscription};
use crate::connection::ConnectionManager;
use crate::error::{BrokerError, BrokerResult};
use crate::handler::JobHandler;
use crate::topology::{DEFAULT_PREFETCH, JOB_BINDING_PATTERN, JOBS_EXCHANGE};

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Exchange the queue is bound to.
    pub exchange: String,
    /// Routing pattern used for the binding.
    pub binding_pattern: String,
    /// Maximum unacknowledged deliveries, and maximum concurrent handlers.
    pub prefetch: u16,
    /// Tag identifying this consumer on the channel.
    pub consumer_tag: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            exchange: JOBS_EXCHANGE.to_string(),
            binding_pattern: JOB_BINDING_PATTERN.to_string(),
            prefetch: DEFAULT_PREFETCH,
            consumer_tag: format!("jobwire-{}", Uuid::now_v7()),
        }
    }
}

impl ConsumerConfig {
    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    pub fn with_binding_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.binding_pattern = pattern.into();
        self
    }
}

/// How a single delivery was settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Acked,
    RejectedMalformed,
    RejectedFailed,
}

/// Consumer runtime statistics.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub received: u64,
    pub acked: u64,
    pub rejected_malformed: u64,
    pub rejected_failed: u64,
    pub in_flight: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    acked: AtomicU64,
    rejected_malformed: AtomicU64,
    rejected_failed: AtomicU64,
    in_flight: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            rejected_malformed: self.rejected_malformed.load(Ordering::Relaxed),
            rejected_failed: self.rejected_failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Acked => &self.acked,
            DeliveryOutcome::RejectedMalformed => &self.rejected_malformed,
            DeliveryOutcome::RejectedFailed => &self.rejected_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Starts consumers on the shared channel.
#[derive(Debug, Clone)]
pub struct Consumer {
    connection: Arc<ConnectionManager>,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(connection: Arc<ConnectionManager>, config: ConsumerConfig) -> Self {
        Self { connection, config }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Declare `queue` (durable), bind it, set prefetch, and start dispatching
    /// deliveries to `handler` in the background.
    ///
    /// Setup errors are returned before any delivery is accepted. The returned
    /// handle does not stop the consumer when dropped.
    #[instrument(skip(self, handler), fields(consumer_tag = %self.config.consumer_tag), err)]
    pub async fn start<H>(&self, queue: &str, handler: H) -> BrokerResult<ConsumerHandle>
    where
        H: JobHandler,
    {
        let prefetch = self.config.prefetch;
        if prefetch == 0 {
            return Err(BrokerError::InvalidConfig(
                "prefetch must be at least 1".to_string(),
            ));
        }

        let channel = self.connection.channel()?;
        channel.declare_queue(&QueueSpec::durable(queue)).await?;
        channel
            .bind_queue(queue, &self.config.exchange, &self.config.binding_pattern)
            .await?;
        channel.set_prefetch(prefetch).await?;
        let subscription = channel.consume(queue, &self.config.consumer_tag).await?;

        info!(
            queue,
            exchange = %self.config.exchange,
            pattern = %self.config.binding_pattern,
            prefetch,
            "consumer started"
        );

        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(Notify::new());
        let shutdown_rx = shutdown.clone();
        let dispatcher = Arc::new(Dispatcher {
            channel,
            handler,
            gate: Arc::new(Semaphore::new(usize::from(prefetch))),
            prefetch,
            counters: counters.clone(),
            queue: queue.to_string(),
            consumer_tag: self.config.consumer_tag.clone(),
        });

        let (stopped_tx, stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            dispatch_loop(dispatcher, subscription, shutdown_rx).await;
            let _ = stopped_tx.send(true);
        });

        Ok(ConsumerHandle {
            queue: queue.to_string(),
            consumer_tag: self.config.consumer_tag.clone(),
            shutdown,
            stopped,
            counters,
            task,
        })
    }
}

/// Handle to a running consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    queue: String,
    consumer_tag: String,
    shutdown: Arc<Notify>,
    stopped: watch::Receiver<bool>,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Resolves once the consumer has stopped for any reason: the delivery
    /// stream ended or `shutdown` was requested. The handle stays usable.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        // A dropped sender means the task is gone as well.
        let _ = stopped.wait_for(|done| *done).await;
    }

    /// Stop taking deliveries, cancel the broker-side consumer and wait for
    /// in-flight handlers to settle.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        self.join().await;
    }

    /// Wait until the delivery stream ends (channel closed or consumer
    /// cancelled) and every in-flight delivery has been settled.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            error!(queue = %self.queue, error = %err, "consumer task failed");
        }
    }
}

struct Dispatcher<H> {
    channel: Arc<dyn BrokerChannel>,
    handler: H,
    gate: Arc<Semaphore>,
    prefetch: u16,
    counters: Arc<Counters>,
    queue: String,
    consumer_tag: String,
}

impl<H: JobHandler> Dispatcher<H> {
    async fn process(&self, delivery: Delivery) -> DeliveryOutcome {
        let tag = delivery.delivery_tag;

        let outcome = match serde_json::from_slice::<Value>(&delivery.body) {
            Err(err) => {
                warn!(error = %err, bytes = delivery.body.len(), "rejecting malformed message");
                DeliveryOutcome::RejectedMalformed
            }
            Ok(data) => match AssertUnwindSafe(self.handler.handle(data)).catch_unwind().await {
                Ok(Ok(())) => DeliveryOutcome::Acked,
                Ok(Err(err)) => {
                    warn!(error = %format!("{err:#}"), "handler failed; rejecting message");
                    DeliveryOutcome::RejectedFailed
                }
                Err(panic) => {
                    warn!(panic = panic_message(panic.as_ref()), "handler panicked; rejecting message");
                    DeliveryOutcome::RejectedFailed
                }
            },
        };

        let settled = match outcome {
            DeliveryOutcome::Acked => self.channel.ack(tag).await,
            _ => self.channel.reject(tag, false).await,
        };
        match settled {
            Ok(()) => debug!(?outcome, "delivery settled"),
            Err(err) => error!(?outcome, error = %err, "failed to settle delivery"),
        }

        self.counters.record(outcome);
        outcome
    }
}

async fn dispatch_loop<H: JobHandler>(
    dispatcher: Arc<Dispatcher<H>>,
    mut subscription: Subscription,
    shutdown: Arc<Notify>,
) {
    loop {
        let permit = tokio::select! {
            _ = shutdown.notified() => break,
            permit = dispatcher.gate.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let delivery = tokio::select! {
            _ = shutdown.notified() => break,
            delivery = subscription.recv() => delivery,
        };

        // Channel closed or consumer cancelled: nothing to settle.
        let Some(delivery) = delivery else {
            debug!(queue = %dispatcher.queue, "delivery stream ended");
            break;
        };

        dispatcher.counters.received.fetch_add(1, Ordering::Relaxed);
        dispatcher.counters.in_flight.fetch_add(1, Ordering::Relaxed);

        let span = info_span!(
            "delivery",
            queue = %dispatcher.queue,
            delivery_tag = delivery.delivery_tag,
            routing_key = %delivery.routing_key,
            redelivered = delivery.redelivered,
        );
        let worker = dispatcher.clone();
        tokio::spawn(
            async move {
                worker.process(delivery).await;
                drop(permit);
            }
            .instrument(span),
        );
    }

    if let Err(err) = dispatcher.channel.cancel(&dispatcher.consumer_tag).await {
        debug!(consumer_tag = %dispatcher.consumer_tag, error = %err, "consumer cancel failed");
    }

    // Deliveries pushed before the cancel but never dispatched go back to the
    // queue; they would otherwise stay unacknowledged on the open channel.
    while let Some(delivery) = subscription.try_recv() {
        let tag = delivery.delivery_tag;
        match dispatcher.channel.reject(tag, true).await {
            Ok(()) => debug!(delivery_tag = tag, "requeued undispatched delivery"),
            Err(err) => warn!(delivery_tag = tag, error = %err, "failed to requeue undispatched delivery"),
        }
    }

    // Every in-flight delivery holds one permit until it is settled.
    let _ = dispatcher
        .gate
        .acquire_many(u32::from(dispatcher.prefetch))
        .await;

    info!(queue = %dispatcher.queue, stats = ?dispatcher.counters.snapshot(), "consumer stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
