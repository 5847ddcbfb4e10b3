//! Background job processing.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

use jobwire_broker::{ConsumerHandle, JobHandler};

/// Simulated processing time per job.
pub const DEFAULT_WORK_DURATION: Duration = Duration::from_secs(1);

/// Handler run by the worker for every job delivery.
///
/// Logs the job and sleeps for `work`; it never fails, so every well-formed
/// delivery ends up acknowledged.
#[derive(Debug, Clone)]
pub struct JobProcessor {
    work: Duration,
}

impl JobProcessor {
    pub fn new(work: Duration) -> Self {
        Self { work }
    }

    pub fn work(&self) -> Duration {
        self.work
    }
}

impl Default for JobProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_WORK_DURATION)
    }
}

#[async_trait]
impl JobHandler for JobProcessor {
    async fn handle(&self, data: Value) -> anyhow::Result<()> {
        let job_id = data.get("jobId").and_then(Value::as_str).unwrap_or("unknown");
        let user_id = data.get("userId").and_then(Value::as_str).unwrap_or("unknown");
        info!(job_id, user_id, "processing job");

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        info!(job_id, "job done");
        Ok(())
    }
}

/// Run the consumer until `shutdown` resolves or the consumer stops on its
/// own.
///
/// A requested shutdown drains in-flight jobs and returns `Ok`. A consumer
/// that stops unasked (channel closed, consumer cancelled by the broker) is
/// an error so the process exits non-zero and gets restarted.
pub async fn supervise<F>(handle: ConsumerHandle, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let requested = tokio::select! {
        _ = shutdown => true,
        _ = handle.stopped() => false,
    };

    let stats = handle.stats();
    if requested {
        info!(
            received = stats.received,
            acked = stats.acked,
            in_flight = stats.in_flight,
            "shutdown requested, draining"
        );
        handle.shutdown().await;
        info!("worker stopped");
        return Ok(());
    }

    let queue = handle.queue().to_string();
    error!(queue = %queue, received = stats.received, acked = stats.acked, "delivery stream ended");
    handle.join().await;
    anyhow::bail!("delivery stream for queue '{queue}' ended unexpectedly")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use jobwire_broker::{
        ConnectionManager, Consumer, ConsumerConfig, InMemoryBroker, InMemoryConnector, Publisher,
    };

    use super::*;

    async fn ready(broker: &InMemoryBroker) -> Arc<ConnectionManager> {
        let connection = Arc::new(ConnectionManager::new(InMemoryConnector::new(broker.clone())));
        connection.initialize("amqp://test").await.unwrap();
        connection
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn processor_accepts_any_json() {
        let processor = JobProcessor::new(Duration::ZERO);
        processor
            .handle(json!({ "jobId": "j1", "userId": "u1", "data": {} }))
            .await
            .unwrap();
        processor.handle(json!("not an object")).await.unwrap();
    }

    #[tokio::test]
    async fn processor_takes_the_configured_time() {
        let processor = JobProcessor::new(Duration::from_millis(50));
        let started = std::time::Instant::now();

        processor.handle(json!({ "jobId": "j1" })).await.unwrap();

        assert!(started.elapsed() >= processor.work());
        assert_eq!(JobProcessor::default().work(), DEFAULT_WORK_DURATION);
    }

    #[tokio::test]
    async fn supervise_fails_when_the_channel_closes() {
        let broker = InMemoryBroker::new();
        let handle = Consumer::new(ready(&broker).await, ConsumerConfig::default())
            .start("job_queue", JobProcessor::new(Duration::ZERO))
            .await
            .unwrap();

        let supervised = tokio::spawn(supervise(handle, std::future::pending()));
        broker.close();

        let err = tokio::time::timeout(Duration::from_secs(2), supervised)
            .await
            .expect("supervise should return once the stream ends")
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("job_queue"), "{err}");
    }

    #[tokio::test]
    async fn supervise_drains_on_requested_shutdown() {
        let broker = InMemoryBroker::new();
        let handle = Consumer::new(ready(&broker).await, ConsumerConfig::default())
            .start("job_queue", JobProcessor::new(Duration::ZERO))
            .await
            .unwrap();

        supervise(handle, async {}).await.unwrap();

        assert!(!broker.has_consumer("job_queue"));
    }

    #[tokio::test]
    async fn published_jobs_are_processed_and_acked() {
        let broker = InMemoryBroker::new();
        let connection = ready(&broker).await;

        let consumer = Consumer::new(connection.clone(), ConsumerConfig::default().with_prefetch(2));
        let handle = consumer
            .start("job_queue", JobProcessor::new(Duration::from_millis(10)))
            .await
            .unwrap();

        let publisher = Publisher::new(connection);
        for i in 0..3 {
            publisher
                .publish("job.create", &json!({ "jobId": format!("j{i}"), "userId": "u1", "data": {} }))
                .await
                .unwrap();
        }

        wait_for(|| broker.acked().len() == 3).await;
        assert!(broker.rejected().is_empty());

        handle.shutdown().await;
        assert!(!broker.has_consumer("job_queue"));
    }
}
