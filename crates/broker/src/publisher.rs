//! Job publisher.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use jobwire_core::JobPayload;

use crate::channel::OutboundMessage;
use crate::connection::ConnectionManager;
use crate::error::{BrokerError, BrokerResult};
use crate::topology::{JOB_CREATE_ROUTING_KEY, JOBS_EXCHANGE};

/// Publishes JSON messages to the `jobs` exchange.
///
/// Every message is marked persistent. `publish` returns once the channel has
/// accepted the frame; there is no broker-side confirmation, so a message
/// routed to no queue is silently dropped by the broker.
#[derive(Debug, Clone)]
pub struct Publisher {
    connection: Arc<ConnectionManager>,
}

impl Publisher {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    /// Serialize `payload` as JSON and publish it under `routing_key`.
    pub async fn publish<T>(&self, routing_key: &str, payload: &T) -> BrokerResult<()>
    where
        T: Serialize + ?Sized,
    {
        let channel = self.connection.channel()?;
        let body = serde_json::to_vec(payload).map_err(|e| BrokerError::Serialize(e.to_string()))?;
        let bytes = body.len();

        channel
            .publish(JOBS_EXCHANGE, OutboundMessage::persistent(routing_key, body))
            .await?;

        debug!(exchange = JOBS_EXCHANGE, routing_key, bytes, "published message");
        Ok(())
    }

    /// Publish a validated job under `job.create`.
    pub async fn publish_job(&self, job: &JobPayload) -> BrokerResult<()> {
        self.publish(JOB_CREATE_ROUTING_KEY, job).await?;
        debug!(job_id = %job.job_id(), "job queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::{InMemoryBroker, InMemoryConnector};
    use serde_json::json;
    use std::collections::BTreeMap;

    async fn ready(broker: &InMemoryBroker) -> Publisher {
        let manager = Arc::new(ConnectionManager::new(InMemoryConnector::new(broker.clone())));
        manager.initialize("amqp://test").await.unwrap();
        Publisher::new(manager)
    }

    #[tokio::test]
    async fn publish_sends_persistent_json_to_jobs_exchange() {
        let broker = InMemoryBroker::new();
        let publisher = ready(&broker).await;
        let payload = json!({ "jobId": "j1", "userId": "u1", "data": {} });

        publisher.publish("job.create", &payload).await.unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        let (exchange, message) = &published[0];
        assert_eq!(exchange, "jobs");
        assert_eq!(message.routing_key, "job.create");
        assert!(message.persistent);
        assert_eq!(message.body, serde_json::to_vec(&payload).unwrap());
    }

    #[tokio::test]
    async fn publish_without_initialize_fails() {
        let manager = Arc::new(ConnectionManager::new(InMemoryConnector::new(InMemoryBroker::new())));
        let publisher = Publisher::new(manager);

        let err = publisher.publish("job.create", &json!({})).await.unwrap_err();
        assert_eq!(err, BrokerError::NotInitialized);
    }

    #[tokio::test]
    async fn unserializable_payload_is_reported() {
        let broker = InMemoryBroker::new();
        let publisher = ready(&broker).await;

        // JSON object keys must be strings.
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1);

        let err = publisher.publish("job.create", &bad).await.unwrap_err();
        assert!(matches!(err, BrokerError::Serialize(_)));
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn unroutable_publish_is_not_an_error() {
        let broker = InMemoryBroker::new();
        let publisher = ready(&broker).await;

        publisher.publish("nobody.listens", &json!({ "x": 1 })).await.unwrap();
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn publish_job_uses_create_routing_key() {
        let broker = InMemoryBroker::new();
        let publisher = ready(&broker).await;
        let job = JobPayload::new("j1".into(), "u1".parse().unwrap(), json!({ "n": 1 }));

        publisher.publish_job(&job).await.unwrap();

        let (_, message) = &broker.published()[0];
        assert_eq!(message.routing_key, "job.create");
        let decoded: serde_json::Value = serde_json::from_slice(&message.body).unwrap();
        assert_eq!(decoded, json!({ "jobId": "j1", "userId": "u1", "data": { "n": 1 } }));
    }
}
