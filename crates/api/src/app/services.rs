//! Broker wiring shared by the producer API and the monitor.

use std::sync::Arc;

use tracing::info;

use jobwire_broker::{BrokerConnector, BrokerError, ConnectionManager, ConnectionState, Publisher};
use jobwire_core::{DomainError, JobId, JobRequest};

/// Failure to accept a job submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error(transparent)]
    Publish(#[from] BrokerError),
}

/// The connection owned by this process plus the publisher borrowing it.
#[derive(Debug, Clone)]
pub struct BrokerServices {
    connection: Arc<ConnectionManager>,
    publisher: Publisher,
}

impl BrokerServices {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        let publisher = Publisher::new(connection.clone());
        Self {
            connection,
            publisher,
        }
    }

    /// Connect through `connector` and declare the topology. Fails fast.
    pub async fn connect(
        connector: impl BrokerConnector + 'static,
        url: &str,
    ) -> Result<Self, BrokerError> {
        let connection = Arc::new(ConnectionManager::new(connector));
        connection.initialize(url).await?;
        Ok(Self::new(connection))
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Validate a producer request and publish it under `job.create`.
    ///
    /// Nothing is published when validation fails.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, SubmitError> {
        let job = request.into_payload()?;
        self.publisher.publish_job(&job).await?;
        info!(job_id = %job.job_id(), user_id = %job.user_id(), "job queued");
        Ok(job.job_id().clone())
    }
}
