use std::sync::Arc;

use anyhow::Context;

use jobwire_broker::{ConnectionManager, Consumer, ConsumerConfig};
use jobwire_infra::{AmqpConnector, Settings};
use jobwire_worker::JobProcessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobwire_observability::init("jobwire-worker");

    let settings = Settings::from_env()?;

    let connection = Arc::new(ConnectionManager::new(AmqpConnector::new("jobwire-worker")));
    connection
        .initialize(&settings.rabbit_url)
        .await
        .context("broker initialization failed")?;

    let consumer = Consumer::new(
        connection,
        ConsumerConfig::default().with_prefetch(settings.prefetch),
    );
    let handle = consumer
        .start(&settings.worker_queue, JobProcessor::new(settings.worker_work))
        .await
        .with_context(|| format!("failed to consume '{}'", settings.worker_queue))?;

    tracing::info!(
        queue = %settings.worker_queue,
        prefetch = settings.prefetch,
        consumer_tag = %handle.consumer_tag(),
        "worker started"
    );

    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    jobwire_worker::supervise(handle, ctrl_c).await
}
