use std::sync::Arc;

use anyhow::Context;

use jobwire_api::app::{self, BrokerServices};
use jobwire_infra::{AmqpConnector, Settings, StatsAggregator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobwire_observability::init("jobwire-monitor");

    let settings = Settings::from_env()?;

    let services = BrokerServices::connect(AmqpConnector::new("jobwire-monitor"), &settings.rabbit_url)
        .await
        .context("broker initialization failed")?;

    tracing::info!(
        management = %settings.management.base_url,
        queues = ?settings.monitor_queues,
        "polling broker management API"
    );
    let stats = StatsAggregator::new(settings.management.clone(), settings.monitor_queues.clone())
        .context("invalid management API settings")?;

    let app = app::build_monitor_app(Arc::new(services), Arc::new(stats));

    let listener = tokio::net::TcpListener::bind(settings.monitor_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.monitor_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(app::shutdown_signal())
        .await?;
    Ok(())
}
