use std::sync::Arc;

use anyhow::Context;

use jobwire_api::app::{self, BrokerServices};
use jobwire_infra::{AmqpConnector, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobwire_observability::init("jobwire-api");

    let settings = Settings::from_env()?;

    let services = BrokerServices::connect(AmqpConnector::new("jobwire-api"), &settings.rabbit_url)
        .await
        .context("broker initialization failed")?;

    let app = app::build_producer_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(settings.api_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.api_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(app::shutdown_signal())
        .await?;
    Ok(())
}
