//! HTTP application wiring (Axum routers + service wiring).
//!
//! - `services.rs`: broker wiring shared by both surfaces
//! - `routes/`: HTTP routes + handlers (one file per surface)
//! - `dto.rs`: response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use jobwire_infra::StatsAggregator;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{BrokerServices, SubmitError};

/// Producer API: `POST /jobs`, `GET /health`.
pub fn build_producer_app(services: Arc<BrokerServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::jobs::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

/// Monitor: `GET /api/stats`, `POST /api/publish`, `GET /health`.
pub fn build_monitor_app(services: Arc<BrokerServices>, stats: Arc<StatsAggregator>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", routes::monitor::router())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(services))
                .layer(Extension(stats)),
        )
}

/// Resolves on Ctrl-C; used for graceful shutdown of both servers.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
