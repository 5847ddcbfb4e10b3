use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    routing::{get, post},
};

use jobwire_core::JobRequest;
use jobwire_infra::{AggregatedStats, StatsAggregator};

use crate::app::routes::jobs;
use crate::app::services::BrokerServices;

pub fn router() -> Router {
    Router::new()
        .route("/stats", get(stats))
        .route("/publish", post(publish))
}

/// Live queue and channel stats. Always 200; telemetry outages show as zeroes.
pub async fn stats(Extension(aggregator): Extension<Arc<StatsAggregator>>) -> Json<AggregatedStats> {
    Json(aggregator.aggregate().await)
}

pub async fn publish(
    Extension(services): Extension<Arc<BrokerServices>>,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> axum::response::Response {
    jobs::accept(&services, body).await
}
