use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use jobwire_core::JobRequest;

use crate::app::services::BrokerServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/jobs", post(create_job))
}

pub async fn create_job(
    Extension(services): Extension<Arc<BrokerServices>>,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> axum::response::Response {
    accept(&services, body).await
}

/// Validate, publish under `job.create`, answer `202 {status, jobId}`.
pub(crate) async fn accept(
    services: &BrokerServices,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::invalid_json(rejection),
    };

    match services.submit(request).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(dto::QueuedResponse::queued(job_id)),
        )
            .into_response(),
        Err(e) => errors::submit_error_to_response(e),
    }
}
