use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jobwire_broker::BrokerError;
use jobwire_core::DomainError;

use crate::app::services::SubmitError;

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    match err {
        SubmitError::Invalid(e) => domain_error_to_response(e),
        SubmitError::Publish(BrokerError::NotInitialized) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "not_initialized",
            BrokerError::NotInitialized.to_string(),
        ),
        SubmitError::Publish(e) => {
            tracing::error!(error = %e, "publish failed");
            json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string())
        }
    }
}

/// Validation failures answer `400 {"error": "<field> is required"}`.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    bad_request(err.to_string())
}

pub fn invalid_json(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_json", rejection.body_text())
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({ "error": message.into() })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
