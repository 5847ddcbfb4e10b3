use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use jobwire_broker::ConnectionState;

use crate::app::dto::HealthResponse;
use crate::app::services::BrokerServices;

/// 200 while the broker channel is open, 503 before `initialize` and after
/// the channel has closed.
pub async fn health(Extension(services): Extension<Arc<BrokerServices>>) -> impl IntoResponse {
    let state = services.state();
    let (status, body) = match state {
        ConnectionState::Ready => (StatusCode::OK, "ok"),
        ConnectionState::Uninitialized | ConnectionState::Closed => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: body,
            broker: state.as_str(),
        }),
    )
}
