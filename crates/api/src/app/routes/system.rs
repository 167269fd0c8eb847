use axum::{Extension, Json, http::header, response::IntoResponse};

use prismo_observability::PrometheusHandle;

pub async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "success": true, "data": "pong" }))
}

/// Prometheus text exposition of every counter recorded so far.
pub async fn metrics(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}
