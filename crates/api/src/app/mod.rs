//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: ledger service wiring (in-memory or Postgres + Redis)
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use prismo_infra::config::{AppConfig, AuthConfig};
use prismo_observability::PrometheusHandle;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let metrics = prismo_observability::metrics::install()?;
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_app_with_services(services, config.auth.clone(), metrics))
}

/// Build the router around already constructed services.
pub fn build_app_with_services(
    services: Arc<AppServices>,
    auth: AuthConfig,
    metrics: PrometheusHandle,
) -> Router {
    let auth_state = middleware::AuthState {
        credentials: Arc::new(auth),
    };

    // Protected routes: require basic auth.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::basic_auth_middleware,
        ));

    Router::new()
        .route("/ping", get(routes::system::ping))
        .route("/metrics", get(routes::system::metrics).layer(Extension(metrics)))
        .nest("/prismo/v1", protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(
            middleware::request_context_middleware,
        )))
}
