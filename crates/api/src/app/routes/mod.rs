use axum::Router;

pub mod accounts;
pub mod operation_types;
pub mod system;
pub mod transactions;

/// Router for all authenticated `/prismo/v1` endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/accounts", accounts::router())
        .nest("/operation-types", operation_types::router())
        .nest("/transactions", transactions::router())
}
