use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, warn};

use prismo_core::DomainError;
use prismo_infra::LedgerError;
use prismo_infra::repository::RepositoryError;

use crate::context::RequestContext;

/// Map a ledger failure to its HTTP response.
///
/// Internal failures are logged here and answered with a generic message plus the
/// request id; store and driver error text never reaches the client.
pub fn ledger_error_to_response(
    err: LedgerError,
    request: &RequestContext,
) -> axum::response::Response {
    match err {
        LedgerError::Domain(DomainError::Validation(msg))
        | LedgerError::Domain(DomainError::InvalidId(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
        }
        LedgerError::Domain(DomainError::NotFound(what)) => {
            json_error(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
        }
        LedgerError::Domain(DomainError::Conflict(msg)) => {
            json_error(StatusCode::CONFLICT, "CONFLICT", msg)
        }
        LedgerError::Repository(RepositoryError::Conflict(_)) => {
            json_error(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
        }
        LedgerError::Lock(e) if e.is_contention() => {
            warn!(error = %e, "request lost a lock race");
            json_error(
                StatusCode::LOCKED,
                "ENTITY_LOCKED",
                "unable to acquire lock, try again later",
            )
        }
        other => {
            error!(request_id = %request.request_id(), error = %other, "internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({
                    "error": "INTERNAL_SERVER_ERROR",
                    "message": "something went wrong",
                    "request_id": request.request_id(),
                })),
            )
                .into_response()
        }
    }
}

/// Malformed or mistyped JSON body.
pub fn invalid_body(rejection: JsonRejection) -> axum::response::Response {
    warn!(error = %rejection, "rejected request body");
    json_error(
        StatusCode::BAD_REQUEST,
        "BAD_REQUEST",
        "Something went wrong while parsing request",
    )
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
