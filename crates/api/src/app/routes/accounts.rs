use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use prismo_core::AccountId;

use crate::app::dto::{AccountResponse, CreateAccountRequest, ListResponse, TransactionResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_account))
        .route("/:account_id", get(get_account))
        .route("/:account_id/transactions", get(list_account_transactions))
}

pub async fn create_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(request): Extension<RequestContext>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::invalid_body(rejection),
    };

    match services.create_account(&body.document_number).await {
        Ok(account) => {
            (StatusCode::CREATED, Json(AccountResponse::from(account))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e, &request),
    }
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(request): Extension<RequestContext>,
    Path(account_id): Path<String>,
) -> axum::response::Response {
    let account_id = match parse_account_id(&account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.get_account(account_id).await {
        Ok(account) => (StatusCode::OK, Json(AccountResponse::from(account))).into_response(),
        Err(e) => errors::ledger_error_to_response(e, &request),
    }
}

pub async fn list_account_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(request): Extension<RequestContext>,
    Path(account_id): Path<String>,
) -> axum::response::Response {
    let account_id = match parse_account_id(&account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.list_account_transactions(account_id).await {
        Ok(items) => (
            StatusCode::OK,
            Json(ListResponse::<TransactionResponse>::collect_from(items)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e, &request),
    }
}

fn parse_account_id(raw: &str) -> Result<AccountId, axum::response::Response> {
    raw.parse::<AccountId>().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "account id must be a positive integer",
        )
    })
}
