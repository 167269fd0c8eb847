use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use prismo_core::{AccountId, DomainError, OperationTypeId};
use prismo_ledger::Amount;

use crate::app::dto::{CreateTransactionRequest, TransactionResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new().route("/", post(create_transaction))
}

pub async fn create_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(request): Extension<RequestContext>,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::invalid_body(rejection),
    };

    let (account_id, operation_type_id, amount) = match validate(&body) {
        Ok(v) => v,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string());
        }
    };

    match services
        .create_transaction(account_id, operation_type_id, amount)
        .await
    {
        Ok(booked) => {
            (StatusCode::CREATED, Json(TransactionResponse::from(booked))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e, &request),
    }
}

fn validate(
    body: &CreateTransactionRequest,
) -> Result<(AccountId, OperationTypeId, Amount), DomainError> {
    Ok((
        AccountId::new(body.account_id)?,
        OperationTypeId::new(body.operation_type_id)?,
        Amount::from_decimal(body.amount)?,
    ))
}
