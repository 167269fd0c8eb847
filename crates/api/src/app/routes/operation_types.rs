use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::app::dto::{CreateOperationTypeRequest, ListResponse, OperationTypeResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new().route("/", get(list_operation_types).post(create_operation_type))
}

pub async fn create_operation_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(request): Extension<RequestContext>,
    payload: Result<Json<CreateOperationTypeRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::invalid_body(rejection),
    };

    match services.create_operation_type(&body.description).await {
        Ok(created) => {
            (StatusCode::CREATED, Json(OperationTypeResponse::from(created))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e, &request),
    }
}

pub async fn list_operation_types(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(request): Extension<RequestContext>,
) -> axum::response::Response {
    match services.list_operation_types().await {
        Ok(items) => (
            StatusCode::OK,
            Json(ListResponse::<OperationTypeResponse>::collect_from(items)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e, &request),
    }
}
