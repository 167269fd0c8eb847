use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::Instrument;

use prismo_infra::config::AuthConfig;

use crate::app::errors;
use crate::context::RequestContext;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AuthState {
    pub credentials: Arc<AuthConfig>,
}

/// HTTP basic authentication against the configured credentials.
pub async fn basic_auth_middleware(
    State(state): State<AuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let (username, password) = match extract_basic(req.headers()) {
        Ok(credentials) => credentials,
        Err(()) => {
            return errors::json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Not Authorized");
        }
    };

    if username != state.credentials.username || password != state.credentials.password {
        return errors::json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Wrong username/password",
        );
    }

    next.run(req).await
}

fn extract_basic(headers: &HeaderMap) -> Result<(String, String), ()> {
    let header = headers.get(header::AUTHORIZATION).ok_or(())?;
    let header = header.to_str().map_err(|_| ())?;
    let encoded = header.strip_prefix("Basic ").ok_or(())?;

    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| ())?;
    let decoded = String::from_utf8(decoded).map_err(|_| ())?;
    let (username, password) = decoded.split_once(':').ok_or(())?;

    Ok((username.to_string(), password.to_string()))
}

/// Assign a request id (reusing the caller's `X-Request-ID`), run the request inside a
/// span carrying it and apply the default response headers.
pub async fn request_context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    req.extensions_mut().insert(RequestContext::new(&request_id));

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %req.method(),
        uri = %req.uri(),
    );
    let mut response = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| tracing::info!(status = response.status().as_u16(), "request completed"));

    let headers = response.headers_mut();
    for (name, value) in DEFAULT_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    response
}

const DEFAULT_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::CACHE_CONTROL, "max-age=0, private, must-revalidate"),
];
