use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use proxy_core::ProxyError;

/// Wraps `ProxyError` so it can be returned directly from a handler as the
/// `Err` arm — the HTTP status and JSON body follow straight from §7's
/// taxonomy table (`ProxyError::status`/`code`).
pub struct GatewayError(pub ProxyError);

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody { error: self.0.to_string(), code: self.0.code() };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for GatewayError
where
    ProxyError: From<E>,
{
    fn from(e: E) -> Self {
        Self(ProxyError::from(e))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
