use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Multipart, Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;

use proxy_core::ProxyError;
use proxy_store::types::ConversationFile;

use crate::app::AppState;
use crate::bearer::{check_rate_limit, require_bearer};
use crate::error::{GatewayError, GatewayResult};

/// POST /v1/conversations/{id}/upload — single `file` multipart field (§4.6).
pub async fn upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> GatewayResult<Json<ConversationFile>> {
    check_rate_limit(&state, &headers, addr, "POST", "/v1/conversations/{id}/upload")?;
    let (device_token, _user, _tier) = require_bearer(&state, &headers)?;
    state.store.get_owned_conversation(&id, &device_token.token)?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::from(ProxyError::MalformedInput(e.to_string())))?
        .ok_or_else(|| GatewayError::from(ProxyError::MalformedInput("missing file field".to_string())))?;

    let original_name = field.file_name().unwrap_or("upload.bin").to_string();
    let bytes = field.bytes().await.map_err(|e| GatewayError::from(ProxyError::MalformedInput(e.to_string())))?;

    let file = state.attachments.ingest(&id, &device_token.token, &original_name, &bytes).await?;
    Ok(Json(file))
}

/// GET /v1/files/{id} — `get_file` is not itself ownership-scoped, so the
/// conversation lookup re-checks it (§4.6).
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> GatewayResult<Response> {
    let (device_token, _user, _tier) = require_bearer(&state, &headers)?;

    let file = state
        .store
        .get_file(&id)?
        .ok_or_else(|| ProxyError::NotFound(format!("file {id}")))?;
    state.store.get_owned_conversation(&file.conversation_id, &device_token.token)?;

    let bytes = tokio::fs::read(&file.stored_path).await.map_err(ProxyError::from)?;
    let mut response = Body::from(bytes).into_response();
    response.headers_mut().insert(
        "Content-Type",
        HeaderValue::from_str(&file.mime_type).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok(response)
}
