use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use proxy_orchestrator::{ChatTurnInput, StreamItem};
use proxy_store::types::{Conversation, Message};

use crate::app::AppState;
use crate::bearer::{check_rate_limit, require_bearer};
use crate::error::GatewayResult;

#[derive(Serialize)]
pub struct ConversationResponse {
    #[serde(flatten)]
    pub conversation: Conversation,
}

#[derive(Serialize)]
pub struct ConversationDetailResponse {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// POST /v1/conversations.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> GatewayResult<Json<ConversationResponse>> {
    check_rate_limit(&state, &headers, addr, "POST", "/v1/conversations")?;
    let (device_token, _user, _tier) = require_bearer(&state, &headers)?;
    let conversation = state.store.create_conversation(&device_token.token)?;
    Ok(Json(ConversationResponse { conversation }))
}

/// GET /v1/conversations — newest-updated first (§6).
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> GatewayResult<Json<Vec<Conversation>>> {
    let (device_token, _user, _tier) = require_bearer(&state, &headers)?;
    let conversations = state.store.list_conversations(&device_token.token)?;
    Ok(Json(conversations))
}

/// GET /v1/conversations/{id}.
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> GatewayResult<Json<ConversationDetailResponse>> {
    let (device_token, _user, _tier) = require_bearer(&state, &headers)?;
    let conversation = state.store.get_owned_conversation(&id, &device_token.token)?;
    let messages = state.store.list_messages(&id)?;
    Ok(Json(ConversationDetailResponse { conversation, messages }))
}

/// DELETE /v1/conversations/{id} — cascades to messages and files (§4.1).
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> GatewayResult<axum::http::StatusCode> {
    check_rate_limit(&state, &headers, addr, "DELETE", "/v1/conversations/{id}")?;
    let (device_token, _user, _tier) = require_bearer(&state, &headers)?;
    state.store.delete_conversation(&id, &device_token.token)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: proxy_providers::Usage,
}

/// POST /v1/conversations/{id}/chat — the full §4.7 pipeline, collapsed
/// to a single response.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> GatewayResult<Json<ChatResponse>> {
    check_rate_limit(&state, &headers, addr, "POST", "/v1/conversations/{id}/chat")?;
    let (device_token, user, tier) = require_bearer(&state, &headers)?;

    let input = ChatTurnInput { message: req.message, file_ids: req.file_ids };
    let persona = user.as_ref().and_then(|u| u.persona.as_deref());
    let prepared = state
        .orchestrator
        .prepare_turn(&id, &device_token.token, tier, persona, input, None, req.model, req.max_tokens)
        .await?;

    let turn = proxy_orchestrator::run_non_stream(&state.orchestrator, prepared).await?;
    Ok(Json(ChatResponse { message: turn.message, usage: turn.usage }))
}

/// POST /v1/conversations/{id}/chat/stream — SSE, one event per delta plus
/// a final `done` frame (§6).
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> GatewayResult<axum::response::Response> {
    check_rate_limit(&state, &headers, addr, "POST", "/v1/conversations/{id}/chat/stream")?;
    let (device_token, user, tier) = require_bearer(&state, &headers)?;

    let input = ChatTurnInput { message: req.message, file_ids: req.file_ids };
    let persona = user.as_ref().and_then(|u| u.persona.as_deref());
    let prepared = state
        .orchestrator
        .prepare_turn(&id, &device_token.token, tier, persona, input, None, req.model, req.max_tokens)
        .await?;

    let orchestrator = state.orchestrator.clone();
    let stream = async_stream::stream! {
        let inner = proxy_orchestrator::run_stream(orchestrator, prepared);
        futures_util::pin_mut!(inner);
        while let Some(item) = futures_util::StreamExt::next(&mut inner).await {
            match item {
                StreamItem::Frame(frame) => yield Event::default().json_data(frame).unwrap(),
                StreamItem::Keepalive => yield Event::default().comment("keepalive"),
            }
        }
    };

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    let headers = response.headers_mut();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    Ok(response)
}
