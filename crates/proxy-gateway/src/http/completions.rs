use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use proxy_core::{ChatMessage, Provider, ProxyError};
use proxy_orchestrator::{fan_out, FanOutItem, StreamFrame};
use proxy_providers::InvokeRequest;

use crate::app::AppState;
use crate::bearer::{check_rate_limit, require_bearer};
use crate::error::GatewayResult;

#[derive(Deserialize)]
pub struct CompletionsRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    pub temperature: Option<f64>,
}

/// POST /v1/chat/completions — default tier routing, no forced provider.
pub async fn chat_completions(
    state: State<Arc<AppState>>,
    addr: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Json<CompletionsRequest>,
) -> GatewayResult<axum::response::Response> {
    run_completions(state, addr, headers, None, body).await
}

/// POST /{deepseek|kimi|claude}/v1/chat/completions — forced provider
/// (§4.5); forcing above the token's tier fails with 403.
pub async fn chat_completions_forced(
    state: State<Arc<AppState>>,
    addr: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    body: Json<CompletionsRequest>,
) -> GatewayResult<axum::response::Response> {
    let forced = Provider::from_path_segment(&provider).ok_or_else(|| ProxyError::NotFound(format!("provider {provider}")))?;
    run_completions(state, addr, headers, Some(forced), body).await
}

async fn run_completions(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    forced: Option<Provider>,
    Json(req): Json<CompletionsRequest>,
) -> GatewayResult<axum::response::Response> {
    check_rate_limit(&state, &headers, addr, "POST", "/v1/chat/completions")?;
    let (device_token, _user, tier) = require_bearer(&state, &headers)?;

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let gated = state.quota.gate(&device_token.token, &today, tier, req.messages, req.max_tokens)?;
    let prompt_tokens = gated.prompt_tokens;
    let max_output_tokens = gated.max_output_tokens;
    let provider = state.providers.resolve(tier, forced)?;

    let invoke_request = InvokeRequest {
        model: req.model,
        system: None,
        messages: gated.messages,
        max_tokens: max_output_tokens,
        temperature: None,
    };

    if req.stream {
        let upstream = provider.stream(&invoke_request).await?;
        let token = device_token.token.clone();
        let quota = state.quota.clone();
        let stream = async_stream::stream! {
            let drained = fan_out(upstream);
            futures_util::pin_mut!(drained);
            while let Some(item) = futures_util::StreamExt::next(&mut drained).await {
                match item {
                    FanOutItem::Delta(ch) => {
                        let frame = StreamFrame { delta: Some(ch.to_string()), done: false, message_id: None, content: None, error: None };
                        yield Event::default().json_data(frame).unwrap();
                    }
                    FanOutItem::Keepalive => {
                        yield Event::default().comment("keepalive");
                    }
                    FanOutItem::Error(message) => {
                        let frame = StreamFrame { delta: None, done: true, message_id: None, content: None, error: Some(message) };
                        yield Event::default().json_data(frame).unwrap();
                        return;
                    }
                    FanOutItem::Done(content) => {
                        if let Err(e) = quota.record_usage(&token, &today, prompt_tokens, &content) {
                            tracing::warn!(error = %e, "failed to record usage after a one-shot stream");
                        }
                        let frame = StreamFrame { delta: Some(String::new()), done: true, message_id: None, content: Some(content), error: None };
                        yield Event::default().json_data(frame).unwrap();
                    }
                }
            }
        };
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response());
    }

    let completion = provider.invoke(&invoke_request).await?;
    let content = completion.choices.first().map(|c| c.message.content.clone()).unwrap_or_default();
    if let Err(e) = state.quota.record_usage(&device_token.token, &today, prompt_tokens, &content) {
        tracing::warn!(error = %e, "failed to record usage after a one-shot completion");
    }
    Ok(Json(completion).into_response())
}
