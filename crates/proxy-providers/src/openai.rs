use async_trait::async_trait;
use futures_util::StreamExt;
use proxy_core::MessageContent;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{Choice, ChoiceMessage, CompletionResult, DeltaStream, InvokeRequest, LlmProvider, ProviderError, Usage};
use crate::stream::{parse_sse_line, SseLine};

/// OpenAI-compatible adapter (§4.5): DeepSeek, Kimi, and the optional Claude
/// gateway all speak this same `{base_url}/chat/completions` shape.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
    upstream_model: String,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, api_key: String, base_url: String, upstream_model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider_name: name.into(),
            api_key,
            base_url,
            upstream_model,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn invoke(&self, req: &InvokeRequest) -> Result<CompletionResult, ProviderError> {
        let body = build_request_body(&self.upstream_model, req, false);
        debug!(provider = %self.provider_name, model = %self.upstream_model, "invoking openai-compatible provider");

        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(provider = %self.provider_name, status, body = %text, "openai-compatible error response");
            return Err(ProviderError::Api { status, message: text });
        }

        let api_resp: ApiResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp, &req.model))
    }

    async fn stream(&self, req: &InvokeRequest) -> Result<DeltaStream, ProviderError> {
        let body = build_request_body(&self.upstream_model, req, true);
        debug!(provider = %self.provider_name, model = %self.upstream_model, "streaming openai-compatible provider");

        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(provider = %self.provider_name, status, body = %text, "openai-compatible stream error response");
            return Err(ProviderError::Api { status, message: text });
        }

        Ok(Box::pin(async_stream::stream! {
            let mut byte_stream = resp.bytes_stream();
            let mut line_buf = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ProviderError::Http(e));
                        return;
                    }
                };
                let text = match std::str::from_utf8(&chunk) {
                    Ok(t) => t,
                    Err(_) => continue,
                };
                line_buf.push_str(text);

                let mut lines: Vec<String> = line_buf.split('\n').map(str::to_string).collect();
                let remainder = lines.pop().unwrap_or_default();

                for line in &lines {
                    let data = match parse_sse_line(line) {
                        SseLine::Data(d) => d,
                        SseLine::Ignored => continue,
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    let chunk: StreamChunk = match serde_json::from_str(&data) {
                        Ok(c) => c,
                        Err(_) => continue,
                    };
                    for choice in chunk.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                yield Ok(content);
                            }
                        }
                    }
                }
                line_buf = remainder;
            }
        }))
    }
}

fn build_request_body(upstream_model: &str, req: &InvokeRequest, stream: bool) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    for m in &req.messages {
        messages.push(serde_json::json!({ "role": m.role, "content": content_to_json(&m.content) }));
    }

    let mut body = serde_json::json!({
        "model": upstream_model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "stream": stream,
    });
    if let Some(temperature) = req.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    body
}

fn content_to_json(content: &MessageContent) -> serde_json::Value {
    match content {
        MessageContent::Text(s) => serde_json::json!(s),
        MessageContent::Parts(_) => serde_json::to_value(content).unwrap_or(serde_json::Value::Null),
    }
}

fn parse_response(resp: ApiResponse, public_model: &str) -> CompletionResult {
    let choice = resp.choices.into_iter().next();
    let content = choice.as_ref().and_then(|c| c.message.content.clone()).unwrap_or_default();
    let usage = resp.usage.unwrap_or(ApiUsage { prompt_tokens: 0, completion_tokens: 0 });

    CompletionResult {
        id: proxy_core::Id::new().to_string(),
        created: chrono::Utc::now().timestamp(),
        model: public_model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage { role: "assistant".to_string(), content },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage {
            prompt_tokens: usage.prompt_tokens as u64,
            completion_tokens: usage.completion_tokens as u64,
            total_tokens: (usage.prompt_tokens + usage.completion_tokens) as u64,
        },
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
