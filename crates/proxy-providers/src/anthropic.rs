use async_trait::async_trait;
use proxy_core::MessageContent;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{Choice, ChoiceMessage, CompletionResult, InvokeRequest, LlmProvider, ProviderError, Usage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages adapter (§4.5): non-stream `Invoke` only; `stream`
/// falls back to the trait default (a single emulated delta, §4.7 step 7).
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    upstream_model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, upstream_model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            upstream_model,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn invoke(&self, req: &InvokeRequest) -> Result<CompletionResult, ProviderError> {
        let body = build_request_body(&self.upstream_model, req);
        debug!(model = %self.upstream_model, "invoking anthropic messages api");

        let resp = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "anthropic api error response");
            return Err(ProviderError::Api { status, message: text });
        }

        let api_resp: ApiResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp, &req.model))
    }
}

fn build_request_body(upstream_model: &str, req: &InvokeRequest) -> serde_json::Value {
    // §4.5: system messages from the in-band list are joined into the
    // top-level `system`, blank-line separated with any caller-supplied
    // system string.
    let system_blocks: Vec<&str> = req
        .messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| match &m.content {
            MessageContent::Text(s) => s.as_str(),
            MessageContent::Parts(_) => "",
        })
        .chain(req.system.as_deref())
        .filter(|s| !s.is_empty())
        .collect();

    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| {
            let role = if m.role == "assistant" { "assistant" } else { "user" };
            serde_json::json!({ "role": role, "content": content_to_anthropic(&m.content) })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": upstream_model,
        "messages": messages,
        "max_tokens": req.max_tokens,
    });
    if !system_blocks.is_empty() {
        body["system"] = serde_json::json!(system_blocks.join("\n\n"));
    }
    if let Some(temperature) = req.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    body
}

fn content_to_anthropic(content: &MessageContent) -> serde_json::Value {
    match content {
        MessageContent::Text(s) => serde_json::json!(s),
        MessageContent::Parts(parts) => {
            let blocks: Vec<serde_json::Value> = parts
                .iter()
                .map(|p| match p {
                    proxy_core::ContentPart::Text { text } => serde_json::json!({ "type": "text", "text": text }),
                    proxy_core::ContentPart::ImageUrl { image_url } => serde_json::json!({
                        "type": "text",
                        "text": image_url.url,
                    }),
                })
                .collect();
            serde_json::json!(blocks)
        }
    }
}

fn parse_response(resp: ApiResponse, public_model: &str) -> CompletionResult {
    let content = resp
        .content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Unknown => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

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
            prompt_tokens: resp.usage.input_tokens as u64,
            completion_tokens: resp.usage.output_tokens as u64,
            total_tokens: (resp.usage.input_tokens + resp.usage.output_tokens) as u64,
        },
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_core::ChatMessage;

    #[test]
    fn system_messages_join_with_caller_system_string() {
        let req = InvokeRequest {
            model: "claude-test".to_string(),
            system: Some("be concise".to_string()),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: MessageContent::Text("be nice".to_string()) },
                ChatMessage { role: "user".to_string(), content: MessageContent::Text("hi".to_string()) },
            ],
            max_tokens: 100,
            temperature: None,
        };
        let body = build_request_body("claude-3", &req);
        assert_eq!(body["system"], serde_json::json!("be nice\n\nbe concise"));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }
}
