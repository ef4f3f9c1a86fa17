use async_trait::async_trait;
use futures_util::stream::BoxStream;
use proxy_core::ChatMessage;
use serde::{Deserialize, Serialize};

/// Request shape handed to either adapter, already gated and truncated by
/// `proxy-quota` — `model` is the caller-declared public model name, echoed
/// back verbatim into the result (§4.5).
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u64,
    pub temperature: Option<f64>,
}

/// The unified shape both adapters project into (§4.5). Serialized directly
/// as the non-stream chat response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A lazy, finite, non-restartable sequence of text fragments (§4.5).
pub type DeltaStream = BoxStream<'static, Result<String, ProviderError>>;

/// Capability shared by both adapters: `Invoke` for a full response,
/// `Stream` for incremental fragments.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, req: &InvokeRequest) -> Result<CompletionResult, ProviderError>;

    /// Default falls back to a single emulated delta built from `invoke` —
    /// the behavior §4.7 step 7 requires of the Anthropic adapter, and a
    /// safe default for any adapter that has no native stream.
    async fn stream(&self, req: &InvokeRequest) -> Result<DeltaStream, ProviderError> {
        let result = self.invoke(req).await?;
        let text = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(Box::pin(futures_util::stream::once(async move { Ok(text) })))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse upstream response: {0}")]
    Parse(String),
}

impl From<ProviderError> for proxy_core::ProxyError {
    fn from(e: ProviderError) -> Self {
        proxy_core::ProxyError::UpstreamFailure(e.to_string())
    }
}

/// The most recent `role: user` message's text, for mock replies and any
/// other place that needs "what did the caller just say" (§8 scenario 1).
pub fn last_user_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.text_for_estimation())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_core::MessageContent;

    #[test]
    fn last_user_text_finds_most_recent_user_message() {
        let messages = vec![
            ChatMessage { role: "user".into(), content: MessageContent::Text("first".into()) },
            ChatMessage { role: "assistant".into(), content: MessageContent::Text("reply".into()) },
            ChatMessage { role: "user".into(), content: MessageContent::Text("second".into()) },
        ];
        assert_eq!(last_user_text(&messages), "second");
    }

    #[test]
    fn last_user_text_empty_when_no_user_message() {
        let messages = vec![ChatMessage { role: "system".into(), content: MessageContent::Text("be nice".into()) }];
        assert_eq!(last_user_text(&messages), "");
    }
}
