use async_trait::async_trait;
use proxy_core::{Provider, Tier};

use crate::provider::{last_user_text, Choice, ChoiceMessage, CompletionResult, InvokeRequest, LlmProvider, ProviderError, Usage};

/// Stands in for a real upstream when `providers.mock_mode` is set — never
/// makes a network call. Reply is `"[MOCK:{provider}:{tier}] {last_user_message}"`
/// (§8 scenario 1).
pub struct MockProvider {
    provider: Provider,
    tier: Tier,
}

impl MockProvider {
    pub fn new(provider: Provider, tier: Tier) -> Self {
        Self { provider, tier }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    async fn invoke(&self, req: &InvokeRequest) -> Result<CompletionResult, ProviderError> {
        let content = format!("[MOCK:{}:{}] {}", self.provider, self.tier, last_user_text(&req.messages));
        let prompt_tokens = estimate_prompt_tokens(&req.messages);

        Ok(CompletionResult {
            id: proxy_core::Id::new().to_string(),
            created: chrono::Utc::now().timestamp(),
            model: req.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage { role: "assistant".to_string(), content: content.clone() },
                finish_reason: "stop".to_string(),
            }],
            usage: Usage {
                prompt_tokens,
                completion_tokens: (content.len() as u64 / 4).max(1),
                total_tokens: prompt_tokens + (content.len() as u64 / 4).max(1),
            },
        })
    }
}

/// Mock usage doesn't need to be exact — just present and nonzero, so
/// callers exercising the daily-usage accounting path see real numbers.
fn estimate_prompt_tokens(messages: &[proxy_core::ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|m| (m.content.text_for_estimation().len() as u64 / 4).max(1))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_core::MessageContent;

    #[tokio::test]
    async fn mock_reply_carries_provider_tier_and_message() {
        let provider = MockProvider::new(Provider::Kimi, Tier::Free);
        let req = InvokeRequest {
            model: "gpt-test".to_string(),
            system: None,
            messages: vec![proxy_core::ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Text("hi".to_string()),
            }],
            max_tokens: 100,
            temperature: None,
        };
        let result = provider.invoke(&req).await.unwrap();
        assert_eq!(result.choices[0].message.content, "[MOCK:kimi:free] hi");
    }
}
