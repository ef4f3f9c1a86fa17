use std::collections::HashMap;
use std::sync::Arc;

use proxy_core::config::ProvidersConfig;
use proxy_core::{Provider, Tier};

use crate::anthropic::AnthropicProvider;
use crate::mock::MockProvider;
use crate::openai::OpenAiCompatProvider;
use crate::provider::LlmProvider;
use crate::selection::select_provider;

/// Built once at boot from `ProvidersConfig`; resolves `(tier, forced)` to
/// a live adapter, or a `MockProvider` when `mock_mode` is set (§4.5, §8
/// scenario 1). Each adapter is boxed behind a trait object since the two
/// upstream shapes (OpenAI-compatible, Anthropic) carry different clients.
pub struct ProviderRegistry {
    mock_mode: bool,
    adapters: HashMap<Provider, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new(config: &ProvidersConfig) -> Self {
        let mut adapters: HashMap<Provider, Arc<dyn LlmProvider>> = HashMap::new();

        if let Some(deepseek) = &config.deepseek {
            adapters.insert(
                Provider::DeepSeek,
                Arc::new(OpenAiCompatProvider::new(
                    "deepseek",
                    deepseek.api_key.clone(),
                    deepseek.base_url.clone(),
                    deepseek.model.clone(),
                )),
            );
        }
        if let Some(kimi) = &config.kimi {
            adapters.insert(
                Provider::Kimi,
                Arc::new(OpenAiCompatProvider::new(
                    "kimi",
                    kimi.api_key.clone(),
                    kimi.base_url.clone(),
                    kimi.model.clone(),
                )),
            );
        }
        // A Claude request prefers the native Anthropic Messages adapter;
        // an OpenAI-compatible gateway can stand in when configured instead.
        if let Some(claude) = &config.claude {
            adapters.insert(
                Provider::Claude,
                Arc::new(AnthropicProvider::new(claude.api_key.clone(), claude.base_url.clone(), claude.model.clone())),
            );
        } else if let Some(gateway) = &config.claude_gateway {
            adapters.insert(
                Provider::Claude,
                Arc::new(OpenAiCompatProvider::new("claude", gateway.api_key.clone(), gateway.base_url.clone(), gateway.model.clone())),
            );
        }

        Self { mock_mode: config.mock_mode, adapters }
    }

    /// Resolve the provider to dispatch to, validating any forced choice
    /// against the token's tier (§4.5).
    pub fn resolve(&self, tier: Tier, forced: Option<Provider>) -> Result<Arc<dyn LlmProvider>, proxy_core::ProxyError> {
        let provider = select_provider(tier, forced)?;
        if self.mock_mode {
            return Ok(Arc::new(MockProvider::new(provider, tier)));
        }
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| proxy_core::ProxyError::Internal(format!("no adapter configured for provider {provider}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_mode_never_touches_configured_adapters() {
        let registry = ProviderRegistry::new(&ProvidersConfig { mock_mode: true, ..Default::default() });
        let provider = registry.resolve(Tier::Free, None).unwrap();
        assert_eq!(provider.name(), "kimi");
    }

    #[test]
    fn missing_adapter_is_internal_error_not_a_panic() {
        let registry = ProviderRegistry::new(&ProvidersConfig::default());
        let err = registry.resolve(Tier::Max, None).unwrap_err();
        assert!(matches!(err, proxy_core::ProxyError::Internal(_)));
    }
}
