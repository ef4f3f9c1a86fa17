use proxy_core::{Provider, ProxyError, Tier};

/// Resolve which provider a request should hit (§4.5): the tier's default
/// unless the caller forces one via a path-prefix, in which case forcing is
/// only permitted when `tier_level(forced) <= tier_level(token)`.
pub fn select_provider(tier: Tier, forced: Option<Provider>) -> Result<Provider, ProxyError> {
    match forced {
        None => Ok(Provider::default_for_tier(tier)),
        Some(provider) => {
            if provider.min_tier_level() <= tier.level() {
                Ok(provider)
            } else {
                Err(ProxyError::ForcedProviderTierTooHigh)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unforced_selection_follows_tier_default() {
        assert_eq!(select_provider(Tier::Free, None).unwrap(), Provider::Kimi);
        assert_eq!(select_provider(Tier::Max, None).unwrap(), Provider::Claude);
    }

    #[test]
    fn forcing_claude_on_free_tier_is_rejected() {
        let err = select_provider(Tier::Free, Some(Provider::Claude)).unwrap_err();
        assert!(matches!(err, ProxyError::ForcedProviderTierTooHigh));
    }

    #[test]
    fn forcing_deepseek_is_allowed_on_any_tier() {
        assert_eq!(select_provider(Tier::Free, Some(Provider::DeepSeek)).unwrap(), Provider::DeepSeek);
        assert_eq!(select_provider(Tier::Max, Some(Provider::DeepSeek)).unwrap(), Provider::DeepSeek);
    }

    #[test]
    fn forcing_claude_on_max_tier_is_allowed() {
        assert_eq!(select_provider(Tier::Max, Some(Provider::Claude)).unwrap(), Provider::Claude);
    }
}
