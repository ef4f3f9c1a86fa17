use proxy_core::Tier;

/// Authoritative per-tier limits (§4.4 table).
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub max_context_tokens: u64,
    pub max_output_tokens: u64,
    pub daily_tokens: u64,
}

pub fn limits_for(tier: Tier) -> TierLimits {
    match tier {
        Tier::Free => TierLimits {
            max_context_tokens: 8_000,
            max_output_tokens: 2_048,
            daily_tokens: 60_000,
        },
        Tier::Pro => TierLimits {
            max_context_tokens: 32_000,
            max_output_tokens: 1_024,
            daily_tokens: 600_000,
        },
        Tier::Max => TierLimits {
            max_context_tokens: 64_000,
            max_output_tokens: 2_048,
            daily_tokens: 1_200_000,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_table_matches_spec() {
        let free = limits_for(Tier::Free);
        assert_eq!((free.max_context_tokens, free.max_output_tokens, free.daily_tokens), (8_000, 2_048, 60_000));
        let pro = limits_for(Tier::Pro);
        assert_eq!((pro.max_context_tokens, pro.max_output_tokens, pro.daily_tokens), (32_000, 1_024, 600_000));
        let max = limits_for(Tier::Max);
        assert_eq!((max.max_context_tokens, max.max_output_tokens, max.daily_tokens), (64_000, 2_048, 1_200_000));
    }
}
