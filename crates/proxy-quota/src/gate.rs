use proxy_core::{ChatMessage, Tier};
use proxy_store::Store;
use tracing::instrument;

use crate::context::truncate_messages_to_fit;
use crate::error::{QuotaError, Result};
use crate::estimate::{approx_tokens, messages_approx_tokens};
use crate::tiers::limits_for;

/// Outcome of `QuotaEngine::gate`: the (possibly truncated) message set
/// ready to dispatch, the prompt tokens counted against the daily budget,
/// and the output-token cap to pass upstream (§4.4 steps 1-3).
pub struct GatedRequest {
    pub messages: Vec<ChatMessage>,
    pub prompt_tokens: u64,
    pub max_output_tokens: u64,
}

/// Context truncation, the daily-quota check, and output-budget capping
/// (§4.4), backed by `proxy-store::Store` for the per-(token, day) counters.
pub struct QuotaEngine {
    store: std::sync::Arc<Store>,
}

impl QuotaEngine {
    pub fn new(store: std::sync::Arc<Store>) -> Self {
        Self { store }
    }

    /// Run all three §4.4 pre-dispatch steps. `today` is the caller-supplied
    /// UTC day string (`YYYY-MM-DD`) so call sites share one clock read.
    #[instrument(skip(self, messages))]
    pub fn gate(
        &self,
        token: &str,
        today: &str,
        tier: Tier,
        messages: Vec<ChatMessage>,
        caller_max_tokens: Option<u64>,
    ) -> Result<GatedRequest> {
        let limits = limits_for(tier);
        let messages = truncate_messages_to_fit(messages, limits.max_context_tokens);
        let prompt_tokens = messages_approx_tokens(&messages);

        let usage = self
            .store
            .get_daily_usage(token, today)
            .map_err(|_| QuotaError::Exceeded)?;
        let used = (usage.prompt_tokens + usage.completion_tokens) as u64;
        if used + prompt_tokens > limits.daily_tokens {
            return Err(QuotaError::Exceeded);
        }

        let max_output_tokens = caller_max_tokens
            .filter(|&m| m > 0)
            .map(|m| m.min(limits.max_output_tokens))
            .unwrap_or(limits.max_output_tokens);

        Ok(GatedRequest {
            messages,
            prompt_tokens,
            max_output_tokens,
        })
    }

    /// Atomically upsert the (token, day) counters after a successful
    /// upstream call (§4.4, after step 3).
    #[instrument(skip(self, completion_text))]
    pub fn record_usage(
        &self,
        token: &str,
        today: &str,
        prompt_tokens: u64,
        completion_text: &str,
    ) -> proxy_store::Result<()> {
        let completion_tokens = approx_tokens(completion_text);
        self.store
            .bump_daily_usage(token, today, prompt_tokens as i64, completion_tokens as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_core::MessageContent;
    use rusqlite::Connection;

    fn fresh_engine() -> QuotaEngine {
        let conn = Connection::open_in_memory().unwrap();
        proxy_store::db::init_db(&conn).unwrap();
        QuotaEngine::new(std::sync::Arc::new(Store::new(conn)))
    }

    fn msg(role: &str, text: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: MessageContent::Text(text.to_string()),
        }
    }

    #[test]
    fn caps_output_to_tier_max_when_caller_asks_for_more() {
        let engine = fresh_engine();
        let gated = engine
            .gate("T1", "2026-01-01", Tier::Free, vec![msg("user", "hi")], Some(9_999_999))
            .unwrap();
        assert_eq!(gated.max_output_tokens, 2_048);
    }

    #[test]
    fn uses_tier_default_when_caller_omits_max_tokens() {
        let engine = fresh_engine();
        let gated = engine
            .gate("T1", "2026-01-01", Tier::Pro, vec![msg("user", "hi")], None)
            .unwrap();
        assert_eq!(gated.max_output_tokens, 1_024);
    }

    #[test]
    fn rejects_when_daily_budget_already_spent() {
        let engine = fresh_engine();
        engine.store.bump_daily_usage("T1", "2026-01-01", 59_999, 0).unwrap();
        let err = engine
            .gate("T1", "2026-01-01", Tier::Free, vec![msg("user", &"x".repeat(100))], None)
            .unwrap_err();
        assert!(matches!(err, QuotaError::Exceeded));
    }

    #[test]
    fn record_usage_accumulates() {
        let engine = fresh_engine();
        engine.record_usage("T1", "2026-01-01", 10, "hello").unwrap();
        engine.record_usage("T1", "2026-01-01", 5, "hi").unwrap();
        let usage = engine.store.get_daily_usage("T1", "2026-01-01").unwrap();
        assert_eq!(usage.prompt_tokens, 15);
        assert_eq!(usage.requests, 2);
    }
}
