use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use proxy_attachments::{encode_sentinel, FileMeta, MessageMeta};
use proxy_core::{ChatMessage, Provider, ProxyError, Tier};
use proxy_providers::{LlmProvider, ProviderRegistry};
use proxy_quota::QuotaEngine;
use proxy_store::types::ConversationFile;
use proxy_store::Store;

use crate::history::reconstruct;
use crate::persona::persona_system_message;
use crate::request::{validate, ChatTurnInput};

/// A chat turn ready to dispatch: the gated message set, the output cap,
/// and the resolved provider — everything `run_non_stream`/`run_stream`
/// need, with steps 1-6 of §4.7 already done.
pub struct PreparedTurn {
    pub conversation_id: String,
    pub device_token: String,
    pub today: String,
    pub provider: Arc<dyn LlmProvider>,
    pub public_model: String,
    pub messages: Vec<ChatMessage>,
    pub max_output_tokens: u64,
    pub prompt_tokens: u64,
}

/// Steps 1-6 of §4.7 (auth has already happened by the time the gateway
/// calls this; `tier`/`device_token` are its result).
pub struct ChatOrchestrator {
    store: Arc<Store>,
    quota: Arc<QuotaEngine>,
    providers: Arc<ProviderRegistry>,
}

impl ChatOrchestrator {
    pub fn new(store: Arc<Store>, quota: Arc<QuotaEngine>, providers: Arc<ProviderRegistry>) -> Self {
        Self { store, quota, providers }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn prepare_turn(
        &self,
        conversation_id: &str,
        device_token: &str,
        tier: Tier,
        persona: Option<&str>,
        input: ChatTurnInput,
        forced_provider: Option<Provider>,
        public_model: Option<String>,
        caller_max_tokens: Option<u64>,
    ) -> proxy_core::Result<PreparedTurn> {
        validate(&input)?;

        // Step 3: resolve attachments, sentinel-wrap, persist (ownership
        // checked inside `resolve_owned_files`/`persist_message`), title.
        let files = self.store.resolve_owned_files(conversation_id, &input.file_ids)?;
        let meta = build_message_meta(&files);
        let persisted_content = match &meta {
            Some(meta) => encode_sentinel(&input.message, meta),
            None => input.message.clone(),
        };
        self.store.persist_message(conversation_id, device_token, "user", &persisted_content)?;
        if let Some(title) = derive_title(&input.message) {
            self.store.set_title_if_absent(conversation_id, &title)?;
        }

        // Step 4: replay full history, sentinel-decoded and re-composed.
        let rows = self.store.list_messages(conversation_id)?;
        let mut messages = Vec::with_capacity(rows.len() + 1);
        for row in &rows {
            messages.push(reconstruct(&self.store, conversation_id, &row).await?);
        }

        // Step 5: persona.
        if let Some(system_message) = persona.and_then(persona_system_message) {
            messages.insert(0, system_message);
        }

        // Step 6: quota + context gate.
        let provider = self.providers.resolve(tier, forced_provider)?;
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let gated = self.quota.gate(device_token, &today, tier, messages, caller_max_tokens)?;

        Ok(PreparedTurn {
            conversation_id: conversation_id.to_string(),
            device_token: device_token.to_string(),
            today,
            public_model: public_model.unwrap_or_else(|| provider.name().to_string()),
            provider,
            messages: gated.messages,
            max_output_tokens: gated.max_output_tokens,
            prompt_tokens: gated.prompt_tokens,
        })
    }

    pub fn record_usage(&self, token: &str, today: &str, prompt_tokens: u64, completion_text: &str) -> proxy_core::Result<()> {
        Ok(self.quota.record_usage(token, today, prompt_tokens, completion_text)?)
    }

    pub fn persist_assistant_message(&self, conversation_id: &str, content: &str) -> proxy_core::Result<proxy_store::types::Message> {
        Ok(self.store.persist_assistant_message(conversation_id, content)?)
    }
}

/// Build the sentinel payload (§4.6), deduping `file_ids` while preserving
/// order (§8 round-trip law).
fn build_message_meta(files: &[ConversationFile]) -> Option<MessageMeta> {
    if files.is_empty() {
        return None;
    }
    let mut seen = HashSet::with_capacity(files.len());
    let mut file_ids = Vec::with_capacity(files.len());
    let mut metas = Vec::with_capacity(files.len());
    for file in files {
        if seen.insert(file.id.clone()) {
            file_ids.push(file.id.clone());
            metas.push(FileMeta {
                id: file.id.clone(),
                name: file.original_name.clone(),
                size: file.size_bytes,
                mime_type: file.mime_type.clone(),
                url: format!("/v1/files/{}", file.id),
            });
        }
    }
    Some(MessageMeta { file_ids, files: metas })
}

/// First 80 characters of the user's first message, trimmed — `None` for a
/// blank message (an attachment-only first turn leaves the title unset).
fn derive_title(message: &str) -> Option<String> {
    const MAX_TITLE_CHARS: usize = 80;
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TITLE_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str) -> ConversationFile {
        ConversationFile {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            original_name: "note.txt".to_string(),
            stored_path: "/tmp/x".to_string(),
            sha256: "abc".to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: 5,
            extracted_text: Some("hi".to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn build_message_meta_dedupes_preserving_order() {
        let files = vec![file("f1"), file("f2"), file("f1")];
        let meta = build_message_meta(&files).unwrap();
        assert_eq!(meta.file_ids, vec!["f1".to_string(), "f2".to_string()]);
        assert_eq!(meta.files.len(), 2);
    }

    #[test]
    fn no_files_yields_no_meta() {
        assert!(build_message_meta(&[]).is_none());
    }

    #[test]
    fn title_truncates_to_80_chars() {
        let title = derive_title(&"x".repeat(200)).unwrap();
        assert_eq!(title.chars().count(), 80);
    }

    #[test]
    fn blank_message_yields_no_title() {
        assert!(derive_title("   ").is_none());
    }

    fn fresh_orchestrator() -> (ChatOrchestrator, Arc<Store>) {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        proxy_store::db::init_db(&conn).unwrap();
        let store = Arc::new(Store::new(conn));
        let quota = Arc::new(proxy_quota::QuotaEngine::new(store.clone()));
        let providers = Arc::new(ProviderRegistry::new(&proxy_core::config::ProvidersConfig {
            mock_mode: true,
            ..Default::default()
        }));
        (ChatOrchestrator::new(store.clone(), quota, providers), store)
    }

    #[tokio::test]
    async fn prepare_turn_persists_user_message_sets_title_and_gates_quota() {
        let (orchestrator, store) = fresh_orchestrator();
        store.create_token("tok1", None, "free", None, None).unwrap();
        let conv = store.create_conversation("tok1").unwrap();

        let prepared = orchestrator
            .prepare_turn(
                &conv.id,
                "tok1",
                Tier::Free,
                None,
                crate::request::ChatTurnInput { message: "hello there".to_string(), file_ids: vec![] },
                None,
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(prepared.provider.name(), "kimi");
        assert_eq!(prepared.messages.len(), 1);
        let rows = store.list_messages(&conv.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, "user");

        let conversations = store.list_conversations("tok1").unwrap();
        assert_eq!(conversations[0].title.as_deref(), Some("hello there"));
    }

    /// §7: the user turn is persisted (step 3) before the quota gate runs
    /// (step 6), so a quota rejection still leaves the turn in history —
    /// intentional, so the client can retry without re-sending the message.
    #[tokio::test]
    async fn quota_rejection_still_leaves_the_user_turn_persisted() {
        let (orchestrator, store) = fresh_orchestrator();
        store.create_token("tok1", None, "free", None, None).unwrap();
        let conv = store.create_conversation("tok1").unwrap();
        store.bump_daily_usage("tok1", &chrono::Utc::now().format("%Y-%m-%d").to_string(), 59_999, 0).unwrap();

        let err = orchestrator
            .prepare_turn(
                &conv.id,
                "tok1",
                Tier::Free,
                None,
                crate::request::ChatTurnInput { message: "x".repeat(100), file_ids: vec![] },
                None,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::QuotaExceeded));
        assert_eq!(store.list_messages(&conv.id).unwrap().len(), 1);
    }
}
