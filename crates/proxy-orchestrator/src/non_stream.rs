use proxy_providers::{InvokeRequest, Usage};
use proxy_store::types::Message;

use crate::turn::{ChatOrchestrator, PreparedTurn};

/// Result of a completed non-streaming turn (§4.7, collapsed variant):
/// the persisted assistant row plus the usage the upstream call reported.
pub struct NonStreamTurn {
    pub message: Message,
    pub usage: Usage,
}

/// §4.7 non-streaming variant: steps 7-11 collapse to one `Invoke` and one
/// response.
pub async fn run_non_stream(orchestrator: &ChatOrchestrator, prepared: PreparedTurn) -> proxy_core::Result<NonStreamTurn> {
    let request = InvokeRequest {
        model: prepared.public_model.clone(),
        system: None,
        messages: prepared.messages,
        max_tokens: prepared.max_output_tokens,
        temperature: None,
    };

    let completion = prepared.provider.invoke(&request).await?;
    let content = completion.choices.first().map(|c| c.message.content.clone()).unwrap_or_default();

    let message = orchestrator.persist_assistant_message(&prepared.conversation_id, &content)?;
    orchestrator.record_usage(&prepared.device_token, &prepared.today, prepared.prompt_tokens, &content)?;

    Ok(NonStreamTurn { message, usage: completion.usage })
}
