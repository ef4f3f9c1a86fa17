use std::sync::Arc;

use proxy_providers::InvokeRequest;
use serde::Serialize;

use crate::fanout::{fan_out, FanOutItem};
use crate::turn::{ChatOrchestrator, PreparedTurn};

/// One `data:` frame of a chat stream (§4.7 step 8/9/11). Fields absent
/// from a given case are omitted rather than serialized as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamFrame {
    fn delta(c: char) -> Self {
        Self { delta: Some(c.to_string()), done: false, message_id: None, content: None, error: None }
    }

    fn done(message_id: String, content: String) -> Self {
        Self { delta: Some(String::new()), done: true, message_id: Some(message_id), content: Some(content), error: None }
    }

    fn error(message: String) -> Self {
        Self { delta: None, done: true, message_id: None, content: None, error: Some(message) }
    }
}

/// What the streaming handler yields; `Keepalive` is an SSE comment, not a
/// `data:` frame (§6).
pub enum StreamItem {
    Frame(StreamFrame),
    Keepalive,
}

/// §4.7 steps 7-11: open the upstream stream, drain it through
/// [`fan_out`], and on completion persist the assistant turn and record
/// usage. On client disconnect the returned stream (and the producer task
/// `fan_out` owns) is simply dropped, cancelling it.
pub fn run_stream(orchestrator: Arc<ChatOrchestrator>, prepared: PreparedTurn) -> impl futures_util::Stream<Item = StreamItem> {
    async_stream::stream! {
        let request = InvokeRequest {
            model: prepared.public_model.clone(),
            system: None,
            messages: prepared.messages.clone(),
            max_tokens: prepared.max_output_tokens,
            temperature: None,
        };

        let upstream = match prepared.provider.stream(&request).await {
            Ok(s) => s,
            Err(e) => {
                yield StreamItem::Frame(StreamFrame::error(proxy_core::ProxyError::from(e).to_string()));
                return;
            }
        };

        let drained = fan_out(upstream);
        futures_util::pin_mut!(drained);

        while let Some(item) = futures_util::StreamExt::next(&mut drained).await {
            match item {
                FanOutItem::Delta(ch) => yield StreamItem::Frame(StreamFrame::delta(ch)),
                FanOutItem::Keepalive => yield StreamItem::Keepalive,
                FanOutItem::Error(message) => {
                    yield StreamItem::Frame(StreamFrame::error(message));
                    return;
                }
                FanOutItem::Done(collected) => {
                    let persisted = match orchestrator.persist_assistant_message(&prepared.conversation_id, &collected) {
                        Ok(m) => m,
                        Err(e) => {
                            yield StreamItem::Frame(StreamFrame::error(e.to_string()));
                            return;
                        }
                    };
                    if let Err(e) = orchestrator.record_usage(&prepared.device_token, &prepared.today, prepared.prompt_tokens, &collected) {
                        tracing::warn!(error = %e, "failed to record usage after a completed stream");
                    }
                    yield StreamItem::Frame(StreamFrame::done(persisted.id, collected));
                }
            }
        }
    }
}
