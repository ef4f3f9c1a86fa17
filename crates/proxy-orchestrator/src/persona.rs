use proxy_core::{ChatMessage, MessageContent};
use serde::Deserialize;

/// Bound on the injected prompt (§4.7 step 5: "custom prompts may be
/// user-supplied, length-bounded").
const MAX_PERSONA_PROMPT_CHARS: usize = 4_000;

#[derive(Deserialize)]
struct PersonaConfig {
    prompt: String,
}

/// Parse `User.persona` (an opaque JSON blob) into the system message to
/// prepend, if any. A malformed or empty blob yields no persona rather than
/// an error — a corrupt persona config should never block a chat turn.
pub fn persona_system_message(persona_json: &str) -> Option<ChatMessage> {
    let config: PersonaConfig = serde_json::from_str(persona_json).ok()?;
    let prompt = config.prompt.trim();
    if prompt.is_empty() {
        return None;
    }
    let bounded: String = prompt.chars().take(MAX_PERSONA_PROMPT_CHARS).collect();
    Some(ChatMessage { role: "system".to_string(), content: MessageContent::Text(bounded) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_system_message_from_prompt() {
        let msg = persona_system_message(r#"{"prompt":"speak like a pirate"}"#).unwrap();
        assert_eq!(msg.role, "system");
        assert!(matches!(msg.content, MessageContent::Text(t) if t == "speak like a pirate"));
    }

    #[test]
    fn malformed_json_yields_no_persona() {
        assert!(persona_system_message("not json").is_none());
    }

    #[test]
    fn blank_prompt_yields_no_persona() {
        assert!(persona_system_message(r#"{"prompt":"   "}"#).is_none());
    }

    #[test]
    fn overlong_prompt_is_bounded() {
        let json = serde_json::json!({ "prompt": "x".repeat(MAX_PERSONA_PROMPT_CHARS + 500) }).to_string();
        let msg = persona_system_message(&json).unwrap();
        match msg.content {
            MessageContent::Text(t) => assert_eq!(t.chars().count(), MAX_PERSONA_PROMPT_CHARS),
            _ => panic!("expected text content"),
        }
    }
}
