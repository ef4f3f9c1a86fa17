use proxy_core::ChatMessage;

use crate::estimate::messages_approx_tokens;

/// Drop the oldest non-system messages one by one until the remaining set
/// fits `max_context_tokens`; system messages are never dropped (§4.4
/// step 1).
pub fn truncate_messages_to_fit(messages: Vec<ChatMessage>, max_context_tokens: u64) -> Vec<ChatMessage> {
    let (system, mut kept): (Vec<_>, Vec<_>) = messages.into_iter().partition(|m| m.role == "system");

    while !kept.is_empty() {
        let combined_len = messages_approx_tokens(&system) + messages_approx_tokens(&kept);
        if combined_len <= max_context_tokens {
            break;
        }
        kept.remove(0);
    }

    let mut out = system;
    out.extend(kept);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_core::MessageContent;

    fn msg(role: &str, text: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: MessageContent::Text(text.to_string()),
        }
    }

    #[test]
    fn keeps_everything_when_under_budget() {
        let messages = vec![msg("system", "be nice"), msg("user", "hi")];
        let kept = truncate_messages_to_fit(messages.clone(), 1_000);
        assert_eq!(kept.len(), messages.len());
    }

    #[test]
    fn drops_oldest_non_system_first() {
        let messages = vec![
            msg("system", "sys"),
            msg("user", &"a".repeat(40)),
            msg("assistant", &"b".repeat(40)),
            msg("user", &"c".repeat(40)),
        ];
        // sys=1 token, each of the three ~10 tokens; budget fits system + last two only.
        let kept = truncate_messages_to_fit(messages, 21);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].role, "system");
        assert!(matches!(&kept[1].content, MessageContent::Text(t) if t.starts_with('b')));
        assert!(matches!(&kept[2].content, MessageContent::Text(t) if t.starts_with('c')));
    }

    #[test]
    fn never_drops_system_messages() {
        let messages = vec![msg("system", &"s".repeat(100_000))];
        let kept = truncate_messages_to_fit(messages, 1);
        assert_eq!(kept.len(), 1);
    }
}
