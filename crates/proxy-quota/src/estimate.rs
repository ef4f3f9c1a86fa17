use proxy_core::ChatMessage;

/// `max(1, ceil(len(text)/4))` for any string (§4.4).
pub fn approx_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    (((text.chars().count() as u64) + 3) / 4).max(1)
}

/// Sum of `approx_tokens` over every message's text content; for a
/// multimodal message only the `text` parts contribute (§4.4).
pub fn messages_approx_tokens(messages: &[ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|m| approx_tokens(&m.content.text_for_estimation()))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_core::{ContentPart, ImageUrl, MessageContent};

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(approx_tokens(""), 0);
    }

    #[test]
    fn single_char_rounds_up_to_one() {
        assert_eq!(approx_tokens("a"), 1);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(approx_tokens("abcd"), 1);
        assert_eq!(approx_tokens("abcde"), 2);
    }

    #[test]
    fn multimodal_counts_text_parts_only() {
        let msg = ChatMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "hello world!".to_string() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: "data:image/png;base64,AAAA".to_string() },
                },
            ]),
        };
        assert_eq!(messages_approx_tokens(&[msg]), approx_tokens("hello world!"));
    }
}
