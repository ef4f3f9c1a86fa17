use proxy_core::ProxyError;

/// The inbound shape of a chat turn (§4.7 step 2), already JSON-deserialized
/// by the gateway layer.
#[derive(Debug, Clone, Default)]
pub struct ChatTurnInput {
    pub message: String,
    pub file_ids: Vec<String>,
}

const MAX_MESSAGE_CHARS: usize = 50_000;
const MAX_FILE_IDS: usize = 10;

/// §4.7 step 2: length bound, file-id count/uniqueness, and the
/// "at least one of message or file_ids must be non-empty" rule.
pub fn validate(input: &ChatTurnInput) -> Result<(), ProxyError> {
    if input.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ProxyError::MalformedInput(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    if input.file_ids.len() > MAX_FILE_IDS {
        return Err(ProxyError::MalformedInput(format!("at most {MAX_FILE_IDS} file_ids allowed")));
    }
    let mut seen = std::collections::HashSet::with_capacity(input.file_ids.len());
    for id in &input.file_ids {
        if !seen.insert(id.as_str()) {
            return Err(ProxyError::MalformedInput(format!("duplicate file id {id}")));
        }
    }
    if input.message.trim().is_empty() && input.file_ids.is_empty() {
        return Err(ProxyError::MalformedInput("message or file_ids required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_with_file_ids_is_valid() {
        let input = ChatTurnInput { message: String::new(), file_ids: vec!["f1".to_string()] };
        assert!(validate(&input).is_ok());
    }

    #[test]
    fn empty_message_and_no_files_is_rejected() {
        let input = ChatTurnInput { message: "   ".to_string(), file_ids: vec![] };
        assert!(matches!(validate(&input), Err(ProxyError::MalformedInput(_))));
    }

    #[test]
    fn duplicate_file_ids_are_rejected() {
        let input = ChatTurnInput { message: "hi".to_string(), file_ids: vec!["f1".to_string(), "f1".to_string()] };
        assert!(matches!(validate(&input), Err(ProxyError::MalformedInput(_))));
    }

    #[test]
    fn eleven_file_ids_is_rejected() {
        let file_ids = (0..11).map(|i| format!("f{i}")).collect();
        let input = ChatTurnInput { message: "hi".to_string(), file_ids };
        assert!(matches!(validate(&input), Err(ProxyError::MalformedInput(_))));
    }

    #[test]
    fn message_over_limit_is_rejected() {
        let input = ChatTurnInput { message: "x".repeat(MAX_MESSAGE_CHARS + 1), file_ids: vec![] };
        assert!(matches!(validate(&input), Err(ProxyError::MalformedInput(_))));
    }
}
