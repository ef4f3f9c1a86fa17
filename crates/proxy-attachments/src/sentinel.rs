use serde::{Deserialize, Serialize};

const META_OPEN: &str = "[[MESSAGE_META]]";
const META_CLOSE: &str = "[[/MESSAGE_META]]";

/// The JSON payload carried between the sentinel markers (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageMeta {
    pub file_ids: Vec<String>,
    pub files: Vec<FileMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMeta {
    pub id: String,
    pub name: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub url: String,
}

/// `[[MESSAGE_META]]{json}[[/MESSAGE_META]]{body}` (§4.6).
pub fn encode(body: &str, meta: &MessageMeta) -> String {
    let json = serde_json::to_string(meta).unwrap_or_else(|_| "{}".to_string());
    format!("{META_OPEN}{json}{META_CLOSE}{body}")
}

/// Readers must tolerate the sentinel being absent (§4.6): returns the
/// parsed meta (if present and well-formed) and the body with the sentinel
/// stripped.
pub fn decode(content: &str) -> (Option<MessageMeta>, &str) {
    let Some(after_open) = content.strip_prefix(META_OPEN) else {
        return (None, content);
    };
    let Some(close_idx) = after_open.find(META_CLOSE) else {
        return (None, content);
    };
    let json = &after_open[..close_idx];
    let body = &after_open[close_idx + META_CLOSE.len()..];
    match serde_json::from_str::<MessageMeta>(json) {
        Ok(meta) => (Some(meta), body),
        Err(_) => (None, content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> MessageMeta {
        MessageMeta {
            file_ids: vec!["f1".to_string(), "f2".to_string()],
            files: vec![FileMeta {
                id: "f1".to_string(),
                name: "note.txt".to_string(),
                size: 5,
                mime_type: "text/plain".to_string(),
                url: "/v1/files/f1".to_string(),
            }],
        }
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let meta = sample_meta();
        let encoded = encode("see attached", &meta);
        let (decoded_meta, body) = decode(&encoded);
        assert_eq!(decoded_meta, Some(meta));
        assert_eq!(body, "see attached");
    }

    #[test]
    fn absent_sentinel_is_tolerated() {
        let (meta, body) = decode("plain message, no attachments");
        assert_eq!(meta, None);
        assert_eq!(body, "plain message, no attachments");
    }

    #[test]
    fn malformed_sentinel_json_falls_back_to_whole_content_as_body() {
        let broken = format!("{META_OPEN}not json{META_CLOSE}body text");
        let (meta, body) = decode(&broken);
        assert_eq!(meta, None);
        assert_eq!(body, broken);
    }
}
