use base64::Engine;
use proxy_core::{ContentPart, ImageUrl, MessageContent};
use proxy_store::types::ConversationFile;

use crate::error::Result;
use crate::policy::is_image;

/// Build the outbound multimodal content for a user turn (§4.6
/// `compose(user_text, files)`).
///
/// Text-extracted files are prepended as `"[File: {name}]\n{extracted}"`
/// blocks; image files become `image_url` parts carrying the stored bytes
/// as a base64 data URL. `compose(text, [])` is exactly `text` (§8
/// round-trip law).
pub async fn compose(user_text: &str, files: &[ConversationFile]) -> Result<MessageContent> {
    let mut prefix_blocks = Vec::new();
    for file in files {
        if let Some(extracted) = &file.extracted_text {
            prefix_blocks.push(format!("[File: {}]\n{}", file.original_name, extracted));
        }
    }

    let composed = if prefix_blocks.is_empty() {
        user_text.to_string()
    } else {
        format!("{}\n\n{}", prefix_blocks.join("\n\n"), user_text)
    };

    let mut image_parts = Vec::new();
    for file in files {
        if is_image(&file.mime_type) {
            let bytes = tokio::fs::read(&file.stored_path).await?;
            let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
            image_parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url: format!("data:{};base64,{}", file.mime_type, b64) },
            });
        }
    }

    if image_parts.is_empty() {
        Ok(MessageContent::Text(composed))
    } else {
        let mut parts = vec![ContentPart::Text { text: composed }];
        parts.extend(image_parts);
        Ok(MessageContent::Parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mime: &str, extracted: Option<&str>, stored_path: &str) -> ConversationFile {
        ConversationFile {
            id: "f1".to_string(),
            conversation_id: "c1".to_string(),
            original_name: name.to_string(),
            stored_path: stored_path.to_string(),
            sha256: "deadbeef".to_string(),
            mime_type: mime.to_string(),
            size_bytes: 5,
            extracted_text: extracted.map(String::from),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn compose_with_no_files_is_identity() {
        let content = compose("hello", &[]).await.unwrap();
        assert!(matches!(content, MessageContent::Text(t) if t == "hello"));
    }

    #[tokio::test]
    async fn text_file_is_prepended() {
        let files = vec![file("note.txt", "text/plain", Some("hello"), "")];
        let content = compose("see attached", &files).await.unwrap();
        match content {
            MessageContent::Text(t) => assert_eq!(t, "[File: note.txt]\nhello\n\nsee attached"),
            _ => panic!("expected text content"),
        }
    }

    #[tokio::test]
    async fn image_file_becomes_multimodal_parts() {
        let dir = std::env::temp_dir().join("proxy-attachments-compose-test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("pixel.png");
        tokio::fs::write(&path, b"\x89PNG fake bytes").await.unwrap();

        let files = vec![file("pixel.png", "image/png", None, path.to_str().unwrap())];
        let content = compose("see attached", &files).await.unwrap();
        match content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(&parts[0], ContentPart::Text { text } if text == "see attached"));
                match &parts[1] {
                    ContentPart::ImageUrl { image_url } => assert!(image_url.url.starts_with("data:image/png;base64,")),
                    _ => panic!("expected image part"),
                }
            }
            _ => panic!("expected multimodal parts"),
        }
    }
}
