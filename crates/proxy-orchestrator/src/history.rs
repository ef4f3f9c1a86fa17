use std::sync::Arc;

use proxy_attachments::decode_sentinel;
use proxy_core::{ChatMessage, MessageContent};
use proxy_store::types::Message;
use proxy_store::Store;

/// §4.7 step 4: for each persisted row, strip the message-meta sentinel (if
/// any) and rebuild the multimodal content §4.6's `compose` would have sent
/// upstream, so history replays the same content a live turn saw.
pub async fn reconstruct(store: &Arc<Store>, conversation_id: &str, row: &Message) -> proxy_core::Result<ChatMessage> {
    let (meta, body) = decode_sentinel(&row.content);
    let content = match meta {
        Some(meta) if !meta.file_ids.is_empty() => {
            let files = store.resolve_owned_files(conversation_id, &meta.file_ids)?;
            proxy_attachments::compose(body, &files).await?
        }
        _ => MessageContent::Text(body.to_string()),
    };
    Ok(ChatMessage { role: row.role.clone(), content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_store::db::init_db;
    use rusqlite::Connection;

    fn fresh_store() -> Arc<Store> {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        Arc::new(Store::new(conn))
    }

    #[tokio::test]
    async fn plain_row_without_sentinel_becomes_text() {
        let store = fresh_store();
        store.create_token("tok1", None, "free", None, None).unwrap();
        let conv = store.create_conversation("tok1").unwrap();
        let row = store.persist_message(&conv.id, "tok1", "user", "hello there").unwrap();

        let msg = reconstruct(&store, &conv.id, &row).await.unwrap();
        assert!(matches!(msg.content, MessageContent::Text(t) if t == "hello there"));
        assert_eq!(msg.role, "user");
    }
}
