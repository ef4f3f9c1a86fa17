use std::sync::Arc;

use proxy_store::types::ConversationFile;
use proxy_store::Store;

use crate::error::{AttachmentError, Result};
use crate::extract::extract_text;
use crate::policy;
use crate::sniff::sniff;
use crate::storage::{content_hash, store_bytes};

/// `{uploads_root}/{sha256}{ext}`, sniffing, size policy, storage, text
/// extraction, and the store insert, in the order §4.6 lists them
/// (steps 2-6; step 1, multipart parsing, happens at the edge).
pub struct AttachmentPipeline {
    store: Arc<Store>,
    uploads_root: String,
    max_image_bytes: u64,
    max_file_bytes: u64,
}

impl AttachmentPipeline {
    pub fn new(store: Arc<Store>, uploads_root: String, max_image_bytes: u64, max_file_bytes: u64) -> Self {
        Self { store, uploads_root, max_image_bytes, max_file_bytes }
    }

    /// Ingest-level hard cap independent of per-MIME policy (§4.6): a body
    /// larger than `max_file_size + 2 MiB` is rejected before any sniffing.
    pub fn ingest_hard_cap(&self) -> u64 {
        self.max_file_bytes.max(self.max_image_bytes) + 2 * 1024 * 1024
    }

    pub async fn ingest(
        &self,
        conversation_id: &str,
        device_token: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<ConversationFile> {
        if bytes.len() as u64 > self.ingest_hard_cap() {
            return Err(AttachmentError::PayloadTooLarge { size: bytes.len(), max: self.ingest_hard_cap() as usize });
        }

        let safe_name = path_strip(original_name);
        let sniffed = sniff(bytes, &safe_name);
        policy::enforce(&sniffed, bytes.len(), self.max_image_bytes, self.max_file_bytes)?;

        let sha256 = content_hash(bytes);
        if let Some(existing) = self.store.find_by_sha256(&sha256)? {
            // Same bytes already on disk somewhere; reuse the path but still
            // insert a fresh row scoped to this conversation (§4.6 step 4/6).
            return Ok(self
                .store
                .insert_conversation_file(
                    conversation_id,
                    device_token,
                    &safe_name,
                    &existing.stored_path,
                    &sha256,
                    sniffed.mime_type,
                    bytes.len() as i64,
                    existing.extracted_text.as_deref(),
                )?);
        }

        let stored_path = store_bytes(&self.uploads_root, &sha256, sniffed.extension, bytes).await?;
        let extracted_text = extract_text(bytes, sniffed.mime_type);

        Ok(self.store.insert_conversation_file(
            conversation_id,
            device_token,
            &safe_name,
            &stored_path,
            &sha256,
            sniffed.mime_type,
            bytes.len() as i64,
            extracted_text.as_deref(),
        )?)
    }
}

/// Strip any directory components from a client-supplied filename so a
/// path-traversal attempt (`../../etc/passwd.txt`) degrades to its basename.
fn path_strip(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn fresh_pipeline(uploads_root: &str) -> AttachmentPipeline {
        let conn = Connection::open_in_memory().unwrap();
        proxy_store::db::init_db(&conn).unwrap();
        let store = Arc::new(Store::new(conn));
        store.create_token("tok1", None, "free", None, None).unwrap();
        store.create_conversation("tok1").unwrap();
        AttachmentPipeline::new(store, uploads_root.to_string(), 10 * 1024 * 1024, 20 * 1024 * 1024)
    }

    fn scratch_dir(label: &str) -> String {
        std::env::temp_dir().join(format!("proxy-attachments-ingest-{label}")).to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn ingest_strips_path_traversal_from_filename() {
        let pipeline = fresh_pipeline(&scratch_dir("traversal"));
        let conv = pipeline.store.list_conversations("tok1").unwrap().remove(0);
        let file = pipeline
            .ingest(&conv.id, "tok1", "../../etc/passwd.txt", b"safe data")
            .await
            .unwrap();
        assert_eq!(file.original_name, "passwd.txt");
        assert!(!file.stored_path.contains(".."));
    }

    #[tokio::test]
    async fn ingest_rejects_unsupported_mime() {
        let pipeline = fresh_pipeline(&scratch_dir("unsupported"));
        let conv = pipeline.store.list_conversations("tok1").unwrap().remove(0);
        let err = pipeline.ingest(&conv.id, "tok1", "payload.exe", b"MZ\x90\x00fake").await.unwrap_err();
        assert!(matches!(err, AttachmentError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn reingesting_identical_bytes_reuses_stored_path() {
        let pipeline = fresh_pipeline(&scratch_dir("reupload"));
        let conv = pipeline.store.list_conversations("tok1").unwrap().remove(0);
        let f1 = pipeline.ingest(&conv.id, "tok1", "a.txt", b"same bytes").await.unwrap();
        let f2 = pipeline.ingest(&conv.id, "tok1", "b.txt", b"same bytes").await.unwrap();
        assert_eq!(f1.stored_path, f2.stored_path);
        assert_ne!(f1.id, f2.id);
    }
}
