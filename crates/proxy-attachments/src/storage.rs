use sha2::{Digest, Sha256};

use crate::error::Result;

/// SHA-256 hex digest over the full payload (§4.6 step 4).
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `{uploads_root}/{sha256}{extension}` — a pure function of the hash, per
/// the invariant in §3. Write is skipped when the path already exists so
/// reuploads of identical bytes reuse the stored file (§4.6 step 4, §8
/// idempotence law).
pub async fn store_bytes(uploads_root: &str, sha256: &str, extension: &str, bytes: &[u8]) -> Result<String> {
    tokio::fs::create_dir_all(uploads_root).await?;
    let path = format!("{uploads_root}/{sha256}{extension}");
    if tokio::fs::metadata(&path).await.is_err() {
        tokio::fs::write(&path, bytes).await?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_for_identical_bytes() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
    }

    #[tokio::test]
    async fn reuploading_identical_bytes_reuses_the_stored_path() {
        let dir = tempdir();
        let hash = content_hash(b"same content");
        let p1 = store_bytes(&dir, &hash, ".txt", b"same content").await.unwrap();
        let p2 = store_bytes(&dir, &hash, ".txt", b"same content").await.unwrap();
        assert_eq!(p1, p2);
        let contents = tokio::fs::read(&p1).await.unwrap();
        assert_eq!(contents, b"same content");
    }

    fn tempdir() -> String {
        let path = std::env::temp_dir().join(format!("proxy-attachments-test-{}", content_hash(&rand_seed())));
        path.to_string_lossy().to_string()
    }

    fn rand_seed() -> Vec<u8> {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
            .to_le_bytes()
            .to_vec()
    }
}
