use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::types::{Conversation, ConversationFile, DailyUsage, DeviceToken, Message, User};

/// Single embedded-datastore writer (§4.1). Wraps one `rusqlite::Connection`
/// in a `Mutex` — every mutation runs inside a transaction and every read
/// that feeds a subsequent write re-verifies ownership inside that same
/// transaction, so two concurrent handlers can never race past an
/// ownership check (TOCTOU).
pub struct Store {
    db: Mutex<Connection>,
}

impl Store {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    // ── Users ────────────────────────────────────────────────────────────

    #[instrument(skip(self, password_hash), fields(email))]
    pub fn create_user(
        &self,
        email: &str,
        password_hash: Option<&str>,
        external_subject: Option<&str>,
        tier: &str,
    ) -> Result<User> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO users (id, email, password_hash, external_subject, tier, persona, created_at, updated_at, last_refresh_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6, NULL)",
            params![id, email, password_hash, external_subject, tier, now],
        )
        .map_err(|e| map_unique_violation(e, "email or external identity already in use"))?;

        self.get_user_locked(&db, &id)
    }

    #[instrument(skip(self))]
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let db = self.db.lock().unwrap();
        query_optional(&db, USER_SELECT_SQL, params![id], row_to_user)
    }

    #[instrument(skip(self))]
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let db = self.db.lock().unwrap();
        query_optional(
            &db,
            "SELECT id, email, password_hash, external_subject, tier, persona, created_at, updated_at, last_refresh_at
             FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )
    }

    #[instrument(skip(self))]
    pub fn get_user_by_external_subject(&self, subject: &str) -> Result<Option<User>> {
        let db = self.db.lock().unwrap();
        query_optional(
            &db,
            "SELECT id, email, password_hash, external_subject, tier, persona, created_at, updated_at, last_refresh_at
             FROM users WHERE external_subject = ?1",
            params![subject],
            row_to_user,
        )
    }

    #[instrument(skip(self))]
    pub fn link_external_subject(&self, user_id: &str, subject: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE users SET external_subject = ?2, updated_at = ?3 WHERE id = ?1",
            params![user_id, subject, now],
        )
        .map_err(|e| map_unique_violation(e, "external identity already bound to a different user"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn touch_last_refresh(&self, user_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE users SET last_refresh_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![user_id, now],
        )?;
        Ok(())
    }

    fn get_user_locked(&self, db: &Connection, id: &str) -> Result<User> {
        query_optional(db, USER_SELECT_SQL, params![id], row_to_user)?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    // ── Device tokens ────────────────────────────────────────────────────

    /// Mint a fresh token for `user_id` (or `None` for a legacy admin token).
    #[instrument(skip(self))]
    pub fn create_token(
        &self,
        token: &str,
        user_id: Option<&str>,
        tier: &str,
        ttl_days: Option<i64>,
        note: Option<&str>,
    ) -> Result<DeviceToken> {
        let now = Utc::now();
        let expires_at = ttl_days.map(|d| (now + chrono::Duration::days(d)).to_rfc3339());
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO device_tokens (token, user_id, tier, status, expires_at, created_at, note)
             VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?6)",
            params![token, user_id, tier, expires_at, now.to_rfc3339(), note],
        )?;
        self.get_token_locked(&db, token)
    }

    #[instrument(skip(self))]
    pub fn get_token(&self, token: &str) -> Result<Option<DeviceToken>> {
        let db = self.db.lock().unwrap();
        query_optional(&db, TOKEN_SELECT_SQL, params![token], row_to_token)
    }

    fn get_token_locked(&self, db: &Connection, token: &str) -> Result<DeviceToken> {
        query_optional(db, TOKEN_SELECT_SQL, params![token], row_to_token)?
            .ok_or_else(|| StoreError::NotFound(format!("token {token}")))
    }

    #[instrument(skip(self))]
    pub fn set_token_tier(&self, token: &str, tier: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE device_tokens SET tier = ?2 WHERE token = ?1",
            params![token, tier],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("token {token}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn disable_token(&self, token: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE device_tokens SET status = 'disabled' WHERE token = ?1",
            params![token],
        )?;
        Ok(())
    }

    /// Mint `new_token` and atomically rewrite every token-keyed ownership
    /// reference from `old_token` to it, then disable `old_token` (§4.2
    /// RefreshToken). All in one transaction.
    #[instrument(skip(self))]
    pub fn refresh_token(
        &self,
        old_token: &str,
        new_token: &str,
        user_id: Option<&str>,
        tier: &str,
        ttl_days: i64,
    ) -> Result<DeviceToken> {
        let now = Utc::now();
        let expires_at = (now + chrono::Duration::days(ttl_days)).to_rfc3339();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        tx.execute(
            "INSERT INTO device_tokens (token, user_id, tier, status, expires_at, created_at, note)
             VALUES (?1, ?2, ?3, 'active', ?4, ?5, NULL)",
            params![new_token, user_id, tier, expires_at, now.to_rfc3339()],
        )?;
        tx.execute(
            "UPDATE conversations SET device_token = ?2 WHERE device_token = ?1",
            params![old_token, new_token],
        )?;
        tx.execute(
            "UPDATE usage_daily SET token = ?2 WHERE token = ?1",
            params![old_token, new_token],
        )?;
        tx.execute(
            "UPDATE device_tokens SET status = 'disabled' WHERE token = ?1",
            params![old_token],
        )?;
        tx.commit()?;

        drop(db);
        let db = self.db.lock().unwrap();
        self.get_token_locked(&db, new_token)
    }

    // ── Daily usage ──────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub fn get_daily_usage(&self, token: &str, day: &str) -> Result<DailyUsage> {
        let db = self.db.lock().unwrap();
        let usage = db
            .query_row(
                "SELECT prompt_tokens, completion_tokens, requests FROM usage_daily WHERE token = ?1 AND day = ?2",
                params![token, day],
                |row| {
                    Ok(DailyUsage {
                        prompt_tokens: row.get(0)?,
                        completion_tokens: row.get(1)?,
                        requests: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(usage.unwrap_or_default())
    }

    /// Atomically upsert `(+prompt_tokens, +completion_tokens, +1 request)`
    /// for `(token, day)` (§4.4 step after a successful upstream call).
    #[instrument(skip(self))]
    pub fn bump_daily_usage(
        &self,
        token: &str,
        day: &str,
        prompt_tokens: i64,
        completion_tokens: i64,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO usage_daily (token, day, prompt_tokens, completion_tokens, requests)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(token, day) DO UPDATE SET
               prompt_tokens = prompt_tokens + excluded.prompt_tokens,
               completion_tokens = completion_tokens + excluded.completion_tokens,
               requests = requests + 1",
            params![token, day, prompt_tokens, completion_tokens],
        )?;
        Ok(())
    }

    // ── Conversations ────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub fn create_conversation(&self, device_token: &str) -> Result<Conversation> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO conversations (id, device_token, title, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?3)",
            params![id, device_token, now],
        )?;
        Ok(Conversation {
            id,
            device_token: device_token.to_string(),
            title: None,
            created_at: now.clone(),
            updated_at: now,
            message_count: 0,
        })
    }

    /// List conversations owned by `device_token`, newest-updated first,
    /// with `message_count` per §6.
    #[instrument(skip(self))]
    pub fn list_conversations(&self, device_token: &str) -> Result<Vec<Conversation>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT c.id, c.device_token, c.title, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
             FROM conversations c
             WHERE c.device_token = ?1
             ORDER BY c.updated_at DESC",
        )?;
        let rows = stmt.query_map(params![device_token], row_to_conversation)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Fetch a conversation, requiring it be owned by `device_token` — the
    /// ownership check the spec calls out as not-found, not forbidden,
    /// so callers cannot probe for the existence of others' conversations.
    #[instrument(skip(self))]
    pub fn get_owned_conversation(
        &self,
        conversation_id: &str,
        device_token: &str,
    ) -> Result<Conversation> {
        let db = self.db.lock().unwrap();
        self.get_owned_conversation_tx(&db, conversation_id, device_token)
    }

    fn get_owned_conversation_tx(
        &self,
        db: &Connection,
        conversation_id: &str,
        device_token: &str,
    ) -> Result<Conversation> {
        query_optional(
            db,
            "SELECT id, device_token, title, created_at, updated_at, 0
             FROM conversations WHERE id = ?1 AND device_token = ?2",
            params![conversation_id, device_token],
            row_to_conversation,
        )?
        .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id}")))
    }

    #[instrument(skip(self))]
    pub fn delete_conversation(&self, conversation_id: &str, device_token: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        {
            let changed = tx.execute(
                "DELETE FROM conversations WHERE id = ?1 AND device_token = ?2",
                params![conversation_id, device_token],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("conversation {conversation_id}")));
            }
            tx.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
            )?;
            tx.execute(
                "DELETE FROM conversation_files WHERE conversation_id = ?1",
                params![conversation_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Set `title` only if it is currently null (§4.7 step 3).
    #[instrument(skip(self))]
    pub fn set_title_if_absent(&self, conversation_id: &str, title: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE conversations SET title = ?2 WHERE id = ?1 AND title IS NULL",
            params![conversation_id, title],
        )?;
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Verify ownership and persist a message in one transaction (TOCTOU-safe,
    /// §4.1/§4.7 step 3). Bumps `updated_at`.
    #[instrument(skip(self, content))]
    pub fn persist_message(
        &self,
        conversation_id: &str,
        device_token: &str,
        role: &str,
        content: &str,
    ) -> Result<Message> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        {
            let owned: Option<String> = tx
                .query_row(
                    "SELECT id FROM conversations WHERE id = ?1 AND device_token = ?2",
                    params![conversation_id, device_token],
                    |row| row.get(0),
                )
                .optional()?;
            if owned.is_none() {
                return Err(StoreError::NotFound(format!("conversation {conversation_id}")));
            }

            let id = Uuid::now_v7().to_string();
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, conversation_id, role, content, now],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                params![conversation_id, now],
            )?;
            tx.commit()?;

            let seq = db.last_insert_rowid();
            return Ok(Message {
                id,
                conversation_id: conversation_id.to_string(),
                role: role.to_string(),
                content: content.to_string(),
                created_at: now,
                seq,
            });
        }
    }

    /// All messages for a conversation in insertion order (§3, §8).
    #[instrument(skip(self))]
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, conversation_id, role, content, created_at, rowid
             FROM messages WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ── Attachments ──────────────────────────────────────────────────────

    #[instrument(skip(self, extracted_text))]
    #[allow(clippy::too_many_arguments)]
    pub fn insert_conversation_file(
        &self,
        conversation_id: &str,
        device_token: &str,
        original_name: &str,
        stored_path: &str,
        sha256: &str,
        mime_type: &str,
        size_bytes: i64,
        extracted_text: Option<&str>,
    ) -> Result<ConversationFile> {
        let db = self.db.lock().unwrap();
        // Verify ownership before inserting (§4.6 step 6).
        self.get_owned_conversation_tx(&db, conversation_id, device_token)?;

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO conversation_files
             (id, conversation_id, original_name, stored_path, sha256, mime_type, size_bytes, extracted_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![id, conversation_id, original_name, stored_path, sha256, mime_type, size_bytes, extracted_text, now],
        )?;
        Ok(ConversationFile {
            id,
            conversation_id: conversation_id.to_string(),
            original_name: original_name.to_string(),
            stored_path: stored_path.to_string(),
            sha256: sha256.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes,
            extracted_text: extracted_text.map(String::from),
            created_at: now,
        })
    }

    #[instrument(skip(self))]
    pub fn get_file(&self, file_id: &str) -> Result<Option<ConversationFile>> {
        let db = self.db.lock().unwrap();
        query_optional(
            &db,
            "SELECT id, conversation_id, original_name, stored_path, sha256, mime_type, size_bytes, extracted_text, created_at
             FROM conversation_files WHERE id = ?1",
            params![file_id],
            row_to_file,
        )
    }

    /// Resolve `file_ids` to rows, rejecting any id not owned by `conversation_id`
    /// (§4.7 step 3). Preserves input order.
    #[instrument(skip(self))]
    pub fn resolve_owned_files(
        &self,
        conversation_id: &str,
        file_ids: &[String],
    ) -> Result<Vec<ConversationFile>> {
        let db = self.db.lock().unwrap();
        let mut out = Vec::with_capacity(file_ids.len());
        for id in file_ids {
            let file = query_optional(
                &db,
                "SELECT id, conversation_id, original_name, stored_path, sha256, mime_type, size_bytes, extracted_text, created_at
                 FROM conversation_files WHERE id = ?1 AND conversation_id = ?2",
                params![id, conversation_id],
                row_to_file,
            )?
            .ok_or_else(|| StoreError::NotFound(format!("file {id}")))?;
            out.push(file);
        }
        Ok(out)
    }

    /// Reuse an existing stored file with the same content hash, if present,
    /// scoped globally (the stored path is a pure function of the hash per §4.6).
    #[instrument(skip(self))]
    pub fn find_by_sha256(&self, sha256: &str) -> Result<Option<ConversationFile>> {
        let db = self.db.lock().unwrap();
        query_optional(
            &db,
            "SELECT id, conversation_id, original_name, stored_path, sha256, mime_type, size_bytes, extracted_text, created_at
             FROM conversation_files WHERE sha256 = ?1 LIMIT 1",
            params![sha256],
            row_to_file,
        )
    }

    /// Persist the assistant reply and bump the conversation's `updated_at`
    /// in one transaction (§4.7 step 11).
    #[instrument(skip(self, content))]
    pub fn persist_assistant_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, 'assistant', ?3, ?4)",
            params![id, conversation_id, content, now],
        )?;
        tx.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![conversation_id, now],
        )?;
        tx.commit()?;
        let seq = db.last_insert_rowid();
        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            role: "assistant".to_string(),
            content: content.to_string(),
            created_at: now,
            seq,
        })
    }
}

const USER_SELECT_SQL: &str = "SELECT id, email, password_hash, external_subject, tier, persona, created_at, updated_at, last_refresh_at
     FROM users WHERE id = ?1";

const TOKEN_SELECT_SQL: &str =
    "SELECT token, user_id, tier, status, expires_at, created_at, note FROM device_tokens WHERE token = ?1";

fn query_optional<T, P, F>(db: &Connection, sql: &str, params: P, f: F) -> Result<Option<T>>
where
    P: rusqlite::Params,
    F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    db.query_row(sql, params, f).optional().map_err(StoreError::from)
}

fn map_unique_violation(e: rusqlite::Error, message: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::Conflict(message.to_string());
        }
    }
    StoreError::Database(e)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        external_subject: row.get(3)?,
        tier: row.get(4)?,
        persona: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        last_refresh_at: row.get(8)?,
    })
}

fn row_to_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceToken> {
    Ok(DeviceToken {
        token: row.get(0)?,
        user_id: row.get(1)?,
        tier: row.get(2)?,
        status: row.get(3)?,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
        note: row.get(6)?,
    })
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        device_token: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        message_count: row.get(5)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        seq: row.get(5)?,
    })
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationFile> {
    Ok(ConversationFile {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        original_name: row.get(2)?,
        stored_path: row.get(3)?,
        sha256: row.get(4)?,
        mime_type: row.get(5)?,
        size_bytes: row.get(6)?,
        extracted_text: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_store() -> Store {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        Store::new(conn)
    }

    #[test]
    fn create_and_fetch_user_roundtrips() {
        let store = fresh_store();
        let user = store
            .create_user("a@b.c", Some("hash"), None, "free")
            .unwrap();
        let fetched = store.get_user(&user.id).unwrap().unwrap();
        assert_eq!(fetched.email, "a@b.c");
        assert_eq!(fetched.tier, "free");
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let store = fresh_store();
        store.create_user("dup@b.c", Some("h"), None, "free").unwrap();
        let err = store
            .create_user("dup@b.c", Some("h2"), None, "free")
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn refresh_token_rewrites_ownership() {
        let store = fresh_store();
        let user = store.create_user("x@y.z", Some("h"), None, "free").unwrap();
        store
            .create_token("T1", Some(&user.id), "free", Some(30), None)
            .unwrap();
        let convo = store.create_conversation("T1").unwrap();
        store.bump_daily_usage("T1", "2026-01-01", 10, 5).unwrap();

        store
            .refresh_token("T1", "T2", Some(&user.id), "free", 30)
            .unwrap();

        let old = store.get_token("T1").unwrap().unwrap();
        assert_eq!(old.status, "disabled");
        let new = store.get_token("T2").unwrap().unwrap();
        assert!(new.is_active());

        let moved = store.get_owned_conversation(&convo.id, "T2").unwrap();
        assert_eq!(moved.device_token, "T2");
        assert!(store.get_owned_conversation(&convo.id, "T1").is_err());

        let usage = store.get_daily_usage("T2", "2026-01-01").unwrap();
        assert_eq!(usage.prompt_tokens, 10);
    }

    #[test]
    fn messages_preserve_insertion_order() {
        let store = fresh_store();
        store
            .create_token("T1", None, "free", None, Some("admin"))
            .unwrap();
        let convo = store.create_conversation("T1").unwrap();
        store
            .persist_message(&convo.id, "T1", "user", "first")
            .unwrap();
        store
            .persist_message(&convo.id, "T1", "assistant", "second")
            .unwrap();
        let history = store.list_messages(&convo.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
    }

    #[test]
    fn persist_message_rejects_unowned_conversation() {
        let store = fresh_store();
        store.create_token("T1", None, "free", None, None).unwrap();
        store.create_token("T2", None, "free", None, None).unwrap();
        let convo = store.create_conversation("T1").unwrap();
        let err = store
            .persist_message(&convo.id, "T2", "user", "hi")
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
