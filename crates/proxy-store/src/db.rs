use rusqlite::Connection;

use crate::error::Result;

/// Initialise every table and index the schema needs.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout so older
/// databases tolerate new, nullable columns and new indexes (§4.1).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                TEXT PRIMARY KEY,
            email             TEXT NOT NULL,
            password_hash     TEXT,
            external_subject  TEXT,
            tier              TEXT NOT NULL DEFAULT 'free' CHECK (tier IN ('free','pro','max')),
            persona           TEXT,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL,
            last_refresh_at   TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(email);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_external_subject
            ON users(external_subject) WHERE external_subject IS NOT NULL;

        CREATE TABLE IF NOT EXISTS device_tokens (
            token       TEXT PRIMARY KEY,
            user_id     TEXT,
            tier        TEXT NOT NULL CHECK (tier IN ('free','pro','max')),
            status      TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active','disabled')),
            expires_at  TEXT,
            created_at  TEXT NOT NULL,
            note        TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_device_tokens_user ON device_tokens(user_id);

        CREATE TABLE IF NOT EXISTS usage_daily (
            token              TEXT NOT NULL,
            day                TEXT NOT NULL,
            prompt_tokens      INTEGER NOT NULL DEFAULT 0,
            completion_tokens  INTEGER NOT NULL DEFAULT 0,
            requests           INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (token, day)
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id            TEXT PRIMARY KEY,
            device_token  TEXT NOT NULL,
            title         TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_token_updated
            ON conversations(device_token, updated_at DESC);

        CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL,
            role             TEXT NOT NULL CHECK (role IN ('user','assistant','system')),
            content          TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conv_created
            ON messages(conversation_id, created_at ASC, rowid ASC);

        CREATE TABLE IF NOT EXISTS conversation_files (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL,
            original_name    TEXT NOT NULL,
            stored_path      TEXT NOT NULL,
            sha256           TEXT NOT NULL,
            mime_type        TEXT NOT NULL,
            size_bytes       INTEGER NOT NULL,
            extracted_text   TEXT,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversation_files_conv_created
            ON conversation_files(conversation_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS user_exports (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            path        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_user_exports_user ON user_exports(user_id);",
    )?;
    Ok(())
}
