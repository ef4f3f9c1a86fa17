use serde::{Deserialize, Serialize};

/// A registered user (§3 User).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Argon2 hash; absent for external-identity-only accounts.
    pub password_hash: Option<String>,
    /// Apple `sub` claim; unique when present.
    pub external_subject: Option<String>,
    pub tier: String,
    /// Opaque persona configuration blob (JSON), injected as a system
    /// message prompt per §4.7 step 5.
    pub persona: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_refresh_at: Option<String>,
}

/// A bearer credential (§3 DeviceToken). `user_id` is null only for
/// legacy admin-minted tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    pub token: String,
    pub user_id: Option<String>,
    pub tier: String,
    pub status: String,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub note: Option<String>,
}

impl DeviceToken {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// True when `expires_at` is set and not in the future — an expired
    /// token is treated as absent regardless of `status` (§3 invariant).
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        match &self.expires_at {
            None => false,
            Some(ts) => match chrono::DateTime::parse_from_rfc3339(ts) {
                Ok(exp) => now >= exp,
                Err(_) => false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub device_token: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
    /// Insertion-order tie-break for messages sharing a `created_at` (§3, §8).
    pub seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationFile {
    pub id: String,
    pub conversation_id: String,
    pub original_name: String,
    pub stored_path: String,
    pub sha256: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub extracted_text: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DailyUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub requests: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserExport {
    pub id: String,
    pub user_id: String,
    pub path: String,
    pub created_at: String,
}
