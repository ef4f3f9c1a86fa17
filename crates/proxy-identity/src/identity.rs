use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::instrument;

use proxy_core::config::{IdentityConfig, REFRESH_WINDOW_DAYS, TOKEN_PREFIX, TOKEN_TTL_DAYS};
use proxy_core::Tier;
use proxy_store::types::{DeviceToken, User};
use proxy_store::Store;

use crate::error::{IdentityError, Result};
use crate::jwks::JwksCache;
use crate::lockout::LoginLockout;
use crate::password;

/// A freshly issued or refreshed credential, the common shape every Identity
/// operation that mints a token returns (§4.2).
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub user_id: Option<String>,
    pub token: String,
    pub tier: Tier,
    pub expires_at: String,
}

/// Outcome of `ExternalIdentityLogin`, distinguishing a brand-new account
/// from a resolved existing one (§4.2 step c vs a/b).
#[derive(Debug, Clone)]
pub struct ExternalLoginResult {
    pub issued: IssuedToken,
    pub created: bool,
}

/// Register/login/external-identity/refresh/`RequireUser` (§4.2), backed by
/// the single `proxy-store::Store` writer and the two in-memory containers
/// (login lockout, JWKS cache) called out in §5.
pub struct Identity {
    store: Arc<Store>,
    config: IdentityConfig,
    lockout: LoginLockout,
    jwks: JwksCache,
}

impl Identity {
    pub fn new(store: Arc<Store>, config: IdentityConfig) -> Self {
        let jwks = JwksCache::new(config.apple_jwks_url.clone(), config.jwks_cache_ttl_secs);
        Self {
            store,
            config,
            lockout: LoginLockout::new(),
            jwks,
        }
    }

    #[instrument(skip(self, password))]
    pub fn register(&self, email: &str, password: &str) -> Result<IssuedToken> {
        validate_email(email)?;
        let hash = password::hash(password)?;
        let user = self
            .store
            .create_user(email, Some(&hash), None, Tier::Free.as_str())
            .map_err(|e| map_store_conflict(e, "email already registered"))?;
        let token = self.mint_token(Some(&user.id), Tier::Free, TOKEN_TTL_DAYS, None)?;
        Ok(token)
    }

    #[instrument(skip(self, password))]
    pub fn login(&self, email: &str, password: &str, client_ip: &str) -> Result<IssuedToken> {
        self.lockout.check(client_ip)?;

        let user = self.store.get_user_by_email(email)?;
        let ok = match &user {
            Some(u) => u
                .password_hash
                .as_deref()
                .map(|h| password::verify(password, h))
                .unwrap_or(false),
            None => {
                // Run a hash comparison anyway so an unknown email takes the
                // same time as a wrong-password failure.
                password::verify(password, "$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
                false
            }
        };

        if !ok {
            self.lockout.record_failure(client_ip);
            return Err(IdentityError::InvalidCredentials);
        }
        self.lockout.record_success(client_ip);

        let user = user.expect("ok implies user present");
        let tier = Tier::parse_alias(&user.tier).unwrap_or(Tier::Free);
        self.mint_token(Some(&user.id), tier, TOKEN_TTL_DAYS, None)
    }

    #[instrument(skip(self, identity_token))]
    pub async fn external_identity_login(
        &self,
        identity_token: &str,
        declared_email: Option<&str>,
        _declared_name: Option<&str>,
    ) -> Result<ExternalLoginResult> {
        let claims = self
            .jwks
            .verify(identity_token, &self.config.apple_issuer, &self.config.apple_client_ids)
            .await?;

        if let Some(existing) = self.store.get_user_by_external_subject(&claims.sub)? {
            let tier = Tier::parse_alias(&existing.tier).unwrap_or(Tier::Free);
            let issued = self.mint_token(Some(&existing.id), tier, TOKEN_TTL_DAYS, None)?;
            return Ok(ExternalLoginResult {
                issued,
                created: false,
            });
        }

        let email = declared_email.map(str::to_string).or(claims.email.clone());

        if let Some(email) = email {
            if let Some(existing) = self.store.get_user_by_email(&email)? {
                if existing.external_subject.is_some() {
                    return Err(IdentityError::Conflict(
                        "email already linked to a different identity".to_string(),
                    ));
                }
                self.store.link_external_subject(&existing.id, &claims.sub)?;
                let tier = Tier::parse_alias(&existing.tier).unwrap_or(Tier::Free);
                let issued = self.mint_token(Some(&existing.id), tier, TOKEN_TTL_DAYS, None)?;
                return Ok(ExternalLoginResult {
                    issued,
                    created: false,
                });
            }

            let user = self
                .store
                .create_user(&email, None, Some(&claims.sub), Tier::Free.as_str())
                .map_err(|e| map_store_conflict(e, "email already in use"))?;
            let issued = self.mint_token(Some(&user.id), Tier::Free, TOKEN_TTL_DAYS, None)?;
            return Ok(ExternalLoginResult {
                issued,
                created: true,
            });
        }

        let placeholder_email = format!("{}@apple.placeholder.invalid", claims.sub);
        let user = self
            .store
            .create_user(&placeholder_email, None, Some(&claims.sub), Tier::Free.as_str())
            .map_err(|e| map_store_conflict(e, "placeholder email collision"))?;
        let issued = self.mint_token(Some(&user.id), Tier::Free, TOKEN_TTL_DAYS, None)?;
        Ok(ExternalLoginResult {
            issued,
            created: true,
        })
    }

    /// §4.2 RefreshToken: only inside the trailing `REFRESH_WINDOW_DAYS`
    /// of a still-active, non-expired token.
    #[instrument(skip(self))]
    pub fn refresh_token(&self, old_token: &str) -> Result<IssuedToken> {
        let existing = self.require_active_token(old_token)?;
        let now = Utc::now();
        let expires_at = existing
            .expires_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .ok_or(IdentityError::RefreshWindowClosed)?;
        let remaining = expires_at.signed_duration_since(now);
        if remaining >= chrono::Duration::days(REFRESH_WINDOW_DAYS) {
            return Err(IdentityError::RefreshWindowClosed);
        }

        let new_token = generate_token();
        let tier = Tier::parse_alias(&existing.tier).unwrap_or(Tier::Free);
        let refreshed = self.store.refresh_token(
            old_token,
            &new_token,
            existing.user_id.as_deref(),
            tier.as_str(),
            TOKEN_TTL_DAYS,
        )?;
        if let Some(user_id) = &existing.user_id {
            self.store.touch_last_refresh(user_id)?;
        }
        Ok(IssuedToken {
            user_id: existing.user_id,
            token: refreshed.token,
            tier,
            expires_at: refreshed.expires_at.unwrap_or_default(),
        })
    }

    /// §4.2 RequireUser: resolve and validate a bearer token, loading the
    /// owning user when one exists (legacy admin tokens have none).
    #[instrument(skip(self))]
    pub fn require_user(&self, token: &str) -> Result<(DeviceToken, Option<User>)> {
        let device_token = self.require_active_token(token)?;
        let user = match &device_token.user_id {
            Some(uid) => self.store.get_user(uid)?,
            None => None,
        };
        Ok((device_token, user))
    }

    fn require_active_token(&self, token: &str) -> Result<DeviceToken> {
        let device_token = self
            .store
            .get_token(token)?
            .ok_or(IdentityError::Unauthenticated)?;
        if !device_token.is_active() {
            return Err(IdentityError::Unauthenticated);
        }
        if device_token.is_expired(Utc::now()) {
            return Err(IdentityError::TokenExpired);
        }
        Ok(device_token)
    }

    fn mint_token(
        &self,
        user_id: Option<&str>,
        tier: Tier,
        ttl_days: i64,
        note: Option<&str>,
    ) -> Result<IssuedToken> {
        let token = generate_token();
        let created = self
            .store
            .create_token(&token, user_id, tier.as_str(), Some(ttl_days), note)?;
        Ok(IssuedToken {
            user_id: user_id.map(str::to_string),
            token: created.token,
            tier,
            expires_at: created.expires_at.unwrap_or_default(),
        })
    }
}

/// `{TOKEN_PREFIX}` + 32 random bytes hex-encoded, matching the original's
/// `ocw1_...` opaque bearer credential shape.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

/// RFC-5322-lite: one `@`, non-empty local/domain parts, no whitespace,
/// length <= 254 (§4.2 Register).
fn validate_email(email: &str) -> Result<()> {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(IdentityError::MalformedInput("invalid email".to_string()));
    }
    let mut parts = email.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => {
            Ok(())
        }
        _ => Err(IdentityError::MalformedInput("invalid email".to_string())),
    }
}

fn map_store_conflict(e: proxy_store::StoreError, message: &str) -> IdentityError {
    match e {
        proxy_store::StoreError::Conflict(_) => IdentityError::Conflict(message.to_string()),
        other => IdentityError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn fresh_identity() -> Identity {
        let conn = Connection::open_in_memory().unwrap();
        proxy_store::db::init_db(&conn).unwrap();
        let store = Arc::new(Store::new(conn));
        Identity::new(store, IdentityConfig::default())
    }

    #[test]
    fn register_then_login_roundtrips() {
        let identity = fresh_identity();
        let issued = identity.register("a@b.com", "hunter2pass").unwrap();
        assert_eq!(issued.tier, Tier::Free);
        assert!(issued.token.starts_with(TOKEN_PREFIX));

        let logged_in = identity.login("a@b.com", "hunter2pass", "9.9.9.9").unwrap();
        assert_ne!(logged_in.token, issued.token);
    }

    #[test]
    fn wrong_password_is_invalid_credentials() {
        let identity = fresh_identity();
        identity.register("a@b.com", "hunter2pass").unwrap();
        let err = identity.login("a@b.com", "wrong-password", "9.9.9.9").unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[test]
    fn unknown_email_is_invalid_credentials_not_not_found() {
        let identity = fresh_identity();
        let err = identity
            .login("nobody@nowhere.com", "whatever1", "9.9.9.9")
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[test]
    fn five_failed_logins_lock_out_the_ip() {
        let identity = fresh_identity();
        identity.register("a@b.com", "hunter2pass").unwrap();
        for _ in 0..5 {
            let _ = identity.login("a@b.com", "wrong-password", "3.3.3.3");
        }
        let err = identity.login("a@b.com", "hunter2pass", "3.3.3.3").unwrap_err();
        assert!(matches!(err, IdentityError::LoginLockedOut { .. }));
    }

    #[test]
    fn duplicate_registration_is_conflict() {
        let identity = fresh_identity();
        identity.register("dup@b.com", "hunter2pass").unwrap();
        let err = identity.register("dup@b.com", "hunter2pass").unwrap_err();
        assert!(matches!(err, IdentityError::Conflict(_)));
    }

    #[test]
    fn require_user_rejects_unknown_token() {
        let identity = fresh_identity();
        let err = identity.require_user("ocw1_nope").unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated));
    }
}
