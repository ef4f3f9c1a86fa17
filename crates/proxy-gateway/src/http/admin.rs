use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use proxy_core::ProxyError;
use proxy_store::types::DeviceToken;

use crate::app::AppState;
use crate::bearer::admin_key_ok;
use crate::error::GatewayResult;

#[derive(Deserialize)]
pub struct GenerateTokenRequest {
    #[serde(default = "default_tier")]
    pub tier: String,
    pub ttl_days: Option<i64>,
    pub note: Option<String>,
}

fn default_tier() -> String {
    "free".to_string()
}

#[derive(Deserialize)]
pub struct SetTierRequest {
    pub tier: String,
}

/// POST /admin/tokens/generate — admin-only, `X-Admin-Key` gated (§4.2
/// legacy admin-minted tokens, `user_id` null).
pub async fn generate_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<GenerateTokenRequest>,
) -> GatewayResult<Json<DeviceToken>> {
    if !admin_key_ok(&state, &headers) {
        return Err(ProxyError::Unauthenticated.into());
    }
    let token_value = generate_admin_token();
    let token = state.store.create_token(&token_value, None, &req.tier, req.ttl_days, req.note.as_deref())?;
    Ok(Json(token))
}

/// POST /admin/tokens/{token}/tier — admin-only tier override.
pub async fn set_tier(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SetTierRequest>,
) -> GatewayResult<Json<DeviceToken>> {
    if !admin_key_ok(&state, &headers) {
        return Err(ProxyError::Unauthenticated.into());
    }
    state.store.set_token_tier(&token, &req.tier)?;
    let updated = state.store.get_token(&token)?.ok_or_else(|| ProxyError::NotFound(format!("token {token}")))?;
    Ok(Json(updated))
}

fn generate_admin_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", proxy_core::config::TOKEN_PREFIX, hex::encode(bytes))
}
