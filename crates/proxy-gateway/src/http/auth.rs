use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use proxy_identity::IssuedToken;
use proxy_ratelimit::client_ip;

use crate::app::AppState;
use crate::bearer::{check_rate_limit, extract_bearer};
use crate::error::GatewayResult;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct AppleLoginRequest {
    pub identity_token: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub user_id: Option<String>,
    pub token: String,
    pub tier: proxy_core::Tier,
    pub expires_at: String,
}

#[derive(Serialize)]
pub struct AppleLoginResponse {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub created: bool,
}

impl From<IssuedToken> for TokenResponse {
    fn from(t: IssuedToken) -> Self {
        Self { user_id: t.user_id, token: t.token, tier: t.tier, expires_at: t.expires_at }
    }
}

/// POST /v1/auth/register (§4.2 Register).
pub async fn register(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> GatewayResult<Json<TokenResponse>> {
    check_rate_limit(&state, &headers, addr, "POST", "/v1/auth/register")?;
    let issued = state.identity.register(&req.email, &req.password)?;
    Ok(Json(issued.into()))
}

/// POST /v1/auth/login (§4.2 Login). Deliberately not rate-limited by the
/// bucket middleware — the IP-based lockout in `proxy-identity` applies
/// instead (§4.3).
pub async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> GatewayResult<Json<TokenResponse>> {
    let xff = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let ip = client_ip(xff, &addr.to_string());
    let issued = state.identity.login(&req.email, &req.password, &ip)?;
    Ok(Json(issued.into()))
}

/// POST /v1/auth/apple (§4.2 ExternalIdentityLogin).
pub async fn apple(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<AppleLoginRequest>,
) -> GatewayResult<Json<AppleLoginResponse>> {
    check_rate_limit(&state, &headers, addr, "POST", "/v1/auth/apple")?;
    let result = state
        .identity
        .external_identity_login(&req.identity_token, req.email.as_deref(), req.name.as_deref())
        .await?;
    Ok(Json(AppleLoginResponse { token: result.issued.into(), created: result.created }))
}

/// POST /v1/auth/refresh (§4.2 RefreshToken).
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> GatewayResult<Json<TokenResponse>> {
    check_rate_limit(&state, &headers, addr, "POST", "/v1/auth/refresh")?;
    // `Identity::refresh_token` itself validates the token is active,
    // non-expired, and inside the refresh window.
    let token = extract_bearer(&headers).ok_or(proxy_core::ProxyError::Unauthenticated)?;
    let issued = state.identity.refresh_token(token)?;
    Ok(Json(issued.into()))
}
