use std::net::SocketAddr;

use axum::http::HeaderMap;

use proxy_core::{ProxyError, Tier};
use proxy_ratelimit::{client_ip, Bucket};
use proxy_store::types::{DeviceToken, User};

use crate::app::AppState;
use crate::error::GatewayError;

/// §4.2 RequireUser: resolve the bearer token, reject if missing/expired/
/// disabled, and derive the request's effective tier from it.
pub fn require_bearer(state: &AppState, headers: &HeaderMap) -> Result<(DeviceToken, Option<User>, Tier), GatewayError> {
    let token = extract_bearer(headers).ok_or(ProxyError::Unauthenticated)?;
    let (device_token, user) = state.identity.require_user(token)?;
    let tier = Tier::parse_alias(&device_token.tier).unwrap_or(Tier::Free);
    Ok((device_token, user, tier))
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// §4.3: apply the sliding-window bucket for `(method, route_template)`,
/// keyed by client IP. A no-op when the route maps to no bucket (GETs) or
/// rate limiting is disabled in config.
pub fn check_rate_limit(state: &AppState, headers: &HeaderMap, addr: SocketAddr, method: &str, route_template: &str) -> Result<(), GatewayError> {
    if !state.config.ratelimit.enabled {
        return Ok(());
    }
    let Some(bucket) = Bucket::for_route(method, route_template) else {
        return Ok(());
    };
    let xff = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let ip = client_ip(xff, &addr.to_string());
    if !state.ratelimiter.check(bucket, &ip, route_template) {
        return Err(ProxyError::RateLimited.into());
    }
    Ok(())
}

/// §6: admin routes require `X-Admin-Key`, compared in constant time so a
/// timing side-channel can't leak the key byte-by-byte.
pub fn admin_key_ok(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = &state.config.admin_key else {
        return false;
    };
    let Some(provided) = headers.get("x-admin-key").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_slices() {
        assert!(constant_time_eq(b"ocw1_abc", b"ocw1_abc"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths_and_content() {
        assert!(!constant_time_eq(b"short", b"longer-value"));
        assert!(!constant_time_eq(b"ocw1_abc", b"ocw1_abd"));
    }

    #[test]
    fn extract_bearer_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer ocw1_xyz".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("ocw1_xyz"));
    }
}
