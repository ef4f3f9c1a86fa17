use chrono::Utc;
use dashmap::DashMap;

use crate::bucket::Bucket;

/// Sliding-window bucket limiter (§4.3), one of the mutex/lock-free-guarded
/// in-memory containers named in §5. Best-effort: state does not survive a
/// process restart and that's an accepted tradeoff, not a bug.
#[derive(Default)]
pub struct RateLimiter {
    hits: DashMap<String, Vec<i64>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit for `(bucket, ip, route_template)` and report whether
    /// this request is over the bucket's limit.
    pub fn check(&self, bucket: Bucket, ip: &str, route_template: &str) -> bool {
        let policy = bucket.policy();
        let key = format!("{}:{}:{}", bucket.as_str(), ip, route_template);
        let now = Utc::now().timestamp();
        let mut entry = self.hits.entry(key).or_default();
        entry.retain(|t| now - *t < policy.window_secs);
        if entry.len() as u32 >= policy.limit {
            return false;
        }
        entry.push(now);
        true
    }
}

/// First `X-Forwarded-For` token if present and non-empty, else the peer
/// address (§4.3).
pub fn client_ip(forwarded_for: Option<&str>, peer_addr: &str) -> String {
    if let Some(xff) = forwarded_for {
        if let Some(first) = xff.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    peer_addr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check(Bucket::Admin, "1.2.3.4", "/admin/tokens/generate"));
        }
        assert!(!limiter.check(Bucket::Admin, "1.2.3.4", "/admin/tokens/generate"));
    }

    #[test]
    fn buckets_and_keys_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            limiter.check(Bucket::Admin, "1.2.3.4", "/admin/tokens/generate");
        }
        assert!(limiter.check(Bucket::Admin, "5.6.7.8", "/admin/tokens/generate"));
        assert!(limiter.check(Bucket::Chat, "1.2.3.4", "/v1/chat/completions"));
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        assert_eq!(client_ip(Some("9.9.9.9, 1.1.1.1"), "2.2.2.2"), "9.9.9.9");
        assert_eq!(client_ip(Some(""), "2.2.2.2"), "2.2.2.2");
        assert_eq!(client_ip(None, "2.2.2.2"), "2.2.2.2");
    }
}
