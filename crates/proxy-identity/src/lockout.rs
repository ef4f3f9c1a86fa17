use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{IdentityError, Result};

const FAILURE_WINDOW_SECS: i64 = 60;
const FAILURE_THRESHOLD: usize = 5;
const LOCKOUT_SECS: i64 = 300;

/// Per-IP login-failure tracker (§3 `LoginFailureLog`, §4.2 Login). One of
/// the three mutex-guarded in-memory containers named in §5 — here a
/// `DashMap` plays that role, constructed once and held by `Identity`
/// rather than as a module-level global.
#[derive(Default)]
pub struct LoginLockout {
    failures: DashMap<String, Vec<DateTime<Utc>>>,
}

impl LoginLockout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject with `LoginLockedOut` if any run of 5 failures for `ip` fell
    /// within a 60-second span and the resulting 5-minute lockout has not
    /// yet elapsed.
    pub fn check(&self, ip: &str) -> Result<()> {
        let now = Utc::now();
        let Some(mut entry) = self.failures.get_mut(ip) else {
            return Ok(());
        };
        entry.retain(|t| now.signed_duration_since(*t).num_seconds() < LOCKOUT_SECS);
        if entry.len() < FAILURE_THRESHOLD {
            return Ok(());
        }
        for window in entry.windows(FAILURE_THRESHOLD) {
            let span = window[window.len() - 1].signed_duration_since(window[0]).num_seconds();
            if span <= FAILURE_WINDOW_SECS {
                let trigger = window[window.len() - 1];
                let elapsed = now.signed_duration_since(trigger).num_seconds();
                if elapsed < LOCKOUT_SECS {
                    return Err(IdentityError::LoginLockedOut {
                        retry_after_secs: (LOCKOUT_SECS - elapsed).max(0) as u64,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn record_failure(&self, ip: &str) {
        let now = Utc::now();
        let mut entry = self.failures.entry(ip.to_string()).or_default();
        entry.retain(|t| now.signed_duration_since(*t).num_seconds() < LOCKOUT_SECS);
        entry.push(now);
    }

    /// A successful login resets the failure count for the IP (§4.2).
    pub fn record_success(&self, ip: &str) {
        self.failures.remove(ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_failures_trigger_lockout() {
        let lockout = LoginLockout::new();
        for _ in 0..5 {
            lockout.check("1.2.3.4").unwrap();
            lockout.record_failure("1.2.3.4");
        }
        let err = lockout.check("1.2.3.4").unwrap_err();
        assert!(matches!(err, IdentityError::LoginLockedOut { .. }));
    }

    #[test]
    fn success_resets_failures() {
        let lockout = LoginLockout::new();
        for _ in 0..4 {
            lockout.record_failure("5.6.7.8");
        }
        lockout.record_success("5.6.7.8");
        assert!(lockout.check("5.6.7.8").is_ok());
    }

    #[test]
    fn different_ips_are_independent() {
        let lockout = LoginLockout::new();
        for _ in 0..5 {
            lockout.record_failure("1.1.1.1");
        }
        assert!(lockout.check("1.1.1.1").is_err());
        assert!(lockout.check("2.2.2.2").is_ok());
    }
}
