/// A named rate-limit bucket policy (§4.3): `limit` hits allowed per
/// `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Auth,
    Chat,
    Upload,
    Admin,
    Export,
    Crash,
    Community,
    Default,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Auth => "auth",
            Bucket::Chat => "chat",
            Bucket::Upload => "upload",
            Bucket::Admin => "admin",
            Bucket::Export => "export",
            Bucket::Crash => "crash",
            Bucket::Community => "community",
            Bucket::Default => "default",
        }
    }

    pub fn policy(&self) -> Policy {
        match self {
            Bucket::Auth => Policy { limit: 10, window_secs: 300 },
            Bucket::Chat => Policy { limit: 60, window_secs: 60 },
            Bucket::Upload => Policy { limit: 10, window_secs: 60 },
            Bucket::Admin => Policy { limit: 5, window_secs: 60 },
            Bucket::Export => Policy { limit: 3, window_secs: 300 },
            Bucket::Crash => Policy { limit: 20, window_secs: 60 },
            Bucket::Community => Policy { limit: 10, window_secs: 60 },
            Bucket::Default => Policy { limit: 120, window_secs: 60 },
        }
    }

    /// Classify a mutating request by method + path template (§4.3 table).
    /// `path` is expected already stripped of its leading `/v1` or similar
    /// version prefix, matched against the route templates axum registered.
    pub fn for_route(method: &str, path_template: &str) -> Option<Bucket> {
        if !matches!(method, "POST" | "PUT" | "PATCH" | "DELETE") {
            return None;
        }
        // Login is exempt (§4.3): the failure-based lockout in proxy-identity
        // applies instead, so it is deliberately absent from this match.
        let bucket = match path_template {
            "/v1/auth/register" | "/v1/auth/apple" | "/v1/auth/refresh" => Bucket::Auth,
            p if p.starts_with("/v1/conversations/{id}/chat")
                || p.starts_with("/v1/conversations/{id}/chat/stream")
                || p == "/v1/chat/completions"
                || p.starts_with("/v1/chat/completions/") =>
            {
                Bucket::Chat
            }
            p if p.ends_with("/upload") => Bucket::Upload,
            p if p.starts_with("/admin/") => Bucket::Admin,
            "/v1/account/export" | "/v1/account/delete" => Bucket::Export,
            "/v1/crash" => Bucket::Crash,
            p if p.starts_with("/v1/community") => Bucket::Community,
            _ => Bucket::Default,
        };
        Some(bucket)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub limit: u32,
    pub window_secs: i64,
}
