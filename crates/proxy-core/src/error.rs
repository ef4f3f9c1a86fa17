use thiserror::Error;

/// The full §7 error taxonomy as a single type every crate converts into at
/// its boundary, so the edge can map one type to HTTP status + body.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    MalformedInput(String),

    #[error("tier too low to force this provider")]
    ForcedProviderTierTooHigh,

    #[error("authentication required")]
    Unauthenticated,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("too many requests")]
    RateLimited,

    #[error("login locked out, retry after {retry_after_secs}s")]
    LoginLockedOut { retry_after_secs: u64 },

    #[error("daily quota exceeded")]
    QuotaExceeded,

    #[error("upstream provider failure: {0}")]
    UpstreamFailure(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Short machine-readable code, same role as `SkynetError::code`.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::MalformedInput(_) => "MALFORMED_INPUT",
            ProxyError::ForcedProviderTierTooHigh => "FORBIDDEN",
            ProxyError::Unauthenticated
            | ProxyError::TokenExpired
            | ProxyError::InvalidCredentials => "UNAUTHENTICATED",
            ProxyError::Forbidden(_) => "FORBIDDEN",
            ProxyError::NotFound(_) => "NOT_FOUND",
            ProxyError::Conflict(_) => "CONFLICT",
            ProxyError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ProxyError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ProxyError::RateLimited | ProxyError::LoginLockedOut { .. } => "RATE_LIMITED",
            ProxyError::QuotaExceeded => "QUOTA_EXCEEDED",
            ProxyError::UpstreamFailure(_) => "UPSTREAM_FAILURE",
            ProxyError::Internal(_)
            | ProxyError::Database(_)
            | ProxyError::Config(_)
            | ProxyError::Serialization(_)
            | ProxyError::Io(_) => "INTERNAL_ERROR",
        }
    }

    /// Canonical HTTP status per §7.
    pub fn status(&self) -> u16 {
        match self {
            ProxyError::MalformedInput(_) => 400,
            ProxyError::ForcedProviderTierTooHigh => 403,
            ProxyError::Unauthenticated
            | ProxyError::TokenExpired
            | ProxyError::InvalidCredentials => 401,
            ProxyError::Forbidden(_) => 403,
            ProxyError::NotFound(_) => 404,
            ProxyError::Conflict(_) => 409,
            ProxyError::PayloadTooLarge { .. } => 413,
            ProxyError::UnsupportedMediaType(_) => 415,
            ProxyError::RateLimited | ProxyError::LoginLockedOut { .. } | ProxyError::QuotaExceeded => 429,
            ProxyError::UpstreamFailure(_) => 502,
            ProxyError::Internal(_)
            | ProxyError::Database(_)
            | ProxyError::Config(_)
            | ProxyError::Serialization(_)
            | ProxyError::Io(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
