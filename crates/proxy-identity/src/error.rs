use thiserror::Error;

/// Identity-layer errors (§4.2). Converts into `proxy_core::ProxyError` at
/// the crate boundary so the gateway only has to match on one type.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{0}")]
    MalformedInput(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token expired")]
    TokenExpired,

    #[error("authentication required")]
    Unauthenticated,

    #[error("{0} already in use")]
    Conflict(String),

    #[error("login locked out, retry after {retry_after_secs}s")]
    LoginLockedOut { retry_after_secs: u64 },

    #[error("upstream identity token rejected: {0}")]
    UpstreamTokenInvalid(String),

    #[error("refresh window closed")]
    RefreshWindowClosed,

    #[error(transparent)]
    Store(#[from] proxy_store::StoreError),
}

pub type Result<T> = std::result::Result<T, IdentityError>;

impl From<IdentityError> for proxy_core::ProxyError {
    fn from(e: IdentityError) -> Self {
        use proxy_core::ProxyError;
        match e {
            IdentityError::MalformedInput(m) => ProxyError::MalformedInput(m),
            IdentityError::InvalidCredentials => ProxyError::InvalidCredentials,
            IdentityError::TokenExpired => ProxyError::TokenExpired,
            IdentityError::Unauthenticated => ProxyError::Unauthenticated,
            IdentityError::Conflict(m) => ProxyError::Conflict(m),
            IdentityError::LoginLockedOut { retry_after_secs } => {
                ProxyError::LoginLockedOut { retry_after_secs }
            }
            IdentityError::UpstreamTokenInvalid(m) => {
                tracing::debug!(detail = %m, "external identity token rejected");
                ProxyError::Unauthenticated
            }
            IdentityError::RefreshWindowClosed => {
                ProxyError::Forbidden("refresh window closed".to_string())
            }
            IdentityError::Store(e) => e.into(),
        }
    }
}
